/// Host-side RPC proxy for a single plugin process
///
/// Each call is one blocking request/response round trip. The client holds
/// the channel exclusively, so callers serialize calls per plugin by owning
/// or locking the client.
use crate::plugin::framing::{FrameError, read_frame, write_frame};
use crate::plugin::protocol::{Method, Request, Response};
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] FrameError),

    /// The request could not be encoded within the frame size limit.
    /// Nothing was written, so the channel is still in sync.
    #[error("request too large: {len} bytes")]
    RequestTooLarge { len: usize },

    /// The plugin answered with an application error
    #[error("{0}")]
    Remote(String),
}

pub struct RpcClient<T> {
    channel: T,
}

impl<T> RpcClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(channel: T) -> Self {
        Self { channel }
    }

    async fn call(&mut self, request: &Request) -> Result<Response, RpcError> {
        write_frame(request, &mut self.channel)
            .await
            .map_err(|err| match err {
                FrameError::TooLarge { len } => RpcError::RequestTooLarge { len },
                other => RpcError::Transport(other),
            })?;
        let response: Response = read_frame(&mut self.channel).await?;
        match response.error {
            Some(message) => Err(RpcError::Remote(message)),
            None => Ok(response),
        }
    }

    pub async fn name(&mut self) -> Result<String, RpcError> {
        Ok(self.call(&Request::new(Method::Name)).await?.value)
    }

    pub async fn version(&mut self) -> Result<String, RpcError> {
        Ok(self.call(&Request::new(Method::Version)).await?.value)
    }

    pub async fn capabilities(&mut self) -> Result<Vec<String>, RpcError> {
        Ok(self
            .call(&Request::new(Method::GetCapabilities))
            .await?
            .capabilities)
    }

    pub async fn execute(&mut self, args: HashMap<String, String>) -> Result<String, RpcError> {
        Ok(self.call(&Request::execute(args)).await?.value)
    }

    /// Ask the plugin to exit and consume the client, closing the channel
    pub async fn shutdown(mut self) -> Result<(), RpcError> {
        self.call(&Request::new(Method::Shutdown)).await?;
        Ok(())
    }
}
