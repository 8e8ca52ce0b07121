/// Host-side handshake with a freshly launched plugin process
///
/// The cookie check is a shared-secret sanity check that stops the host from
/// driving an unrelated executable. It is not authentication.
use crate::plugin::framing::{FrameError, read_frame, write_frame};
use crate::plugin::protocol::{HandshakeConfig, HandshakeReply, Hello};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, timeout_at};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("transport error during handshake: {0}")]
    Transport(#[from] FrameError),

    #[error("magic cookie mismatch")]
    CookieMismatch,

    #[error("protocol version mismatch: host={host}, plugin={plugin}")]
    ProtocolMismatch { host: u32, plugin: u32 },

    #[error("no handshake within {0:?}")]
    TimedOut(Duration),
}

#[derive(Clone, Debug)]
pub struct HandshakeValidator {
    config: HandshakeConfig,
    timeout: Duration,
}

impl HandshakeValidator {
    pub fn new(config: HandshakeConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Send `Hello` and validate the plugin's reply
    pub async fn perform<T>(&self, channel: &mut T) -> Result<HandshakeReply, HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.perform_until(channel, Instant::now() + self.timeout).await
    }

    /// Like [`perform`](Self::perform), but bounded by a caller-owned deadline
    pub async fn perform_until<T>(
        &self,
        channel: &mut T,
        deadline: Instant,
    ) -> Result<HandshakeReply, HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        match timeout_at(deadline, self.exchange(channel)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::TimedOut(self.timeout)),
        }
    }

    async fn exchange<T>(&self, channel: &mut T) -> Result<HandshakeReply, HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let hello = Hello {
            core_protocol: self.config.protocol_version,
            core_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        write_frame(&hello, channel).await?;

        let reply: HandshakeReply = read_frame(channel).await?;
        self.validate(&reply)?;
        Ok(reply)
    }

    pub fn validate(&self, reply: &HandshakeReply) -> Result<(), HandshakeError> {
        if reply.magic_cookie != self.config.magic_cookie_value {
            return Err(HandshakeError::CookieMismatch);
        }
        if reply.protocol != self.config.protocol_version {
            return Err(HandshakeError::ProtocolMismatch {
                host: self.config.protocol_version,
                plugin: reply.protocol,
            });
        }
        Ok(())
    }
}
