/// Plugin-side RPC stub
///
/// A plugin binary calls [`serve`] from `main` with its [`Plugin`]
/// implementation. stdout is reserved for frames, so plugins must log to
/// stderr.
use crate::plugin::contract::Plugin;
use crate::plugin::framing::{FrameError, receive_message, send_message};
use crate::plugin::protocol::{HandshakeConfig, HandshakeReply, Hello, Method, Request, Response};
use anyhow::{Context, Result, bail};
use std::io::{Read, Write};

/// Serve `plugin` over this process's stdin/stdout until the host hangs up
pub fn serve<P: Plugin>(plugin: P) -> Result<()> {
    let handshake = HandshakeConfig::default();
    verify_cookie(&handshake)?;

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    serve_on(plugin, &handshake, &mut stdin, &mut stdout)
}

/// Refuse to run unless launched by a host that knows the magic cookie
pub fn verify_cookie(handshake: &HandshakeConfig) -> Result<()> {
    match std::env::var(&handshake.magic_cookie_key) {
        Ok(value) if value == handshake.magic_cookie_value => Ok(()),
        _ => bail!(
            "This binary is a plugin. It is not meant to be executed directly; \
             it is launched by a plugin host."
        ),
    }
}

/// Run the handshake and request loop over arbitrary streams
pub fn serve_on<P, R, W>(
    mut plugin: P,
    handshake: &HandshakeConfig,
    reader: &mut R,
    writer: &mut W,
) -> Result<()>
where
    P: Plugin,
    R: Read,
    W: Write,
{
    let hello: Hello = receive_message(reader).context("Failed to read Hello message")?;
    tracing::debug!(
        "Host {} speaks protocol {}",
        hello.core_version,
        hello.core_protocol
    );

    let reply = HandshakeReply {
        protocol: handshake.protocol_version,
        magic_cookie: handshake.magic_cookie_value.clone(),
    };
    send_message(&reply, writer).context("Failed to send HandshakeReply")?;

    if hello.core_protocol != handshake.protocol_version {
        bail!(
            "Protocol version mismatch: host={}, plugin={}",
            hello.core_protocol,
            handshake.protocol_version
        );
    }

    tracing::info!("Handshake complete, entering message loop");

    loop {
        let request: Request = match receive_message(reader) {
            Ok(request) => request,
            Err(FrameError::Closed) => {
                tracing::info!("Host closed the channel, exiting");
                break;
            }
            Err(err) => return Err(err).context("Failed to read request"),
        };

        let response = match Method::try_from(request.method) {
            Ok(Method::Name) => Response::value(plugin.name()),
            Ok(Method::Version) => Response::value(plugin.version()),
            Ok(Method::GetCapabilities) => Response::capabilities(plugin.capabilities()),
            Ok(Method::Execute) => match plugin.execute(&request.args) {
                Ok(output) => Response::value(output),
                Err(err) => Response::failure(format!("{err:#}")),
            },
            Ok(Method::Shutdown) => {
                send_message(&Response::default(), writer).context("Failed to ack shutdown")?;
                tracing::info!("Shutdown requested, exiting");
                break;
            }
            Ok(Method::Unspecified) | Err(_) => {
                Response::failure(format!("unknown method {}", request.method))
            }
        };

        send_message(&response, writer).context("Failed to send response")?;
    }

    Ok(())
}
