/// Message framing for stdio-based plugin communication
///
/// This module implements a simple length-prefixed framing protocol:
/// [4-byte length (big-endian)][protobuf message bytes]
///
/// The blocking variants are used inside plugin processes, the async
/// variants by the host.
use prost::Message;
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum message size (10MB) to prevent memory exhaustion
pub const MAX_MESSAGE_SIZE: u32 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the channel before a new frame started
    #[error("channel closed")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message too large: {len} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    TooLarge { len: usize },

    #[error("failed to decode protobuf message: {0}")]
    Decode(#[from] prost::DecodeError),
}

fn encode<M: Message>(msg: &M) -> Result<Vec<u8>, FrameError> {
    let body = msg.encode_to_vec();
    if body.len() > MAX_MESSAGE_SIZE as usize {
        return Err(FrameError::TooLarge { len: body.len() });
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn check_len(len_buf: [u8; 4]) -> Result<usize, FrameError> {
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(FrameError::TooLarge { len: len as usize });
    }
    Ok(len as usize)
}

fn closed_on_eof(err: std::io::Error) -> FrameError {
    if err.kind() == ErrorKind::UnexpectedEof {
        FrameError::Closed
    } else {
        FrameError::Io(err)
    }
}

/// Send a protobuf message with length-prefix framing
pub fn send_message<M: Message, W: Write>(msg: &M, writer: &mut W) -> Result<(), FrameError> {
    let frame = encode(msg)?;
    writer.write_all(&frame)?;
    // Flush to ensure message is sent immediately
    writer.flush()?;
    Ok(())
}

/// Receive a protobuf message with length-prefix framing
pub fn receive_message<M: Message + Default, R: Read>(reader: &mut R) -> Result<M, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(closed_on_eof)?;
    let len = check_len(len_buf)?;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    Ok(M::decode(&buf[..])?)
}

/// Async counterpart of [`send_message`]
pub async fn write_frame<M, W>(msg: &M, writer: &mut W) -> Result<(), FrameError>
where
    M: Message,
    W: AsyncWrite + Unpin,
{
    let frame = encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Async counterpart of [`receive_message`]
pub async fn read_frame<M, R>(reader: &mut R) -> Result<M, FrameError>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(closed_on_eof)?;
    let len = check_len(len_buf)?;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(M::decode(&buf[..])?)
}
