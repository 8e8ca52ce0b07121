/// stdio transport between the host and a plugin process
///
/// Plugins are spawned as separate processes, and the host communicates
/// with them by writing frames to the child's stdin and reading frames
/// from its stdout.
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout};

/// A connection wrapper for child process pipes
///
/// This wraps the stdin/stdout of a spawned child process to provide
/// a bidirectional channel. Dropping it closes the plugin's stdin, which
/// is the graceful stop signal plugins watch for.
pub struct ChildChannel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ChildChannel {
    /// Create a new child channel from process pipes
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout),
        }
    }

    /// Take the piped stdin/stdout of a freshly spawned child
    ///
    /// Returns `None` when the child was not spawned with both pipes.
    pub fn from_child(child: &mut Child) -> Option<Self> {
        let stdin = child.stdin.take()?;
        let stdout = child.stdout.take()?;
        Some(Self::new(stdin, stdout))
    }
}

impl AsyncRead for ChildChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ChildChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}
