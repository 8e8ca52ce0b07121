/// Launching plugin executables as child processes
use crate::plugin::error::{PluginError, Result};
use crate::plugin::protocol::HandshakeConfig;
use crate::plugin::stdio_transport::ChildChannel;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// A started plugin process and the pipes to talk to it
pub struct LaunchedPlugin {
    pub child: Child,
    pub channel: ChildChannel,
}

/// Starts plugin processes
///
/// The manager depends on this trait rather than on `tokio::process`
/// directly so callers can observe or replace process creation.
pub trait Launcher: Send + Sync {
    fn launch(
        &self,
        path: &Path,
        handshake: &HandshakeConfig,
        env: &BTreeMap<String, String>,
    ) -> Result<LaunchedPlugin>;
}

/// Spawns the executable with piped stdin/stdout and the magic cookie set
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(
        &self,
        path: &Path,
        handshake: &HandshakeConfig,
        env: &BTreeMap<String, String>,
    ) -> Result<LaunchedPlugin> {
        let mut command = Command::new(path);
        command
            .envs(env)
            .env(&handshake.magic_cookie_key, &handshake.magic_cookie_value)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Plugin logs go straight to our stderr
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| PluginError::LaunchFailed {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Spawned {} (pid {:?})", path.display(), child.id());

        let channel = ChildChannel::from_child(&mut child).ok_or_else(|| {
            PluginError::LaunchFailed {
                path: path.to_path_buf(),
                source: std::io::Error::other("child stdio was not piped"),
            }
        })?;

        Ok(LaunchedPlugin { child, channel })
    }
}
