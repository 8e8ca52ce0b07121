/// The capability surface shared by the host and its plugins
///
/// Plugin authors implement [`Plugin`] and hand it to `server::serve`; the
/// host only ever sees the same four operations through the RPC proxy and
/// records what it learned in a [`PluginDescriptor`].
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Operations a plugin process answers
pub trait Plugin {
    /// Stable, non-empty identifier used as the registry key
    fn name(&self) -> String;

    fn version(&self) -> String;

    /// Command tags the plugin supports. May be empty.
    fn capabilities(&self) -> Vec<String>;

    /// Run exactly one command
    fn execute(&mut self, args: &HashMap<String, String>) -> anyhow::Result<String>;
}

/// Liveness as last observed by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Running,
    Crashed,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginStatus::Running => write!(f, "running"),
            PluginStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// Snapshot of a loaded plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub binary_path: PathBuf,
    pub capabilities: Vec<String>,
    /// OS process id of the plugin process, if it is still known
    pub pid: Option<u32>,
    pub status: PluginStatus,
}

impl PluginDescriptor {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
