/// Process-isolated plugin system
///
/// Plugins are separate executables launched as child processes. The host
/// talks to each one over its stdin/stdout using length-prefixed protobuf
/// frames: a handshake first, then one request/response per call.
pub mod contract;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod launcher;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod stdio_transport;

// Re-export commonly used types
pub use contract::{Plugin, PluginDescriptor, PluginStatus};
pub use error::PluginError;
pub use launcher::{LaunchedPlugin, Launcher, ProcessLauncher};
pub use manager::{DiscoveryOutcome, PluginManager};
pub use protocol::HandshakeConfig;
pub use server::serve;
