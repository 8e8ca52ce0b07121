//! Error types returned by the plugin manager

use crate::plugin::framing::MAX_MESSAGE_SIZE;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PluginError {
    #[error("failed to read plugin directory {}: {source}", path.display())]
    #[diagnostic(code(plughost::discovery_io))]
    DiscoveryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch plugin {}: {source}", path.display())]
    #[diagnostic(
        code(plughost::launch_failed),
        help("check that the file exists and is executable")
    )]
    LaunchFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake with {} failed: {reason}", path.display())]
    #[diagnostic(
        code(plughost::handshake_failed),
        help("the executable is not a plugin for this host, or was built for another protocol version")
    )]
    HandshakeFailed { path: PathBuf, reason: String },

    #[error("plugin {} did not answer metadata queries: {reason}", path.display())]
    #[diagnostic(code(plughost::metadata_query_failed))]
    MetadataQueryFailed { path: PathBuf, reason: String },

    #[error("a plugin named '{name}' is already loaded from {}", existing.display())]
    #[diagnostic(
        code(plughost::duplicate_plugin),
        help("unload or reload the existing plugin first")
    )]
    DuplicatePlugin { name: String, existing: PathBuf },

    #[error("no plugin named '{0}' is loaded")]
    #[diagnostic(code(plughost::not_found))]
    NotFound(String),

    #[error("plugin '{name}' is unreachable: {reason}")]
    #[diagnostic(code(plughost::plugin_unreachable))]
    PluginUnreachable { name: String, reason: String },

    #[error("plugin '{name}' crashed ({status})")]
    #[diagnostic(
        code(plughost::plugin_crashed),
        help("reload the plugin to start a fresh process")
    )]
    PluginCrashed { name: String, status: String },

    #[error("request to plugin '{name}' is too large: {len} bytes (max {max})", max = MAX_MESSAGE_SIZE)]
    #[diagnostic(
        code(plughost::request_too_large),
        help("pass large inputs by reference, for example as a file path")
    )]
    RequestTooLarge { name: String, len: usize },

    #[error("plugin '{name}' failed: {message}")]
    #[diagnostic(code(plughost::plugin_execution))]
    PluginExecution { name: String, message: String },

    #[error("invalid configuration {}: {reason}", path.display())]
    #[diagnostic(code(plughost::config))]
    Config { path: PathBuf, reason: String },

    #[error("plugin manager has been shut down")]
    #[diagnostic(code(plughost::shut_down))]
    ShutDown,
}

impl PluginError {
    /// Short stable identifier of the error kind, used in machine output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DiscoveryIo { .. } => "discovery_io",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::HandshakeFailed { .. } => "handshake_failed",
            Self::MetadataQueryFailed { .. } => "metadata_query_failed",
            Self::DuplicatePlugin { .. } => "duplicate_plugin",
            Self::NotFound(_) => "not_found",
            Self::PluginUnreachable { .. } => "plugin_unreachable",
            Self::PluginCrashed { .. } => "plugin_crashed",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::PluginExecution { .. } => "plugin_execution",
            Self::Config { .. } => "config",
            Self::ShutDown => "shut_down",
        }
    }
}

pub type Result<T, E = PluginError> = std::result::Result<T, E>;
