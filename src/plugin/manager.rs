/// Plugin manager handles plugin lifecycle and orchestration
///
/// This module is responsible for:
/// - Plugin discovery in a plugin directory
/// - Process spawning and the stdio handshake
/// - Registering plugins under the name they report
/// - Routing command execution to the right plugin process
/// - Unload, reload and shutdown with bounded graceful termination
///
/// Per plugin: discovered → launching → handshaking → registered →
/// (executing)* → unloading → terminated. A plugin that dies is only
/// noticed by the next call made to it.
use crate::config::ManagerConfig;
use crate::plugin::contract::PluginDescriptor;
use crate::plugin::discovery::discover_from_dir;
use crate::plugin::error::{PluginError, Result};
use crate::plugin::handshake::HandshakeValidator;
use crate::plugin::launcher::{LaunchedPlugin, Launcher, ProcessLauncher};
use crate::plugin::protocol::HandshakeConfig;
use crate::plugin::registry::{PluginEntry, PluginMetadata, Registry};
use crate::plugin::rpc::{RpcClient, RpcError};
use crate::plugin::stdio_transport::ChildChannel;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Child;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

/// Result of loading one discovery candidate
#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub path: PathBuf,
    pub result: Result<PluginDescriptor>,
}

/// Plugin manager coordinates all plugin operations
pub struct PluginManager<L = ProcessLauncher> {
    config: ManagerConfig,
    handshake: HandshakeValidator,
    launcher: L,
    registry: Registry,
    shut_down: AtomicBool,
}

impl PluginManager<ProcessLauncher> {
    /// Create a manager that launches real processes with the built-in cookie
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_launcher(config, HandshakeConfig::default(), ProcessLauncher)
    }
}

impl Default for PluginManager<ProcessLauncher> {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl<L: Launcher> PluginManager<L> {
    pub fn with_launcher(config: ManagerConfig, handshake: HandshakeConfig, launcher: L) -> Self {
        let handshake = HandshakeValidator::new(handshake, config.handshake_timeout());
        Self {
            config,
            handshake,
            launcher,
            registry: Registry::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PluginError::ShutDown);
        }
        Ok(())
    }

    /// Load every plugin candidate in `dir`
    ///
    /// Only an unreadable directory fails the call. Per-candidate failures
    /// are logged and reported in the returned outcomes.
    pub async fn discover(&self, dir: &Path) -> Result<Vec<DiscoveryOutcome>> {
        self.ensure_running()?;
        let candidates = discover_from_dir(dir)?;
        tracing::info!(
            "Found {} plugin candidate(s) in {}",
            candidates.len(),
            dir.display()
        );

        let mut outcomes = Vec::with_capacity(candidates.len());
        for path in candidates {
            let result = self.load(&path).await;
            if let Err(err) = &result {
                tracing::warn!("Skipping {}: {err}", path.display());
            }
            outcomes.push(DiscoveryOutcome { path, result });
        }

        Ok(outcomes)
    }

    /// Launch `path`, handshake, query its identity and register it
    ///
    /// Handshake and metadata queries share one deadline of
    /// `handshake_timeout_ms` from launch.
    pub async fn load(&self, path: &Path) -> Result<PluginDescriptor> {
        self.ensure_running()?;
        let path = std::path::absolute(path).map_err(|source| PluginError::LaunchFailed {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Loading plugin {}", path.display());
        let deadline = Instant::now() + self.config.handshake_timeout();
        let LaunchedPlugin {
            mut child,
            mut channel,
        } = self
            .launcher
            .launch(&path, self.handshake.config(), &self.config.env)?;

        if let Err(err) = self.handshake.perform_until(&mut channel, deadline).await {
            kill(&mut child, &path).await;
            return Err(PluginError::HandshakeFailed {
                path,
                reason: err.to_string(),
            });
        }

        let mut client = RpcClient::new(channel);
        let metadata = match timeout_at(deadline, query_metadata(&mut client)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(reason)) => {
                kill(&mut child, &path).await;
                return Err(PluginError::MetadataQueryFailed { path, reason });
            }
            Err(_) => {
                kill(&mut child, &path).await;
                let reason = format!("no answer within {:?}", self.config.handshake_timeout());
                return Err(PluginError::MetadataQueryFailed { path, reason });
            }
        };

        let entry = Arc::new(PluginEntry::new(path, metadata, child, client));
        if let Err(err) = self.registry.try_insert(&entry).await {
            entry.teardown(self.config.unload_timeout()).await;
            return Err(err);
        }

        // Lost a race with shutdown: don't leave a plugin behind it
        if self.shut_down.load(Ordering::SeqCst) {
            if let Some(entry) = self.registry.remove(entry.name()).await {
                entry.teardown(self.config.unload_timeout()).await;
            }
            return Err(PluginError::ShutDown);
        }

        let descriptor = entry.descriptor();
        tracing::info!(
            "Registered plugin {} v{} (pid {:?})",
            descriptor.name,
            descriptor.version,
            descriptor.pid
        );
        Ok(descriptor)
    }

    /// Run a command on the plugin registered as `name`
    ///
    /// The registry lock is only held for the lookup; the call itself
    /// blocks until the plugin answers or its channel fails.
    pub async fn execute(&self, name: &str, args: HashMap<String, String>) -> Result<String> {
        self.ensure_running()?;
        let entry = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        tracing::debug!("Executing {name} with {} argument(s)", args.len());
        entry.execute(args).await
    }

    /// Stop the process registered as `name` and remove it
    ///
    /// The name disappears from lookups at once but stays reserved until
    /// the process is gone, so nothing else can register under it earlier.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let entry = self
            .registry
            .retire(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        entry.teardown(self.config.unload_timeout()).await;
        self.registry.forget(&entry).await;
        tracing::info!("Unloaded plugin {name}");
        Ok(())
    }

    /// Unload `name` and load it again from the same binary
    ///
    /// If the new process fails to load, the plugin stays unloaded.
    pub async fn reload(&self, name: &str) -> Result<PluginDescriptor> {
        self.ensure_running()?;
        let entry = self
            .registry
            .retire(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        let path = entry.binary_path().to_path_buf();
        entry.teardown(self.config.unload_timeout()).await;
        self.registry.forget(&entry).await;
        tracing::info!("Reloading plugin {name} from {}", path.display());

        self.load(&path).await
    }

    /// Descriptors of all loaded plugins, sorted by name
    pub async fn list(&self) -> Vec<PluginDescriptor> {
        self.registry.snapshot().await
    }

    pub async fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.registry.get(name).await.map(|entry| entry.descriptor())
    }

    /// Stop every plugin. The manager refuses further work afterwards.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries = self.registry.drain().await;
        tracing::info!("Shutting down {} plugin(s)", entries.len());

        let grace = self.config.unload_timeout();
        let mut tasks = JoinSet::new();
        for entry in entries {
            tasks.spawn(async move {
                entry.teardown(grace).await;
                entry.name().to_string()
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(name) => tracing::debug!("Stopped plugin {name}"),
                Err(err) => tracing::warn!("Failed to stop a plugin: {err}"),
            }
        }
    }
}

async fn query_metadata(
    client: &mut RpcClient<ChildChannel>,
) -> std::result::Result<PluginMetadata, String> {
    let describe = |method: &str, err: RpcError| format!("{method}: {err}");

    let name = client.name().await.map_err(|err| describe("Name", err))?;
    if name.trim().is_empty() {
        return Err("plugin reported an empty name".to_string());
    }
    let version = client
        .version()
        .await
        .map_err(|err| describe("Version", err))?;
    let capabilities = client
        .capabilities()
        .await
        .map_err(|err| describe("GetCapabilities", err))?;

    Ok(PluginMetadata {
        name,
        version,
        capabilities,
    })
}

async fn kill(child: &mut Child, path: &Path) {
    if let Err(err) = child.kill().await {
        tracing::debug!("Failed to kill {}: {err}", path.display());
    }
}
