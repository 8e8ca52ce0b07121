/// The manager's table of loaded plugins
///
/// Lookups take the read lock, structural changes the write lock. Entries
/// are handed out as `Arc`s so RPC calls run after the lock is released.
/// An entry being unloaded is retired first: hidden from lookups but still
/// holding its name until its process is gone.
use crate::plugin::contract::{PluginDescriptor, PluginStatus};
use crate::plugin::error::{PluginError, Result};
use crate::plugin::framing::FrameError;
use crate::plugin::rpc::{RpcClient, RpcError};
use crate::plugin::stdio_transport::ChildChannel;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, timeout, timeout_at};

/// How long to wait for a process that dropped its channel to be reaped
const CRASH_PROBE: Duration = Duration::from_millis(250);

/// Identity reported by a plugin during load
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// A live plugin: its metadata, its process and its RPC proxy
pub struct PluginEntry {
    metadata: PluginMetadata,
    binary_path: PathBuf,
    pid: Option<u32>,
    child: Mutex<Child>,
    /// `None` once teardown has taken the channel
    client: Arc<Mutex<Option<RpcClient<ChildChannel>>>>,
    /// Exit status observed when the process died under us
    crash: OnceLock<String>,
    retiring: AtomicBool,
}

impl PluginEntry {
    pub fn new(
        binary_path: PathBuf,
        metadata: PluginMetadata,
        child: Child,
        client: RpcClient<ChildChannel>,
    ) -> Self {
        Self {
            metadata,
            binary_path,
            pid: child.id(),
            child: Mutex::new(child),
            client: Arc::new(Mutex::new(Some(client))),
            crash: OnceLock::new(),
            retiring: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn is_retiring(&self) -> bool {
        self.retiring.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> PluginStatus {
        if self.crash.get().is_some() {
            PluginStatus::Crashed
        } else {
            PluginStatus::Running
        }
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            name: self.metadata.name.clone(),
            version: self.metadata.version.clone(),
            binary_path: self.binary_path.clone(),
            capabilities: self.metadata.capabilities.clone(),
            pid: self.pid,
            status: self.status(),
        }
    }

    /// Forward one command to the plugin, serialized with other calls to it
    pub async fn execute(&self, args: HashMap<String, String>) -> Result<String> {
        if let Some(status) = self.crash.get() {
            return Err(PluginError::PluginCrashed {
                name: self.metadata.name.clone(),
                status: status.clone(),
            });
        }

        let client = Arc::clone(&self.client).lock_owned().await;
        // The round trip owns the channel and finishes even if our caller is
        // dropped, so a late response is never read by the next call
        let call = tokio::spawn(async move {
            let mut client = client;
            match client.as_mut() {
                Some(client) => Some(client.execute(args).await),
                None => None,
            }
        });

        let outcome = match call.await {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(PluginError::PluginUnreachable {
                    name: self.metadata.name.clone(),
                    reason: err.to_string(),
                });
            }
        };

        match outcome {
            None => Err(PluginError::PluginUnreachable {
                name: self.metadata.name.clone(),
                reason: "plugin channel is closed".to_string(),
            }),
            Some(Ok(output)) => Ok(output),
            Some(Err(RpcError::Remote(message))) => Err(PluginError::PluginExecution {
                name: self.metadata.name.clone(),
                message,
            }),
            Some(Err(RpcError::RequestTooLarge { len })) => Err(PluginError::RequestTooLarge {
                name: self.metadata.name.clone(),
                len,
            }),
            Some(Err(RpcError::Transport(err))) => {
                Err(self.classify_transport_error(err).await)
            }
        }
    }

    /// Tell a dead process apart from a broken channel
    async fn classify_transport_error(&self, err: FrameError) -> PluginError {
        let mut child = self.child.lock().await;
        match timeout(CRASH_PROBE, child.wait()).await {
            Ok(Ok(status)) => {
                let status = status.to_string();
                tracing::warn!("Plugin {} crashed ({status})", self.metadata.name);
                let _ = self.crash.set(status.clone());
                PluginError::PluginCrashed {
                    name: self.metadata.name.clone(),
                    status,
                }
            }
            _ => PluginError::PluginUnreachable {
                name: self.metadata.name.clone(),
                reason: err.to_string(),
            },
        }
    }

    /// Stop the plugin process, escalating to a kill after `grace`
    ///
    /// The plugin is first asked to shut down and its channel is closed.
    /// An in-flight call keeps the channel busy; in that case the process
    /// is left to the kill.
    pub async fn teardown(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        let name = &self.metadata.name;

        match timeout_at(deadline, self.client.lock()).await {
            Ok(mut client) => {
                if let Some(client) = client.take() {
                    if let Ok(Err(err)) = timeout_at(deadline, client.shutdown()).await {
                        tracing::debug!("Plugin {name} did not acknowledge shutdown: {err}");
                    }
                }
            }
            Err(_) => tracing::warn!("Plugin {name} is busy, cannot stop it gracefully"),
        }

        let mut child = self.child.lock().await;
        match timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Plugin {name} exited ({status})"),
            Ok(Err(err)) => tracing::warn!("Failed to wait for plugin {name}: {err}"),
            Err(_) => {
                tracing::warn!("Plugin {name} did not exit within {grace:?}, killing it");
                if let Err(err) = child.kill().await {
                    tracing::warn!("Failed to kill plugin {name}: {err}");
                }
            }
        }
    }
}

#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<PluginEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<PluginEntry>> {
        self.entries
            .read()
            .await
            .get(name)
            .filter(|entry| !entry.is_retiring())
            .cloned()
    }

    /// Register `entry` unless its name is already taken, by a live or a
    /// retiring entry
    pub async fn try_insert(&self, entry: &Arc<PluginEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(entry.name()) {
            return Err(PluginError::DuplicatePlugin {
                name: entry.name().to_string(),
                existing: existing.binary_path().to_path_buf(),
            });
        }
        entries.insert(entry.name().to_string(), Arc::clone(entry));
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<PluginEntry>> {
        self.entries.write().await.remove(name)
    }

    /// Hide `name` from lookups while keeping the name reserved
    ///
    /// Returns `None` if there is no such entry or it is already retiring.
    pub async fn retire(&self, name: &str) -> Option<Arc<PluginEntry>> {
        let entries = self.entries.write().await;
        let entry = entries.get(name)?;
        if entry.retiring.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Arc::clone(entry))
    }

    /// Release the name held by a retired `entry`
    pub async fn forget(&self, entry: &Arc<PluginEntry>) {
        let mut entries = self.entries.write().await;
        if entries
            .get(entry.name())
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(entry.name());
        }
    }

    /// Remove and return every entry, retiring ones included
    pub async fn drain(&self) -> Vec<Arc<PluginEntry>> {
        self.entries.write().await.drain().map(|(_, entry)| entry).collect()
    }

    /// Descriptors of all entries, sorted by name
    pub async fn snapshot(&self) -> Vec<PluginDescriptor> {
        let mut descriptors: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_retiring())
            .map(|entry| entry.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
