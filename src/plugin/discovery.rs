/// Plugin discovery
///
/// A plugin directory is flat: every executable regular file in it is a
/// candidate. Subdirectories and non-executable files are ignored.
use crate::plugin::error::{PluginError, Result};
use std::path::{Path, PathBuf};

/// List plugin candidates in `dir`, sorted by path
pub fn discover_from_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| PluginError::DiscoveryIo {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };

        let path = entry.path();
        if is_plugin_candidate(&path) {
            candidates.push(path);
        } else {
            tracing::debug!("Ignoring {}", path.display());
        }
    }

    candidates.sort();
    Ok(candidates)
}

/// Whether `path` is a regular file with an execute bit set
///
/// Any execute bit counts, not only the ones that apply to this process.
/// A candidate this process cannot run fails later, at launch.
pub fn is_plugin_candidate(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && is_executable(&metadata),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
