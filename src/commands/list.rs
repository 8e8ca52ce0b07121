use anyhow::Result;
use plughost::plugin::PluginManager;
use std::path::Path;

pub async fn list_command(manager: &PluginManager, dir: &Path, json: bool) -> Result<()> {
    // Candidates that fail to load were already logged by discovery
    manager.discover(dir).await?;
    let plugins = manager.list().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    println!("Plugins:");
    if plugins.is_empty() {
        println!("  (none)");
    }
    for plugin in plugins {
        let capabilities = if plugin.capabilities.is_empty() {
            "-".to_string()
        } else {
            plugin.capabilities.join(", ")
        };
        println!(
            "  - {} {} [{capabilities}] {} ({})",
            plugin.name,
            plugin.version,
            plugin.status,
            plugin.binary_path.display()
        );
    }

    Ok(())
}
