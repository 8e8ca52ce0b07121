use anyhow::Result;
use plughost::plugin::PluginManager;
use std::collections::HashMap;
use std::path::Path;

pub async fn exec_command(
    manager: &PluginManager,
    dir: &Path,
    plugin: &str,
    args: HashMap<String, String>,
) -> Result<()> {
    manager.discover(dir).await?;
    let output = manager.execute(plugin, args).await?;
    println!("{output}");
    Ok(())
}
