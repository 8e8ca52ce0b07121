use anyhow::Result;
use colored::Colorize;
use plughost::plugin::{DiscoveryOutcome, PluginManager};
use serde_json::json;
use std::path::Path;

pub async fn discover_command(manager: &PluginManager, dir: &Path, json: bool) -> Result<()> {
    let outcomes = manager.discover(dir).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes_to_json(&outcomes))?);
        return Ok(());
    }

    println!("Plugin directory: {}\n", dir.display());
    if outcomes.is_empty() {
        println!("  (none)");
    }
    for outcome in &outcomes {
        match &outcome.result {
            Ok(plugin) => println!(
                "  {} {} {} ({})",
                "ok".green(),
                plugin.name,
                plugin.version,
                outcome.path.display()
            ),
            Err(err) => println!(
                "  {} {}: {err}",
                "failed".red(),
                outcome.path.display()
            ),
        }
    }

    Ok(())
}

fn outcomes_to_json(outcomes: &[DiscoveryOutcome]) -> serde_json::Value {
    outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(plugin) => json!({
                "path": outcome.path,
                "ok": true,
                "plugin": plugin,
            }),
            Err(err) => json!({
                "path": outcome.path,
                "ok": false,
                "error": err.to_string(),
                "kind": err.kind(),
            }),
        })
        .collect()
}
