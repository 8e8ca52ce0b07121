use anyhow::{Context, Result, bail};
use plughost::plugin::{Plugin, serve};
use std::collections::HashMap;
use std::time::Duration;

const PLUGIN_NAME: &str = "hello";
const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the registered name, so one binary can stand in for several plugins
const NAME_OVERRIDE_ENV: &str = "PLUGHOST_HELLO_NAME";

struct Hello {
    name: String,
}

impl Plugin for Hello {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> String {
        PLUGIN_VERSION.to_string()
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["greet".to_string()]
    }

    fn execute(&mut self, args: &HashMap<String, String>) -> Result<String> {
        if let Some(ms) = args.get("sleep_ms") {
            let ms: u64 = ms.parse().context("sleep_ms must be a number")?;
            std::thread::sleep(Duration::from_millis(ms));
        }

        if let Some(code) = args.get("crash") {
            let code: i32 = code.parse().context("crash must be an exit code")?;
            tracing::error!("Crashing on request with exit code {code}");
            std::process::exit(code);
        }

        if let Some(message) = args.get("fail") {
            bail!("{message}");
        }

        let who = args.get("name").map(String::as_str).unwrap_or("World");
        Ok(format!("Hello {who}"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plughost_plugin_hello=info".parse()?),
        )
        .with_target(false)
        .without_time()
        .init();

    let name = std::env::var(NAME_OVERRIDE_ENV).unwrap_or_else(|_| PLUGIN_NAME.to_string());
    tracing::info!("Starting {name} v{PLUGIN_VERSION}");

    serve(Hello { name })
}
