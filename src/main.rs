use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use plughost::config::ManagerConfig;
use plughost::plugin::{PluginError, PluginManager};

mod commands;

#[derive(Parser)]
#[command(
    name = "plughost",
    about = "Discover, launch and drive process-isolated plugins",
    version,
    author,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing plugin executables
    #[arg(short, long, global = true, env = "PLUGHOST_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,

    /// Enable verbose output (use -vv for debug output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every plugin in the plugin directory and report the outcome
    Discover {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// List the plugins that load successfully
    List {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a command on one plugin
    Exec {
        /// Name the plugin registered under
        plugin: String,

        /// Command arguments as KEY=VALUE pairs
        #[arg(value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE argument: '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(dir) = cli.plugin_dir {
        config.plugin_dir = Some(dir);
    }
    let plugin_dir = config.plugin_dir.clone().ok_or_else(|| {
        anyhow!("No plugin directory given; use --plugin-dir or set plugin_dir in the config file")
    })?;

    let manager = PluginManager::new(config);
    let result = match cli.command {
        Commands::Discover { json } => {
            commands::discover_command(&manager, &plugin_dir, json).await
        }
        Commands::List { json } => commands::list_command(&manager, &plugin_dir, json).await,
        Commands::Exec { plugin, args } => {
            let args: HashMap<String, String> = args.into_iter().collect();
            commands::exec_command(&manager, &plugin_dir, &plugin, args).await
        }
    };
    manager.shutdown().await;

    match result {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast::<PluginError>() {
            Ok(plugin_err) => {
                eprintln!("{:?}", miette::Report::new(plugin_err));
                std::process::exit(1);
            }
            Err(err) => Err(err),
        },
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::new("plughost=warn"), // Default: warnings and errors only
        1 => EnvFilter::new("plughost=info"), // -v: info messages
        _ => EnvFilter::new("plughost=debug"), // -vv or more: full debug
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
