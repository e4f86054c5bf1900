//! Jarscope CLI - inspect layered JVM class workspaces

mod commands;

use clap::{Parser, Subcommand};
use jarscope::config::{default_config_path, load_config, JarscopeConfig};
use jarscope::Workspace;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "jarscope")]
#[command(version)]
#[command(about = "Layered JVM class workspace with inheritance and call-flow graphs")]
#[command(long_about = r#"
Jarscope stacks a primary class directory or jar over library jars and the
host runtime, then answers questions about the combined name-space:
  • Which layer a class resolves from
  • Supertypes and subtypes, including dangling references
  • Call edges of a method, with virtual-dispatch fan-out
  • Recovery snapshots of the primary layer

Example usage:
  jarscope init --primary build/classes --lib libs/guava.jar
  jarscope parents com.example.Service --all
  jarscope calls "com.example.Service.run()V" --blocks
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ./jarscope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Primary class directory or archive (overrides the config)
    #[arg(short, long, global = true)]
    primary: Option<PathBuf>,

    /// Library archive, repeatable; appended after configured libraries
    #[arg(short, long = "lib", global = true)]
    libs: Vec<PathBuf>,

    /// Runtime archive, repeatable; replaces JAVA_HOME discovery
    #[arg(long, global = true)]
    runtime: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file from the given layers
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show the layers in resolution order
    Layers,

    /// Show which layer a class or resource resolves from
    Resolve {
        /// Class name (dotted or internal) or resource path
        name: String,
    },

    /// Show the supertypes of a class
    Parents {
        name: String,

        /// Include transitive supertypes
        #[arg(short, long)]
        all: bool,
    },

    /// Show the subtypes of a class
    Children {
        name: String,

        /// Include transitive subtypes
        #[arg(short, long)]
        all: bool,
    },

    /// Show outgoing call edges of a method (owner.name(descriptor))
    Calls {
        method: String,

        /// Also print the method's basic blocks
        #[arg(short, long)]
        blocks: bool,
    },

    /// Show incoming call edges of a method (owner.name(descriptor))
    Callers { method: String },

    /// List hierarchy edges whose parent cannot be resolved
    Dangling,

    /// Show graph statistics
    Stats,

    /// Write a snapshot of the primary layer
    Snapshot {
        /// Output archive (defaults to the configured snapshot path)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Seconds to wait for the write to finish
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a `{ "command": ..., "ok": true, "data": ... }` envelope
pub fn emit_success<T: Serialize>(mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "command": command,
            "ok": true,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn open_workspace(cli: &Cli) -> anyhow::Result<Workspace> {
    let config = load_config(cli.config.as_deref())?
        .unwrap_or_default()
        .merge(cli.primary.clone(), cli.libs.clone(), cli.runtime.clone());
    config.open_workspace()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    if let Commands::Init { force } = &cli.command {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        let config = JarscopeConfig::default().merge(cli.primary.clone(), cli.libs.clone(), cli.runtime.clone());
        return commands::run_init(mode, &path, &config, *force);
    }

    let mut workspace = open_workspace(&cli)?;
    let result = match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Layers => commands::run_layers(mode, &workspace),
        Commands::Resolve { name } => commands::run_resolve(mode, &workspace, name),
        Commands::Parents { name, all } => commands::run_parents(mode, &workspace, name, *all),
        Commands::Children { name, all } => commands::run_children(mode, &workspace, name, *all),
        Commands::Calls { method, blocks } => commands::run_calls(mode, &workspace, method, *blocks),
        Commands::Callers { method } => commands::run_callers(mode, &workspace, method),
        Commands::Dangling => commands::run_dangling(mode, &workspace),
        Commands::Stats => commands::run_stats(mode, &workspace),
        Commands::Snapshot { out, timeout } => commands::run_snapshot(mode, &mut workspace, out.clone(), *timeout),
    };

    if let Err(e) = &result {
        if mode.is_human() {
            jarscope::ui::error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
    result
}
