use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use modelkeep_core::commands::{Commands, initialize, modelkeep_root};
use modelkeep_core::config::CoreConfig;

#[derive(Parser)]
#[command(
    name = "modelkeep-server",
    about = "Keeps the best-scoring model submitted so far and serves it over HTTP"
)]
struct Cli {
    /// Service root holding config.toml and the record directory
    /// (default: $MODELKEEP_ROOT, then the working directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the HTTP service (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Print every stored model as JSON
    Models,
    /// Print the model the service would start with
    Current {
        #[arg(long)]
        name: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root = modelkeep_root(cli.root.as_deref());
    let report = initialize(&root).with_context(|| format!("initialize {}", root.display()))?;
    if !report.created.is_empty() {
        tracing::info!("created under {}: {:?}", root.display(), report.created);
    }

    match cli.cmd.unwrap_or(Cmd::Serve {
        host: None,
        port: None,
        workers: None,
    }) {
        Cmd::Serve {
            host,
            port,
            workers,
        } => serve(report.config, host, port, workers),
        Cmd::Models => {
            let cmds = Commands::open(&report.config)?;
            let models = cmds.models().context("list models")?;
            println!("{}", serde_json::to_string_pretty(&models)?);
            Ok(())
        }
        Cmd::Current { name } => {
            let cmds = Commands::open(&report.config)?;
            let current = cmds.current_model(name.as_deref());
            println!("{}", serde_json::to_string_pretty(&current)?);
            Ok(())
        }
    }
}

fn serve(
    mut config: CoreConfig,
    host: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
) -> Result<()> {
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Some(w) = workers {
        config.server.workers = w;
    }

    let cmds = Arc::new(Commands::open(&config)?);
    let handle = modelkeep_server::start(cmds, &config.server, &config.assets)?;
    println!("Server running at http://localhost:{}", handle.addr().port());
    handle.wait();
    Ok(())
}
