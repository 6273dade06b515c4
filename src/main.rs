use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vxfabric::config::Config;
use vxfabric::db::FileStore;
use vxfabric::inventory::StaticInventory;
use vxfabric::models::Topology;
use vxfabric::{Pipeline, VIEWS};

/// Compile fabric configuration variables
#[derive(Debug, Parser)]
#[command(name = "vxfabric", version, about)]
struct Cli {
    /// List the available configuration variables
    #[arg(short, long)]
    list: bool,

    /// Print one configuration variable as JSON
    #[arg(short, long, value_name = "VARIABLE")]
    config: Option<String>,

    /// Topology document [env: VXFABRIC_TOPOLOGY]
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Inventory file [env: VXFABRIC_INVENTORY]
    #[arg(long)]
    inventory: Option<PathBuf>,

    /// Allocation state directory [env: VXFABRIC_STATE_DIR]
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout carries only JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vxfabric=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.list {
        for view in VIEWS {
            println!("{}", view);
        }
        return Ok(());
    }

    let Some(view) = cli.config else {
        anyhow::bail!("nothing to do: pass --list or --config <VARIABLE>");
    };

    let cfg = Config::load().with_overrides(cli.topology, cli.inventory, cli.state_dir);
    tracing::debug!("Topology: {}", cfg.topology.display());
    tracing::debug!("Inventory: {}", cfg.inventory.display());
    tracing::debug!("State dir: {}", cfg.state_dir.display());

    let text = fs::read_to_string(&cfg.topology)
        .with_context(|| format!("failed to read topology {}", cfg.topology.display()))?;
    let topology = Topology::from_yaml(&text)
        .with_context(|| format!("invalid topology {}", cfg.topology.display()))?;

    let text = fs::read_to_string(&cfg.inventory)
        .with_context(|| format!("failed to read inventory {}", cfg.inventory.display()))?;
    let inventory = StaticInventory::parse(&cfg.inventory.to_string_lossy(), &text)
        .with_context(|| format!("invalid inventory {}", cfg.inventory.display()))?;
    tracing::debug!("Inventory groups: {}", inventory.group_names().collect::<Vec<_>>().join(", "));

    let store = FileStore::new(&cfg.state_dir);
    let pipeline = Pipeline::new(&topology, &inventory, &store)?;
    let value = pipeline.render(&view)?;

    println!("{}", serde_json::to_string_pretty(&value).context("failed to format output")?);
    Ok(())
}
