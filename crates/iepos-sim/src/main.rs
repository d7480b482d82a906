//! I-EPOS Simulator Binary
//!
//! Usage: `iepos-sim [config.toml]`. Phase summaries are printed to stdout
//! as JSON, logs go to stderr.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iepos_sim::{Experiment, SimConfig, SIM_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting I-EPOS simulator v{}", SIM_VERSION);

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SimConfig::load(path.as_deref())?;
    info!("Loaded configuration: {:?}", config);

    let experiment = Experiment::new(config)?;
    info!(
        nodes = experiment.topology().len(),
        protocol = ?experiment.config().algorithm.protocol,
        mode = ?experiment.config().runtime.mode,
        "Experiment ready"
    );

    let summaries = experiment.run().await?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    info!(phases = summaries.len(), "Simulation complete");
    Ok(())
}
