//! Decomposition preview
//!
//! Loads a domain configuration, runs it on N in-process ranks and logs each
//! rank's process-grid position with its owned and ghost corners.
//!
//! Usage: decompose <config.json> [--ranks N]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use domain::{DomainConfig, DomainManager};
use storage::{local_group, Communicator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "decompose",
    version,
    about = "Preview how a domain configuration is split across ranks"
)]
struct Cli {
    /// Path to the domain configuration (JSON).
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Number of in-process ranks to decompose over.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    ranks: usize,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "domain=info,storage=info,decompose=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ranks = cli.ranks;

    let config = match DomainConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Decomposing {:?}..{:?} over {} ranks", config.low_corner, config.high_corner, ranks);

    let handles: Vec<_> = local_group(ranks)
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            thread::spawn(move || {
                let comm: Arc<dyn Communicator> = Arc::new(comm);
                let rank = comm.rank();
                let manager = DomainManager::from_config(&config, comm)?;
                let geometry = *manager.geometry()?;
                tracing::info!(
                    "rank {rank}: position {:?}, owned {:?}..{:?}, ghost {:?}..{:?}",
                    manager.rank_dim_pos()?,
                    geometry.owned_lo(),
                    geometry.owned_hi(),
                    geometry.ghost_lo(),
                    geometry.ghost_hi()
                );
                Ok::<_, domain::DomainError>(())
            })
        })
        .collect();

    let mut failed = false;
    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("rank {rank} failed: {e}");
                failed = true;
            }
            Err(_) => {
                tracing::error!("rank {rank} panicked");
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
}
