//! Domain Decomposition
//!
//! This crate partitions a periodic cubic simulation box across a group of
//! cooperating processes and keeps the population bookkeeping for one of
//! them:
//! - Deterministic process-grid partitioning
//! - Distributed grid handle with a cutoff-derived halo
//! - Immutable mesh geometry snapshots (owned and ghost corners)
//! - The Domain Manager, which fronts a storage backend from the
//!   `storage` crate
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use domain::{DomainConfig, DomainManager};
//! use storage::SingleProcess;
//!
//! let config = DomainConfig::load("config/lj_box.json")?;
//! let manager = DomainManager::from_config(&config, Arc::new(SingleProcess))?;
//! println!("halo width {}", manager.halo_width()?);
//! # Ok::<(), domain::DomainError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod partition;
pub mod system;

pub use config::{AtomStyle, DomainConfig, UnitConfig, DEFAULT_GRID_NUM_CELLS};
pub use error::{DomainError, DomainResult};
pub use geometry::{tolerance, GridResolution, MeshGeometry, MeshTracker, MAX_HALO_CELLS};
pub use grid::{DistributedGrid, GlobalGrid, GlobalMesh, LocalGrid, Region};
pub use partition::{block_position, block_rank, BlockPartitioner};
pub use system::{DomainManager, PopulationCounts};
