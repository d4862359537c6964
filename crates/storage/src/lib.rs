//! Particle Storage
//!
//! This crate owns raw per-particle field storage for a distributed particle
//! simulation and the contract every storage layout satisfies:
//!
//! - [`backend`] -- the [`StorageBackend`] trait, aggregate field groupings and
//!   layout selection.
//! - [`layout`] -- struct-of-arrays, array-of-structs and tiled layouts.
//! - [`field`] -- strided read-only field views.
//! - [`plan`] -- permutation, migration and halo plans.
//! - [`comm`] -- the process-group abstraction used by collective calls.

#![warn(missing_docs)]

pub mod backend;
pub mod comm;
pub mod error;
pub mod field;
pub mod layout;
pub mod particle;
pub mod plan;

pub use backend::{
    create_backend, AllSlices, ForceSlices, IntegrateSlices, Layout, PropertySlices,
    StorageBackend, UNINITIALIZED_BACKEND,
};
pub use comm::{exchange_records, local_group, Communicator, SingleProcess, ThreadComm};
pub use error::{CommError, CommResult, StorageError, StorageResult};
pub use field::FieldSlice;
pub use layout::{AosStorage, SoaStorage, TiledStorage};
pub use particle::Particle;
pub use plan::{DistributionPlan, HaloExport, HaloPlan, Permutation};
