//! The storage backend contract.
//!
//! Any memory layout that stores particles implements [`StorageBackend`].
//! Callers hold a `Box<dyn StorageBackend>` and never name the concrete
//! layout; the layout is chosen once through [`Layout`] / [`create_backend`].
//!
//! `migrate` and `gather` are collective. They have default implementations
//! built on the per-entry accessors and [`exchange_records`], which a layout
//! may override with a packed fast path.

use serde::{Deserialize, Serialize};

use crate::comm::{exchange_records, Communicator};
use crate::error::{StorageError, StorageResult};
use crate::field::FieldSlice;
use crate::layout::{AosStorage, SoaStorage, TiledStorage};
use crate::particle::Particle;
use crate::plan::{DistributionPlan, HaloPlan, Permutation};

/// Name reported by a backend that has not overridden [`StorageBackend::name`].
pub const UNINITIALIZED_BACKEND: &str = "SystemNone";

/// Trait that every particle storage layout must implement.
///
/// Index space: entries `0..owned` are this process's owned particles,
/// followed by the ghost region. `len()` is the allocated entry count; views
/// returned by `slice_*` always cover exactly `len()` entries.
pub trait StorageBackend: Send {
    /// Identifies the layout in diagnostics.
    fn name(&self) -> &'static str {
        UNINITIALIZED_BACKEND
    }

    /// Allocate initial zero-sized storage, discarding any existing entries.
    fn init(&mut self);

    /// Number of allocated entries.
    fn len(&self) -> usize;

    /// `true` when nothing is allocated.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to exactly `new_len` entries.
    ///
    /// Entries below `min(old_len, new_len)` keep their values and order; new
    /// entries are zeroed.
    fn resize(&mut self, new_len: usize);

    /// Reorder entries `0..permutation.len()` in place, applying the same
    /// permutation to every field.
    fn permute(&mut self, permutation: &Permutation) -> StorageResult<()>;

    /// Read entry `index` as a full record.
    fn particle(&self, index: usize) -> Option<Particle>;

    /// Overwrite entry `index` with `particle`.
    fn set_particle(&mut self, index: usize, particle: Particle) -> StorageResult<()>;

    /// Position view.
    fn slice_x(&self) -> FieldSlice<'_, [f64; 3]>;
    /// Velocity view.
    fn slice_v(&self) -> FieldSlice<'_, [f64; 3]>;
    /// Force view.
    fn slice_f(&self) -> FieldSlice<'_, [f64; 3]>;
    /// Type view.
    fn slice_type(&self) -> FieldSlice<'_, u32>;
    /// Global identifier view.
    fn slice_id(&self) -> FieldSlice<'_, u64>;
    /// Charge view.
    fn slice_q(&self) -> FieldSlice<'_, f64>;

    /// Replace the owned population according to `plan`.
    ///
    /// Owned entries destined for this rank stay in their relative order;
    /// entries received from other ranks follow in sender-rank order. The
    /// storage is resized to exactly the new owned count (the ghost region is
    /// dropped). Returns the new owned count.
    ///
    /// Collective: every rank of `comm` must call it.
    fn migrate(
        &mut self,
        comm: &dyn Communicator,
        owned: usize,
        plan: &DistributionPlan,
    ) -> StorageResult<usize> {
        let packed = plan.validate(owned, comm.size()).and_then(|()| {
            let mut outgoing: Vec<Vec<Particle>> = vec![Vec::new(); comm.size()];
            let mut kept = Vec::new();
            for (i, &dest) in plan.destinations().iter().enumerate() {
                let p = self.particle(i).ok_or_else(|| {
                    StorageError::contract("migrate", format!("owned entry {i} not allocated"))
                })?;
                if dest == comm.rank() {
                    kept.push(p);
                } else {
                    outgoing[dest].push(p);
                }
            }
            Ok((kept, outgoing))
        });
        // A rank with a bad plan still joins the exchange, sending nothing,
        // so its peers are not left blocked.
        let (kept, outgoing, local) = match packed {
            Ok((kept, outgoing)) => (kept, outgoing, Ok(())),
            Err(e) => (Vec::new(), vec![Vec::new(); comm.size()], Err(e)),
        };
        let incoming = exchange_records(comm, &outgoing)?;
        local?;

        let new_owned = kept.len() + incoming.iter().map(Vec::len).sum::<usize>();
        self.resize(new_owned);
        for (slot, p) in kept.into_iter().chain(incoming.into_iter().flatten()).enumerate() {
            self.set_particle(slot, p)?;
        }
        Ok(new_owned)
    }

    /// Fill the ghost region from `plan`.
    ///
    /// Each export copies an owned entry (position shifted) to its target
    /// rank. Received copies are placed after the owned entries in
    /// sender-rank order and the storage is resized to `owned + ghosts`.
    /// Calling it twice with the same plan and unchanged owned data yields
    /// identical ghosts. Returns the ghost count.
    ///
    /// Collective: every rank of `comm` must call it.
    fn gather(
        &mut self,
        comm: &dyn Communicator,
        owned: usize,
        plan: &HaloPlan,
    ) -> StorageResult<usize> {
        let packed = plan.validate(owned, comm.size()).and_then(|()| {
            let mut outgoing: Vec<Vec<Particle>> = vec![Vec::new(); comm.size()];
            for e in plan.exports() {
                let p = self.particle(e.index).ok_or_else(|| {
                    StorageError::contract("gather", format!("owned entry {} not allocated", e.index))
                })?;
                outgoing[e.rank].push(p.shifted(e.shift));
            }
            Ok(outgoing)
        });
        let (outgoing, local) = match packed {
            Ok(outgoing) => (outgoing, Ok(())),
            Err(e) => (vec![Vec::new(); comm.size()], Err(e)),
        };
        let incoming = exchange_records(comm, &outgoing)?;
        local?;

        let ghosts: usize = incoming.iter().map(Vec::len).sum();
        self.resize(owned + ghosts);
        for (k, p) in incoming.into_iter().flatten().enumerate() {
            self.set_particle(owned + k, p)?;
        }
        Ok(ghosts)
    }
}

/// Field grouping for whole-state output and restart.
#[derive(Debug)]
pub struct AllSlices<'a> {
    /// Positions
    pub x: FieldSlice<'a, [f64; 3]>,
    /// Velocities
    pub v: FieldSlice<'a, [f64; 3]>,
    /// Forces
    pub f: FieldSlice<'a, [f64; 3]>,
    /// Types
    pub kind: FieldSlice<'a, u32>,
    /// Identifiers
    pub id: FieldSlice<'a, u64>,
    /// Charges
    pub q: FieldSlice<'a, f64>,
}

/// Fields read by time integration.
#[derive(Debug)]
pub struct IntegrateSlices<'a> {
    /// Positions
    pub x: FieldSlice<'a, [f64; 3]>,
    /// Velocities
    pub v: FieldSlice<'a, [f64; 3]>,
    /// Forces
    pub f: FieldSlice<'a, [f64; 3]>,
    /// Types
    pub kind: FieldSlice<'a, u32>,
}

/// Fields read by force evaluation.
#[derive(Debug)]
pub struct ForceSlices<'a> {
    /// Positions
    pub x: FieldSlice<'a, [f64; 3]>,
    /// Forces
    pub f: FieldSlice<'a, [f64; 3]>,
    /// Types
    pub kind: FieldSlice<'a, u32>,
}

/// Fields read by thermodynamic property output.
#[derive(Debug)]
pub struct PropertySlices<'a> {
    /// Velocities
    pub v: FieldSlice<'a, [f64; 3]>,
    /// Types
    pub kind: FieldSlice<'a, u32>,
}

/// Available storage layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One contiguous array per field
    Soa,
    /// One contiguous array of whole particle records
    Aos,
    /// Fixed-width tiles, each holding every field for a block of particles
    #[default]
    Aosoa,
}

/// Create an empty, initialized backend for `layout`.
pub fn create_backend(layout: Layout) -> Box<dyn StorageBackend> {
    let mut backend: Box<dyn StorageBackend> = match layout {
        Layout::Soa => Box::new(SoaStorage::new()),
        Layout::Aos => Box::new(AosStorage::new()),
        Layout::Aosoa => Box::new(TiledStorage::new()),
    };
    backend.init();
    tracing::debug!("Created {} storage backend", backend.name());
    backend
}
