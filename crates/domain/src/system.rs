//! Domain Manager: single owner of domain geometry and population counts.
//!
//! [`DomainManager`] composes the distributed grid, the mesh geometry tracker,
//! a storage backend and the process group. Counts follow these invariants
//! after every operation:
//!
//! - `n_local + n_ghost <= n_max` (`n_max` is the backend allocation)
//! - `n_local <= n`
//!
//! `create_domain`, `update_domain`, `populate`, `migrate` and `gather` are
//! collective: every rank of the group must call them in the same order.
//! `resize`, `permute` and the slice groupings are local.

use std::sync::Arc;

use storage::{
    create_backend, AllSlices, Communicator, DistributionPlan, ForceSlices, HaloPlan,
    IntegrateSlices, Particle, Permutation, PropertySlices, StorageBackend,
};

use crate::config::{AtomStyle, DomainConfig, UnitConfig, DEFAULT_GRID_NUM_CELLS};
use crate::error::{DomainError, DomainResult};
use crate::geometry::{GridResolution, MeshGeometry, MeshTracker};
use crate::grid::DistributedGrid;

/// Particle population counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    /// Particles across all processes
    pub global: usize,
    /// Entries allocated in the backend
    pub capacity: usize,
    /// Particles owned by this process
    pub owned: usize,
    /// Ghost copies held by this process
    pub ghost: usize,
}

/// Grid and geometry that exist once the domain is created.
#[derive(Debug, Clone)]
struct Decomposition {
    grid: DistributedGrid,
    tracker: MeshTracker,
}

/// Domain and population bookkeeping for one process.
pub struct DomainManager {
    comm: Arc<dyn Communicator>,
    backend: Box<dyn StorageBackend>,
    units: UnitConfig,
    atom_style: AtomStyle,
    grid_num_cells: usize,
    counts: PopulationCounts,
    masses: Vec<f64>,
    decomposition: Option<Decomposition>,
}

impl std::fmt::Debug for DomainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainManager")
            .field("backend", &self.backend.name())
            .field("rank", &self.comm.rank())
            .field("counts", &self.counts)
            .field("initialized", &self.decomposition.is_some())
            .finish()
    }
}

impl DomainManager {
    /// Manager over `backend` with a single particle type.
    ///
    /// The backend is (re)initialized to zero entries.
    pub fn new(
        mut backend: Box<dyn StorageBackend>,
        comm: Arc<dyn Communicator>,
        units: UnitConfig,
    ) -> Self {
        backend.init();
        Self {
            comm,
            backend,
            units,
            atom_style: AtomStyle::default(),
            grid_num_cells: DEFAULT_GRID_NUM_CELLS,
            counts: PopulationCounts::default(),
            masses: vec![0.0],
            decomposition: None,
        }
    }

    /// Override the background grid resolution used by `create_domain`.
    pub fn with_grid_num_cells(mut self, grid_num_cells: usize) -> Self {
        self.grid_num_cells = grid_num_cells;
        self
    }

    /// Set the particle model descriptor.
    pub fn with_atom_style(mut self, atom_style: AtomStyle) -> Self {
        self.atom_style = atom_style;
        self
    }

    /// Build a manager from a validated configuration and create the domain.
    ///
    /// Collective.
    pub fn from_config(config: &DomainConfig, comm: Arc<dyn Communicator>) -> DomainResult<Self> {
        config.validate()?;
        let mut manager = Self::new(create_backend(config.layout), comm, config.units)
            .with_grid_num_cells(config.grid_num_cells)
            .with_atom_style(config.atom_style);
        manager.set_type_count(config.type_count)?;
        if let Some(masses) = &config.masses {
            for (kind, &mass) in masses.iter().enumerate() {
                manager.set_mass(kind, mass)?;
            }
        }
        manager.create_domain(config.low_corner, config.high_corner, config.cutoff)?;
        Ok(manager)
    }

    /// Partition the periodic box `[low, high]` and derive the halo.
    ///
    /// `cutoff` sets the halo width; when omitted the largest axis span of
    /// the box is used. Fails with a configuration error on a non-cubic box
    /// or a second call, leaving the manager unchanged.
    ///
    /// Collective.
    pub fn create_domain(
        &mut self,
        low: [f64; 3],
        high: [f64; 3],
        cutoff: Option<f64>,
    ) -> DomainResult<()> {
        if self.decomposition.is_some() {
            return Err(DomainError::Configuration(
                "domain has already been created".to_string(),
            ));
        }
        let cutoff = cutoff.unwrap_or_else(|| {
            (0..3)
                .map(|d| high[d] - low[d])
                .fold(f64::NEG_INFINITY, f64::max)
        });

        let resolution = GridResolution::create(low, high, cutoff, self.grid_num_cells)?;
        let grid = DistributedGrid::partition(
            self.comm.as_ref(),
            low,
            high,
            resolution.cell_size(),
            resolution.halo_cells(),
        )?;
        let tracker = MeshTracker::new(resolution, &grid);

        tracing::info!(
            "Domain created on rank {}: process grid {:?} at {:?}, cell size {}, halo {} cells",
            self.comm.rank(),
            grid.ranks_per_dim(),
            grid.rank_dim_pos(),
            resolution.cell_size(),
            resolution.halo_cells()
        );
        self.decomposition = Some(Decomposition { grid, tracker });
        Ok(())
    }

    /// Move this process's owned boundary to `[low, high]`.
    ///
    /// Coordinates are physical positions in the global frame and must
    /// already agree with the neighbors' new boundaries; no cross-process
    /// check is made. Process-grid shape and periodicity are unchanged. On
    /// error the previous geometry stays in effect.
    ///
    /// Collective.
    pub fn update_domain(&mut self, low: [f64; 3], high: [f64; 3]) -> DomainResult<()> {
        let comm = Arc::clone(&self.comm);
        let decomposition = self
            .decomposition
            .as_mut()
            .ok_or(DomainError::Uninitialized("update_domain"))?;
        let cell_size = decomposition.tracker.resolution().cell_size();
        decomposition
            .grid
            .rebalance(comm.as_ref(), low, high, cell_size)?;
        decomposition.tracker.refresh_from_grid(&decomposition.grid);

        let geometry = decomposition.tracker.geometry();
        tracing::debug!(
            "Domain updated on rank {}: owned {:?}..{:?}",
            comm.rank(),
            geometry.owned_lo(),
            geometry.owned_hi()
        );
        Ok(())
    }

    /// Whether `create_domain` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.decomposition.is_some()
    }

    /// Current geometry snapshot.
    pub fn geometry(&self) -> DomainResult<&MeshGeometry> {
        self.decomposition
            .as_ref()
            .map(|d| d.tracker.geometry())
            .ok_or(DomainError::Uninitialized("geometry"))
    }

    /// Physical halo width.
    pub fn halo_width(&self) -> DomainResult<f64> {
        Ok(self.geometry()?.halo_width())
    }

    /// Process-grid shape.
    pub fn ranks_per_dim(&self) -> DomainResult<[usize; 3]> {
        self.decomposition
            .as_ref()
            .map(|d| d.grid.ranks_per_dim())
            .ok_or(DomainError::Uninitialized("ranks_per_dim"))
    }

    /// This process's position in the process grid.
    pub fn rank_dim_pos(&self) -> DomainResult<[usize; 3]> {
        self.decomposition
            .as_ref()
            .map(|d| d.grid.rank_dim_pos())
            .ok_or(DomainError::Uninitialized("rank_dim_pos"))
    }

    /// Distributed grid handle.
    pub fn grid(&self) -> DomainResult<&DistributedGrid> {
        self.decomposition
            .as_ref()
            .map(|d| &d.grid)
            .ok_or(DomainError::Uninitialized("grid"))
    }

    /// Unit constants.
    pub fn units(&self) -> &UnitConfig {
        &self.units
    }

    /// Particle model descriptor.
    pub fn atom_style(&self) -> AtomStyle {
        self.atom_style
    }

    /// Backend name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Process group.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// Global particle count `N`.
    pub fn n(&self) -> usize {
        self.counts.global
    }

    /// Owned particle count `N_local`.
    pub fn n_local(&self) -> usize {
        self.counts.owned
    }

    /// Ghost count `N_ghost`.
    pub fn n_ghost(&self) -> usize {
        self.counts.ghost
    }

    /// Allocated entries `N_max`.
    pub fn n_max(&self) -> usize {
        self.counts.capacity
    }

    /// All counters.
    pub fn counts(&self) -> PopulationCounts {
        self.counts
    }

    // ---- Per-type properties ----

    /// Number of particle types.
    pub fn type_count(&self) -> usize {
        self.masses.len()
    }

    /// Set the number of particle types; the mass table is re-created zeroed.
    pub fn set_type_count(&mut self, type_count: usize) -> DomainResult<()> {
        if type_count == 0 {
            return Err(DomainError::Configuration(
                "type_count must be at least 1".to_string(),
            ));
        }
        self.masses = vec![0.0; type_count];
        Ok(())
    }

    /// Set the mass of type `kind`.
    pub fn set_mass(&mut self, kind: usize, mass: f64) -> DomainResult<()> {
        let type_count = self.masses.len();
        let slot = self.masses.get_mut(kind).ok_or_else(|| {
            DomainError::ContractViolation(format!(
                "type {kind} out of range for {type_count} types"
            ))
        })?;
        *slot = mass;
        Ok(())
    }

    /// Mass of type `kind`.
    pub fn mass(&self, kind: usize) -> DomainResult<f64> {
        self.masses.get(kind).copied().ok_or_else(|| {
            DomainError::ContractViolation(format!(
                "type {kind} out of range for {} types",
                self.masses.len()
            ))
        })
    }

    /// Mass table indexed by type.
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    // ---- Population ----

    /// Grow or shrink the backend to `new_len` entries.
    ///
    /// Shrinking drops ghosts first; shrinking below the owned count is a
    /// contract violation.
    pub fn resize(&mut self, new_len: usize) -> DomainResult<()> {
        if new_len < self.counts.owned {
            return Err(DomainError::ContractViolation(format!(
                "resize to {new_len} would drop owned entries ({} owned)",
                self.counts.owned
            )));
        }
        self.backend.resize(new_len);
        self.check_allocation("resize", new_len)?;
        self.counts.capacity = new_len;
        self.counts.ghost = self.counts.ghost.min(new_len - self.counts.owned);
        tracing::debug!("Resized {} to {} entries", self.backend.name(), new_len);
        Ok(())
    }

    /// Reorder the owned entries.
    ///
    /// `permutation` must cover exactly `N_local` entries.
    pub fn permute(&mut self, permutation: &Permutation) -> DomainResult<()> {
        if permutation.len() != self.counts.owned {
            return Err(DomainError::ContractViolation(format!(
                "permutation covers {} entries, {} owned",
                permutation.len(),
                self.counts.owned
            )));
        }
        self.backend.permute(permutation)?;
        self.check_allocation("permute", self.counts.capacity)
    }

    /// Replace this process's owned population with `particles`.
    ///
    /// Ghosts are dropped and the global count becomes the group-wide sum.
    ///
    /// Collective.
    pub fn populate(&mut self, particles: &[Particle]) -> DomainResult<()> {
        self.backend.resize(particles.len());
        let written = particles
            .iter()
            .enumerate()
            .try_for_each(|(i, p)| self.backend.set_particle(i, *p));
        let local = if written.is_ok() { particles.len() } else { 0 };
        let global = self.comm.all_reduce_sum(local as u64)?;
        written?;

        self.counts = PopulationCounts {
            global: global as usize,
            capacity: self.backend.len(),
            owned: particles.len(),
            ghost: 0,
        };
        tracing::info!(
            "Rank {} populated with {} particles ({} global)",
            self.comm.rank(),
            self.counts.owned,
            self.counts.global
        );
        Ok(())
    }

    /// Redistribute owned entries according to `plan`.
    ///
    /// Ghosts are dropped. The group verifies that no particle was lost or
    /// duplicated.
    ///
    /// Collective.
    pub fn migrate(&mut self, plan: &DistributionPlan) -> DomainResult<()> {
        let moved = self
            .backend
            .migrate(self.comm.as_ref(), self.counts.owned, plan);
        // A rank whose migrate failed still joins the count check.
        let contribution = moved.as_ref().map_or(0, |n| *n as u64);
        let global = self.comm.all_reduce_sum(contribution)?;
        let new_owned = moved?;

        if global as usize != self.counts.global {
            return Err(DomainError::CommunicationFailure(format!(
                "migrate changed global particle count from {} to {global}",
                self.counts.global
            )));
        }

        tracing::debug!(
            "Rank {} migrated: {} -> {} owned",
            self.comm.rank(),
            self.counts.owned,
            new_owned
        );
        self.counts.owned = new_owned;
        self.counts.ghost = 0;
        self.counts.capacity = self.backend.len();
        self.check_allocation("migrate", new_owned)
    }

    /// Fill the ghost region according to `plan`.
    ///
    /// If any rank fails, every rank fails: ranks whose own exchange
    /// succeeded drop the ghosts they received and report a communication
    /// failure.
    ///
    /// Collective.
    pub fn gather(&mut self, plan: &HaloPlan) -> DomainResult<()> {
        let gathered = self
            .backend
            .gather(self.comm.as_ref(), self.counts.owned, plan);
        let failures = self.comm.all_reduce_sum(u64::from(gathered.is_err()))?;
        let ghosts = gathered?;
        if failures > 0 {
            self.backend.resize(self.counts.owned);
            self.counts.ghost = 0;
            self.counts.capacity = self.backend.len();
            return Err(DomainError::CommunicationFailure(format!(
                "gather failed on {failures} of {} ranks",
                self.comm.size()
            )));
        }
        self.counts.ghost = ghosts;
        self.counts.capacity = self.backend.len();
        tracing::debug!("Rank {} gathered {} ghosts", self.comm.rank(), ghosts);
        self.check_allocation("gather", self.counts.owned + ghosts)
    }

    /// Read entry `index`.
    pub fn particle(&self, index: usize) -> Option<Particle> {
        self.backend.particle(index)
    }

    // ---- Field groupings ----

    /// Every field, for output and restart.
    pub fn slice_all(&self) -> DomainResult<AllSlices<'_>> {
        let b = self.backend.as_ref();
        let slices = AllSlices {
            x: b.slice_x(),
            v: b.slice_v(),
            f: b.slice_f(),
            kind: b.slice_type(),
            id: b.slice_id(),
            q: b.slice_q(),
        };
        let lens = [
            slices.x.len(),
            slices.v.len(),
            slices.f.len(),
            slices.kind.len(),
            slices.id.len(),
            slices.q.len(),
        ];
        self.check_views("slice_all", &lens)?;
        Ok(slices)
    }

    /// Fields needed by time integration.
    pub fn slice_integrate(&self) -> DomainResult<IntegrateSlices<'_>> {
        let b = self.backend.as_ref();
        let slices = IntegrateSlices {
            x: b.slice_x(),
            v: b.slice_v(),
            f: b.slice_f(),
            kind: b.slice_type(),
        };
        let lens = [
            slices.x.len(),
            slices.v.len(),
            slices.f.len(),
            slices.kind.len(),
        ];
        self.check_views("slice_integrate", &lens)?;
        Ok(slices)
    }

    /// Fields needed by force evaluation.
    pub fn slice_force(&self) -> DomainResult<ForceSlices<'_>> {
        let b = self.backend.as_ref();
        let slices = ForceSlices {
            x: b.slice_x(),
            f: b.slice_f(),
            kind: b.slice_type(),
        };
        let lens = [slices.x.len(), slices.f.len(), slices.kind.len()];
        self.check_views("slice_force", &lens)?;
        Ok(slices)
    }

    /// Fields needed by thermodynamic property output.
    pub fn slice_properties(&self) -> DomainResult<PropertySlices<'_>> {
        let b = self.backend.as_ref();
        let slices = PropertySlices {
            v: b.slice_v(),
            kind: b.slice_type(),
        };
        let lens = [slices.v.len(), slices.kind.len()];
        self.check_views("slice_properties", &lens)?;
        Ok(slices)
    }

    /// Backend must hold exactly `expected` entries after `operation`.
    fn check_allocation(&self, operation: &str, expected: usize) -> DomainResult<()> {
        let len = self.backend.len();
        if len != expected {
            return Err(DomainError::ContractViolation(format!(
                "{} reports {len} entries after {operation}, expected {expected}",
                self.backend.name()
            )));
        }
        Ok(())
    }

    /// Every view must span the allocation, which must hold owned + ghosts.
    fn check_views(&self, operation: &str, lens: &[usize]) -> DomainResult<()> {
        let len = self.backend.len();
        let required = self.counts.owned + self.counts.ghost;
        if len < required {
            return Err(DomainError::ContractViolation(format!(
                "{operation}: backend holds {len} entries, {required} owned + ghost"
            )));
        }
        if let Some(bad) = lens.iter().find(|&&l| l != len) {
            return Err(DomainError::ContractViolation(format!(
                "{operation}: view spans {bad} entries, backend holds {len}"
            )));
        }
        Ok(())
    }
}
