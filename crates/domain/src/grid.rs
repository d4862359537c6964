//! Distributed grid handle: global partition plus this process's haloed block.
//!
//! The global descriptor ([`GlobalGrid`]) spans the whole periodic box on a
//! uniform background mesh and records which contiguous cell block this
//! process owns. The local descriptor ([`LocalGrid`]) adds a halo of whole
//! cells around that block and answers corner/extent queries. Corner
//! coordinates are always derived from these descriptors, never stored
//! independently.

use storage::Communicator;

use crate::error::{DomainError, DomainResult};
use crate::geometry::MAX_HALO_CELLS;
use crate::partition::{block_position, BlockPartitioner};

/// Uniform background mesh over the global box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalMesh {
    low: [f64; 3],
    high: [f64; 3],
    cell_size: f64,
    num_cells: [usize; 3],
}

impl GlobalMesh {
    /// Mesh of cubic cells of edge `cell_size` over `[low, high]`.
    ///
    /// The cell count per axis is rounded to the nearest integer and the high
    /// corner snapped to `low + count * cell_size`.
    pub fn uniform(low: [f64; 3], high: [f64; 3], cell_size: f64) -> DomainResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(DomainError::Configuration(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        let mut num_cells = [0usize; 3];
        let mut snapped = high;
        for d in 0..3 {
            let n = ((high[d] - low[d]) / cell_size).round();
            if n < 1.0 {
                return Err(DomainError::Configuration(format!(
                    "box span along axis {d} is smaller than one cell"
                )));
            }
            num_cells[d] = n as usize;
            snapped[d] = low[d] + n * cell_size;
        }
        Ok(Self {
            low,
            high: snapped,
            cell_size,
            num_cells,
        })
    }

    /// Global low corner along `d`.
    pub fn low_corner(&self, d: usize) -> f64 {
        self.low[d]
    }

    /// Global high corner along `d`.
    pub fn high_corner(&self, d: usize) -> f64 {
        self.high[d]
    }

    /// Physical extent along `d`.
    pub fn extent(&self, d: usize) -> f64 {
        self.high[d] - self.low[d]
    }

    /// Cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Global cell count along `d`.
    pub fn global_num_cell(&self, d: usize) -> usize {
        self.num_cells[d]
    }
}

/// Global partition descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalGrid {
    mesh: GlobalMesh,
    periodic: [bool; 3],
    ranks_per_dim: [usize; 3],
    block_id: [usize; 3],
    owned_num_cell: [usize; 3],
    global_offset: [usize; 3],
}

impl GlobalGrid {
    /// Partition `mesh` over the ranks of `comm`.
    ///
    /// Collective: every rank must call it. The group verifies by
    /// all-reduce that the owned blocks tile the global mesh exactly.
    pub fn new(
        comm: &dyn Communicator,
        mesh: GlobalMesh,
        periodic: [bool; 3],
        partitioner: &BlockPartitioner,
    ) -> DomainResult<Self> {
        let ranks_per_dim = partitioner.ranks_per_dimension(comm.size());
        let block_id = block_position(comm.rank(), ranks_per_dim);

        let mut owned_num_cell = [0usize; 3];
        let mut global_offset = [0usize; 3];
        let mut too_fine = None;
        for d in 0..3 {
            let cells = mesh.global_num_cell(d);
            let blocks = ranks_per_dim[d];
            if cells < blocks {
                too_fine = Some(d);
            }
            let base = cells / blocks;
            let remainder = cells % blocks;
            owned_num_cell[d] = base + usize::from(block_id[d] < remainder);
            global_offset[d] = block_id[d] * base + block_id[d].min(remainder);
        }

        // Agreement runs before local errors are reported so no peer blocks.
        let owned_cells: u64 = owned_num_cell.iter().map(|&n| n as u64).product();
        let tiled_cells = comm.all_reduce_sum(owned_cells)?;
        if let Some(d) = too_fine {
            return Err(DomainError::Configuration(format!(
                "{} cells along axis {d} cannot be split across {} ranks",
                mesh.global_num_cell(d),
                ranks_per_dim[d]
            )));
        }
        let total_cells: u64 = (0..3).map(|d| mesh.global_num_cell(d) as u64).product();
        if tiled_cells != total_cells {
            return Err(DomainError::CommunicationFailure(format!(
                "owned blocks cover {tiled_cells} cells, global mesh has {total_cells}"
            )));
        }

        Ok(Self {
            mesh,
            periodic,
            ranks_per_dim,
            block_id,
            owned_num_cell,
            global_offset,
        })
    }

    /// Replace this block's owned cell count and global offset.
    ///
    /// Process-grid shape and periodicity are untouched.
    pub fn set_num_cell_and_offset(
        &mut self,
        num_cell: [usize; 3],
        offset: [usize; 3],
    ) -> DomainResult<()> {
        for d in 0..3 {
            if num_cell[d] == 0 {
                return Err(DomainError::Configuration(format!(
                    "owned block along axis {d} must span at least one cell"
                )));
            }
            if offset[d] + num_cell[d] > self.mesh.global_num_cell(d) {
                return Err(DomainError::Configuration(format!(
                    "owned block along axis {d} ends at cell {}, mesh has {}",
                    offset[d] + num_cell[d],
                    self.mesh.global_num_cell(d)
                )));
            }
        }
        self.owned_num_cell = num_cell;
        self.global_offset = offset;
        Ok(())
    }

    /// Background mesh.
    pub fn mesh(&self) -> &GlobalMesh {
        &self.mesh
    }

    /// Whether axis `d` wraps around.
    pub fn is_periodic(&self, d: usize) -> bool {
        self.periodic[d]
    }

    /// Ranks along axis `d`.
    pub fn dim_num_block(&self, d: usize) -> usize {
        self.ranks_per_dim[d]
    }

    /// This process's block coordinate along axis `d`.
    pub fn dim_block_id(&self, d: usize) -> usize {
        self.block_id[d]
    }

    /// Cells owned along axis `d`.
    pub fn owned_num_cell(&self, d: usize) -> usize {
        self.owned_num_cell[d]
    }

    /// Global index of the first owned cell along axis `d`.
    pub fn global_offset(&self, d: usize) -> usize {
        self.global_offset[d]
    }
}

/// Which region of the local block a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Owned cells only
    Own,
    /// Owned cells plus the halo
    Ghost,
}

/// Local descriptor: this process's owned block plus a halo of whole cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalGrid<'g> {
    global: &'g GlobalGrid,
    halo_cells: usize,
}

impl<'g> LocalGrid<'g> {
    /// Halo width in cells.
    pub fn halo_cells(&self) -> usize {
        self.halo_cells
    }

    /// Halo cells on the low (`upper == false`) or high face along `d`.
    ///
    /// Periodic axes always carry a halo; non-periodic axes omit it on the
    /// outer face of the edge blocks.
    fn face_halo(&self, d: usize, upper: bool) -> usize {
        let g = self.global;
        let edge = if upper {
            g.dim_block_id(d) + 1 == g.dim_num_block(d)
        } else {
            g.dim_block_id(d) == 0
        };
        if g.is_periodic(d) || !edge {
            self.halo_cells
        } else {
            0
        }
    }

    /// Low corner of `region` along `d`.
    pub fn low_corner(&self, region: Region, d: usize) -> f64 {
        let mesh = self.global.mesh();
        let mut cell = self.global.global_offset(d) as f64;
        if region == Region::Ghost {
            cell -= self.face_halo(d, false) as f64;
        }
        mesh.low_corner(d) + cell * mesh.cell_size()
    }

    /// High corner of `region` along `d`.
    pub fn high_corner(&self, region: Region, d: usize) -> f64 {
        let mesh = self.global.mesh();
        let mut cell = (self.global.global_offset(d) + self.global.owned_num_cell(d)) as f64;
        if region == Region::Ghost {
            cell += self.face_halo(d, true) as f64;
        }
        mesh.low_corner(d) + cell * mesh.cell_size()
    }

    /// Extent of `region` along `d`.
    pub fn extent(&self, region: Region, d: usize) -> f64 {
        let mut cells = self.global.owned_num_cell(d);
        if region == Region::Ghost {
            cells += self.face_halo(d, false) + self.face_halo(d, true);
        }
        cells as f64 * self.global.mesh().cell_size()
    }
}

/// Owns the global partition and the halo width of the local block.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedGrid {
    global: GlobalGrid,
    halo_cells: usize,
}

impl DistributedGrid {
    /// Partition the periodic box `[low, high]` across the ranks of `comm`
    /// with a halo of `ceil(cutoff / cell_size)` cells.
    ///
    /// `halo_cells` is supplied by the caller, already derived from the cutoff.
    ///
    /// Collective: every rank must call it, in the same order relative to
    /// other collective calls, from one thread per rank.
    pub fn partition(
        comm: &dyn Communicator,
        low: [f64; 3],
        high: [f64; 3],
        cell_size: f64,
        halo_cells: usize,
    ) -> DomainResult<Self> {
        let mesh = GlobalMesh::uniform(low, high, cell_size)?;
        let global = GlobalGrid::new(comm, mesh, [true; 3], &BlockPartitioner)?;
        if halo_cells > MAX_HALO_CELLS {
            return Err(DomainError::Configuration(format!(
                "halo of {halo_cells} cells exceeds the limit of {MAX_HALO_CELLS}"
            )));
        }
        Ok(Self { global, halo_cells })
    }

    /// Move this process's owned boundary to `[owned_low, owned_high]`.
    ///
    /// Coordinates are physical positions in the global frame; each is
    /// rounded to the nearest cell boundary. Only the owned cell count and
    /// offset change.
    ///
    /// Collective: every rank must call it (it ends on a barrier).
    pub fn rebalance(
        &mut self,
        comm: &dyn Communicator,
        owned_low: [f64; 3],
        owned_high: [f64; 3],
        cell_size: f64,
    ) -> DomainResult<()> {
        let origin = [
            self.global.mesh().low_corner(0),
            self.global.mesh().low_corner(1),
            self.global.mesh().low_corner(2),
        ];
        let mut result = Ok(());
        let mut offset = [0usize; 3];
        let mut num_cell = [0usize; 3];
        for d in 0..3 {
            let lo = ((owned_low[d] - origin[d]) / cell_size).round();
            let hi = ((owned_high[d] - origin[d]) / cell_size).round();
            if !(lo.is_finite() && hi.is_finite()) || lo < 0.0 || hi <= lo {
                result = Err(DomainError::Configuration(format!(
                    "owned boundary along axis {d} ([{}, {}]) is empty or outside the box",
                    owned_low[d], owned_high[d]
                )));
                break;
            }
            offset[d] = lo as usize;
            num_cell[d] = (hi - lo) as usize;
        }
        if result.is_ok() {
            result = self.global.set_num_cell_and_offset(num_cell, offset);
        }
        comm.barrier()?;
        result
    }

    /// Global partition descriptor.
    pub fn global(&self) -> &GlobalGrid {
        &self.global
    }

    /// Local descriptor with halo.
    pub fn local(&self) -> LocalGrid<'_> {
        LocalGrid {
            global: &self.global,
            halo_cells: self.halo_cells,
        }
    }

    /// Ranks along each axis.
    pub fn ranks_per_dim(&self) -> [usize; 3] {
        [0, 1, 2].map(|d| self.global.dim_num_block(d))
    }

    /// This process's position in the process grid.
    pub fn rank_dim_pos(&self) -> [usize; 3] {
        [0, 1, 2].map(|d| self.global.dim_block_id(d))
    }
}
