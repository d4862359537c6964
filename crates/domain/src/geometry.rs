//! Mesh geometry: cell resolution, halo width, and per-process corners.
//!
//! [`GridResolution`] fixes the global box, cell size and halo width once at
//! setup. [`MeshGeometry`] is an immutable snapshot of the owned and ghost
//! corners read off a [`DistributedGrid`]; [`MeshTracker`] holds the current
//! snapshot and replaces it wholesale whenever the grid changes.

use crate::error::{DomainError, DomainResult};
use crate::grid::{DistributedGrid, Region};

/// Largest representable halo, in cells.
pub const MAX_HALO_CELLS: usize = usize::MAX / 4;

/// Floating tolerance for coordinates of magnitude `magnitude`.
pub fn tolerance(magnitude: f64) -> f64 {
    100.0 * f64::EPSILON * magnitude.abs().max(1.0)
}

/// Global box, cell size and halo width, validated for a cubic domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridResolution {
    low: [f64; 3],
    high: [f64; 3],
    cell_size: f64,
    halo_width: f64,
    halo_cells: usize,
}

impl GridResolution {
    /// Validate the box and derive the background mesh resolution.
    ///
    /// Fails with a configuration error when the box is not cubic, the
    /// cutoff is negative or not finite, or `grid_num_cells` is zero.
    pub fn create(
        low: [f64; 3],
        high: [f64; 3],
        cutoff: f64,
        grid_num_cells: usize,
    ) -> DomainResult<Self> {
        if grid_num_cells == 0 {
            return Err(DomainError::Configuration(
                "grid_num_cells must be at least 1".to_string(),
            ));
        }
        if !(cutoff.is_finite() && cutoff >= 0.0) {
            return Err(DomainError::Configuration(format!(
                "cutoff must be finite and non-negative, got {cutoff}"
            )));
        }

        let extent = [0, 1, 2].map(|d| high[d] - low[d]);
        if extent.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(DomainError::Configuration(format!(
                "box extents must be positive, got {extent:?}"
            )));
        }
        let scale = extent[0].max(extent[1]).max(extent[2]);
        let tol = tolerance(scale);
        if (extent[0] - extent[1]).abs() > tol || (extent[0] - extent[2]).abs() > tol {
            return Err(DomainError::Configuration(format!(
                "simulation box must be cubic, got extents {extent:?}"
            )));
        }

        let cell_size = extent[0] / grid_num_cells as f64;
        let ratio = cutoff / cell_size;
        let nearest = ratio.round();
        // Snap ratios that are whole numbers up to rounding noise.
        let halo_cells = if (ratio - nearest).abs() <= tolerance(ratio) {
            nearest
        } else {
            ratio.ceil()
        };
        // Both faces plus the owned block must still fit in a cell count.
        if !(halo_cells.is_finite() && halo_cells <= MAX_HALO_CELLS as f64) {
            return Err(DomainError::Configuration(format!(
                "cutoff {cutoff} spans {ratio} cells of size {cell_size}, limit is {MAX_HALO_CELLS}"
            )));
        }
        let halo_cells = halo_cells as usize;

        Ok(Self {
            low,
            high,
            cell_size,
            halo_width: cutoff,
            halo_cells,
        })
    }

    /// Global low corner.
    pub fn low_corner(&self) -> [f64; 3] {
        self.low
    }

    /// Global high corner.
    pub fn high_corner(&self) -> [f64; 3] {
        self.high
    }

    /// Background cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Physical halo width (the interaction cutoff).
    pub fn halo_width(&self) -> f64 {
        self.halo_width
    }

    /// Halo width in whole cells, `ceil(halo_width / cell_size)`.
    pub fn halo_cells(&self) -> usize {
        self.halo_cells
    }
}

/// Snapshot of this process's domain geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshGeometry {
    global_extent: [f64; 3],
    cell_size: f64,
    halo_width: f64,
    halo_cells: usize,
    owned_lo: [f64; 3],
    owned_hi: [f64; 3],
    ghost_lo: [f64; 3],
    ghost_hi: [f64; 3],
    owned_extent: [f64; 3],
}

impl MeshGeometry {
    /// Read every corner off the local descriptor of `grid`.
    pub fn from_grid(resolution: &GridResolution, grid: &DistributedGrid) -> Self {
        let local = grid.local();
        let mesh = grid.global().mesh();
        Self {
            global_extent: [0, 1, 2].map(|d| mesh.extent(d)),
            cell_size: resolution.cell_size(),
            halo_width: resolution.halo_width(),
            halo_cells: local.halo_cells(),
            owned_lo: [0, 1, 2].map(|d| local.low_corner(Region::Own, d)),
            owned_hi: [0, 1, 2].map(|d| local.high_corner(Region::Own, d)),
            ghost_lo: [0, 1, 2].map(|d| local.low_corner(Region::Ghost, d)),
            ghost_hi: [0, 1, 2].map(|d| local.high_corner(Region::Ghost, d)),
            owned_extent: [0, 1, 2].map(|d| local.extent(Region::Own, d)),
        }
    }

    /// Size of the full periodic volume.
    pub fn global_extent(&self) -> [f64; 3] {
        self.global_extent
    }

    /// Background cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Physical halo width.
    pub fn halo_width(&self) -> f64 {
        self.halo_width
    }

    /// Halo width in cells.
    pub fn halo_cells(&self) -> usize {
        self.halo_cells
    }

    /// Low corner of the owned sub-volume.
    pub fn owned_lo(&self) -> [f64; 3] {
        self.owned_lo
    }

    /// High corner of the owned sub-volume.
    pub fn owned_hi(&self) -> [f64; 3] {
        self.owned_hi
    }

    /// Low corner of the halo-expanded sub-volume.
    pub fn ghost_lo(&self) -> [f64; 3] {
        self.ghost_lo
    }

    /// High corner of the halo-expanded sub-volume.
    pub fn ghost_hi(&self) -> [f64; 3] {
        self.ghost_hi
    }

    /// Owned extent along each axis.
    pub fn owned_extent(&self) -> [f64; 3] {
        self.owned_extent
    }

    /// Whether `pos` lies in the owned sub-volume (half-open on the high side).
    pub fn owns(&self, pos: [f64; 3]) -> bool {
        (0..3).all(|d| pos[d] >= self.owned_lo[d] && pos[d] < self.owned_hi[d])
    }
}

/// Holds the current [`MeshGeometry`] for one process.
#[derive(Debug, Clone)]
pub struct MeshTracker {
    resolution: GridResolution,
    current: MeshGeometry,
}

impl MeshTracker {
    /// Tracker initialized from `grid`.
    pub fn new(resolution: GridResolution, grid: &DistributedGrid) -> Self {
        let current = MeshGeometry::from_grid(&resolution, grid);
        Self {
            resolution,
            current,
        }
    }

    /// Re-derive every corner from `grid`.
    ///
    /// Must follow any change to the grid's local descriptor.
    pub fn refresh_from_grid(&mut self, grid: &DistributedGrid) {
        let next = MeshGeometry::from_grid(&self.resolution, grid);
        self.current = next;
    }

    /// Current geometry snapshot.
    pub fn geometry(&self) -> &MeshGeometry {
        &self.current
    }

    /// Resolution fixed at creation.
    pub fn resolution(&self) -> &GridResolution {
        &self.resolution
    }
}
