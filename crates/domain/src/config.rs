//! Configuration parsing and validation for domain setup

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use storage::Layout;

use crate::error::{DomainError, DomainResult};

/// Default background grid resolution (cells along the cubic edge).
pub const DEFAULT_GRID_NUM_CELLS: usize = 2000;

/// Simulation-wide unit constants.
///
/// Fixed at construction of the domain manager and identical on every
/// process; physics kernels only read them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Boltzmann constant in simulation units
    pub boltzmann: f64,
    /// Conversion factor from m*v^2 to energy units
    pub velocity_to_energy: f64,
    /// Integration timestep
    pub timestep: f64,
}

impl UnitConfig {
    /// Reduced Lennard-Jones units.
    pub fn lj() -> Self {
        Self {
            boltzmann: 1.0,
            velocity_to_energy: 1.0,
            timestep: 0.005,
        }
    }

    /// Metal units (eV, Angstrom, ps).
    pub fn metal() -> Self {
        Self {
            boltzmann: 8.617343e-5,
            velocity_to_energy: 1.0364269e-4,
            timestep: 0.001,
        }
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self::lj()
    }
}

/// Particle model descriptor carried for I/O collaborators.
///
/// Every style stores the same fields; `Charge` only signals that the
/// charge field is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomStyle {
    /// Point particles without charge
    #[default]
    Atomic,
    /// Point particles with charge
    Charge,
}

impl AtomStyle {
    /// Name used in input decks and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Charge => "charge",
        }
    }
}

/// Domain setup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Lower corner of the periodic simulation box
    pub low_corner: [f64; 3],
    /// Upper corner of the periodic simulation box (box must be cubic)
    pub high_corner: [f64; 3],
    /// Interaction cutoff that sets the halo width; defaults to the largest
    /// box span
    #[serde(default)]
    pub cutoff: Option<f64>,
    /// Background grid cells along each edge
    #[serde(default = "default_grid_num_cells")]
    pub grid_num_cells: usize,
    /// Number of particle types
    #[serde(default = "default_type_count")]
    pub type_count: usize,
    /// Per-type masses (length must equal `type_count`)
    #[serde(default)]
    pub masses: Option<Vec<f64>>,
    /// Storage layout for particle fields
    #[serde(default)]
    pub layout: Layout,
    /// Particle model descriptor
    #[serde(default)]
    pub atom_style: AtomStyle,
    /// Unit constants
    #[serde(default)]
    pub units: UnitConfig,
}

fn default_grid_num_cells() -> usize {
    DEFAULT_GRID_NUM_CELLS
}

fn default_type_count() -> usize {
    1
}

impl DomainConfig {
    /// Minimal configuration for a box with all defaults.
    pub fn new(low_corner: [f64; 3], high_corner: [f64; 3]) -> Self {
        Self {
            low_corner,
            high_corner,
            cutoff: None,
            grid_num_cells: DEFAULT_GRID_NUM_CELLS,
            type_count: 1,
            masses: None,
            layout: Layout::default(),
            atom_style: AtomStyle::default(),
            units: UnitConfig::default(),
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| DomainError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: DomainConfig = serde_json::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Cubic-ness is checked by the mesh geometry at domain creation, where
    /// the tolerance is applied consistently.
    pub fn validate(&self) -> DomainResult<()> {
        for d in 0..3 {
            if !self.low_corner[d].is_finite() || !self.high_corner[d].is_finite() {
                return Err(DomainError::Configuration(format!(
                    "box corner along axis {d} is not finite"
                )));
            }
            if self.low_corner[d] >= self.high_corner[d] {
                return Err(DomainError::Configuration(format!(
                    "low corner must be below high corner along axis {d}"
                )));
            }
        }

        if let Some(cutoff) = self.cutoff {
            if !(cutoff.is_finite() && cutoff >= 0.0) {
                return Err(DomainError::Configuration(
                    "cutoff must be finite and non-negative".to_string(),
                ));
            }
        }

        if self.grid_num_cells == 0 {
            return Err(DomainError::Configuration(
                "grid_num_cells must be at least 1".to_string(),
            ));
        }

        if self.type_count == 0 {
            return Err(DomainError::Configuration(
                "type_count must be at least 1".to_string(),
            ));
        }

        if let Some(masses) = &self.masses {
            if masses.len() != self.type_count {
                return Err(DomainError::Configuration(format!(
                    "{} masses given for {} types",
                    masses.len(),
                    self.type_count
                )));
            }
            if masses.iter().any(|m| !(m.is_finite() && *m > 0.0)) {
                return Err(DomainError::Configuration(
                    "masses must be finite and positive".to_string(),
                ));
            }
        }

        if !(self.units.timestep.is_finite() && self.units.timestep > 0.0) {
            return Err(DomainError::Configuration(
                "timestep must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
