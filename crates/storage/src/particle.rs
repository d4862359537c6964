//! Per-particle record shared by every storage layout.

use bytemuck::{Pod, Zeroable};

/// One particle's complete field set.
///
/// This is both the array-of-structs element and the wire format used by
/// migrate/gather exchanges. Layout must stay free of implicit padding.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Position
    pub x: [f64; 3],
    /// Velocity
    pub v: [f64; 3],
    /// Force
    pub f: [f64; 3],
    /// Charge
    pub q: f64,
    /// Global identifier
    pub id: u64,
    /// Type index into the per-type property tables
    pub kind: u32,
    /// Explicit padding, always zero
    pub _pad: u32,
}

impl Particle {
    /// Create a particle at rest at `x` with zero force and charge.
    pub fn new(id: u64, kind: u32, x: [f64; 3]) -> Self {
        Self {
            x,
            id,
            kind,
            ..Self::default()
        }
    }

    /// Builder-style velocity setter.
    pub fn with_velocity(mut self, v: [f64; 3]) -> Self {
        self.v = v;
        self
    }

    /// Builder-style charge setter.
    pub fn with_charge(mut self, q: f64) -> Self {
        self.q = q;
        self
    }

    /// Copy of this particle translated by `shift` (periodic image).
    pub fn shifted(mut self, shift: [f64; 3]) -> Self {
        for d in 0..3 {
            self.x[d] += shift[d];
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_has_no_padding() {
        assert_eq!(std::mem::size_of::<Particle>(), 96);
    }

    #[test]
    fn test_shifted_only_moves_position() {
        let p = Particle::new(7, 1, [1.0, 2.0, 3.0]).with_velocity([0.5, 0.0, 0.0]);
        let s = p.shifted([10.0, 0.0, -10.0]);
        assert_eq!(s.x, [11.0, 2.0, -7.0]);
        assert_eq!(s.v, p.v);
        assert_eq!(s.id, 7);
        assert_eq!(s.kind, 1);
    }
}
