//! Struct-of-arrays layout: one contiguous array per field.

use rayon::prelude::*;

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::field::FieldSlice;
use crate::particle::Particle;
use crate::plan::Permutation;

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle.
#[derive(Debug, Clone, Default)]
pub struct SoaStorage {
    /// Positions
    pub x: Vec<[f64; 3]>,
    /// Velocities
    pub v: Vec<[f64; 3]>,
    /// Forces
    pub f: Vec<[f64; 3]>,
    /// Type indices
    pub kind: Vec<u32>,
    /// Global identifiers
    pub id: Vec<u64>,
    /// Charges
    pub q: Vec<f64>,
}

impl SoaStorage {
    /// Create an empty store with no particles allocated.
    pub fn new() -> Self {
        Self::default()
    }
}

fn permuted<T: Copy + Send + Sync>(values: &mut Vec<T>, sources: &[usize]) {
    let current: &[T] = values;
    let mut reordered: Vec<T> = sources.par_iter().map(|&s| current[s]).collect();
    reordered.extend_from_slice(&current[sources.len()..]);
    *values = reordered;
}

impl StorageBackend for SoaStorage {
    fn name(&self) -> &'static str {
        "SystemSoA"
    }

    fn init(&mut self) {
        *self = Self::new();
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    fn resize(&mut self, new_len: usize) {
        self.x.resize(new_len, [0.0; 3]);
        self.v.resize(new_len, [0.0; 3]);
        self.f.resize(new_len, [0.0; 3]);
        self.kind.resize(new_len, 0);
        self.id.resize(new_len, 0);
        self.q.resize(new_len, 0.0);
    }

    fn permute(&mut self, permutation: &Permutation) -> StorageResult<()> {
        if permutation.len() > self.len() {
            return Err(StorageError::contract(
                "permute",
                format!(
                    "permutation of {} entries exceeds {} allocated",
                    permutation.len(),
                    self.len()
                ),
            ));
        }
        if permutation.is_identity() {
            return Ok(());
        }
        let sources = permutation.sources();
        permuted(&mut self.x, sources);
        permuted(&mut self.v, sources);
        permuted(&mut self.f, sources);
        permuted(&mut self.kind, sources);
        permuted(&mut self.id, sources);
        permuted(&mut self.q, sources);
        Ok(())
    }

    fn particle(&self, index: usize) -> Option<Particle> {
        (index < self.len()).then(|| Particle {
            x: self.x[index],
            v: self.v[index],
            f: self.f[index],
            q: self.q[index],
            id: self.id[index],
            kind: self.kind[index],
            _pad: 0,
        })
    }

    fn set_particle(&mut self, index: usize, particle: Particle) -> StorageResult<()> {
        if index >= self.len() {
            return Err(StorageError::contract(
                "set_particle",
                format!("index {index} outside {} allocated", self.len()),
            ));
        }
        self.x[index] = particle.x;
        self.v[index] = particle.v;
        self.f[index] = particle.f;
        self.kind[index] = particle.kind;
        self.id[index] = particle.id;
        self.q[index] = particle.q;
        Ok(())
    }

    fn slice_x(&self) -> FieldSlice<'_, [f64; 3]> {
        FieldSlice::contiguous(&self.x)
    }

    fn slice_v(&self) -> FieldSlice<'_, [f64; 3]> {
        FieldSlice::contiguous(&self.v)
    }

    fn slice_f(&self) -> FieldSlice<'_, [f64; 3]> {
        FieldSlice::contiguous(&self.f)
    }

    fn slice_type(&self) -> FieldSlice<'_, u32> {
        FieldSlice::contiguous(&self.kind)
    }

    fn slice_id(&self) -> FieldSlice<'_, u64> {
        FieldSlice::contiguous(&self.id)
    }

    fn slice_q(&self) -> FieldSlice<'_, f64> {
        FieldSlice::contiguous(&self.q)
    }
}
