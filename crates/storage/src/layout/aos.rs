//! Array-of-structs layout: one contiguous array of whole records.

use std::mem::offset_of;

use rayon::prelude::*;

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::field::FieldSlice;
use crate::particle::Particle;
use crate::plan::Permutation;

/// Array-of-structs particle storage.
#[derive(Debug, Clone, Default)]
pub struct AosStorage {
    records: Vec<Particle>,
}

impl AosStorage {
    /// Create an empty store with no particles allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocated records in index order.
    pub fn records(&self) -> &[Particle] {
        &self.records
    }

    fn view<T: bytemuck::Pod>(&self, offset: usize) -> FieldSlice<'_, T> {
        FieldSlice::strided(&self.records, offset, self.records.len())
    }
}

impl StorageBackend for AosStorage {
    fn name(&self) -> &'static str {
        "SystemAoS"
    }

    fn init(&mut self) {
        self.records = Vec::new();
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn resize(&mut self, new_len: usize) {
        self.records.resize(new_len, Particle::default());
    }

    fn permute(&mut self, permutation: &Permutation) -> StorageResult<()> {
        let n = permutation.len();
        if n > self.records.len() {
            return Err(StorageError::contract(
                "permute",
                format!("permutation of {n} entries exceeds {} allocated", self.records.len()),
            ));
        }
        // Whole records move together, so fields cannot fall out of step.
        let reordered: Vec<Particle> = permutation
            .sources()
            .par_iter()
            .map(|&s| self.records[s])
            .collect();
        self.records[..n].copy_from_slice(&reordered);
        Ok(())
    }

    fn particle(&self, index: usize) -> Option<Particle> {
        self.records.get(index).copied()
    }

    fn set_particle(&mut self, index: usize, particle: Particle) -> StorageResult<()> {
        let len = self.records.len();
        let slot = self.records.get_mut(index).ok_or_else(|| {
            StorageError::contract("set_particle", format!("index {index} outside {len} allocated"))
        })?;
        *slot = particle;
        Ok(())
    }

    fn slice_x(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Particle, x))
    }

    fn slice_v(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Particle, v))
    }

    fn slice_f(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Particle, f))
    }

    fn slice_type(&self) -> FieldSlice<'_, u32> {
        self.view(offset_of!(Particle, kind))
    }

    fn slice_id(&self) -> FieldSlice<'_, u64> {
        self.view(offset_of!(Particle, id))
    }

    fn slice_q(&self) -> FieldSlice<'_, f64> {
        self.view(offset_of!(Particle, q))
    }
}
