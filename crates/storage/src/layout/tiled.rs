//! Tiled (array-of-structs-of-arrays) layout.
//!
//! Particles are grouped into fixed-width tiles of [`VECTOR_LENGTH`] lanes.
//! Inside a tile each field is a contiguous lane array, so a kernel walking a
//! tile touches unit-stride memory per field while whole tiles still move as
//! one unit.

use std::mem::offset_of;

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::field::FieldSlice;
use crate::particle::Particle;
use crate::plan::Permutation;

/// Lanes per tile.
pub const VECTOR_LENGTH: usize = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Tile {
    x: [[f64; 3]; VECTOR_LENGTH],
    v: [[f64; 3]; VECTOR_LENGTH],
    f: [[f64; 3]; VECTOR_LENGTH],
    q: [f64; VECTOR_LENGTH],
    id: [u64; VECTOR_LENGTH],
    kind: [u32; VECTOR_LENGTH],
}

impl Tile {
    fn get(&self, lane: usize) -> Particle {
        Particle {
            x: self.x[lane],
            v: self.v[lane],
            f: self.f[lane],
            q: self.q[lane],
            id: self.id[lane],
            kind: self.kind[lane],
            _pad: 0,
        }
    }

    fn set(&mut self, lane: usize, p: &Particle) {
        self.x[lane] = p.x;
        self.v[lane] = p.v;
        self.f[lane] = p.f;
        self.q[lane] = p.q;
        self.id[lane] = p.id;
        self.kind[lane] = p.kind;
    }
}

/// Tiled particle storage.
#[derive(Debug, Clone, Default)]
pub struct TiledStorage {
    tiles: Vec<Tile>,
    len: usize,
}

impl TiledStorage {
    /// Create an empty store with no particles allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tiles currently allocated.
    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    fn view<T: Pod>(&self, offset: usize) -> FieldSlice<'_, T> {
        FieldSlice::tiled(&self.tiles, offset, VECTOR_LENGTH, self.len)
    }
}

impl StorageBackend for TiledStorage {
    fn name(&self) -> &'static str {
        "SystemAoSoA"
    }

    fn init(&mut self) {
        *self = Self::new();
    }

    fn len(&self) -> usize {
        self.len
    }

    fn resize(&mut self, new_len: usize) {
        let old_len = self.len;
        self.tiles.resize(new_len.div_ceil(VECTOR_LENGTH), Tile::zeroed());
        // A shrink keeps the last partial tile intact; its stale lanes must
        // read as zero once they become visible again.
        let zero = Particle::default();
        let stale_end = new_len.min(old_len.next_multiple_of(VECTOR_LENGTH));
        for i in old_len..stale_end {
            self.tiles[i / VECTOR_LENGTH].set(i % VECTOR_LENGTH, &zero);
        }
        self.len = new_len;
    }

    fn permute(&mut self, permutation: &Permutation) -> StorageResult<()> {
        let n = permutation.len();
        if n > self.len {
            return Err(StorageError::contract(
                "permute",
                format!("permutation of {n} entries exceeds {} allocated", self.len),
            ));
        }
        if permutation.is_identity() {
            return Ok(());
        }
        let tiles = &self.tiles;
        let gathered: Vec<Particle> = permutation
            .sources()
            .par_iter()
            .map(|&s| tiles[s / VECTOR_LENGTH].get(s % VECTOR_LENGTH))
            .collect();
        for (i, p) in gathered.iter().enumerate() {
            self.tiles[i / VECTOR_LENGTH].set(i % VECTOR_LENGTH, p);
        }
        Ok(())
    }

    fn particle(&self, index: usize) -> Option<Particle> {
        (index < self.len).then(|| self.tiles[index / VECTOR_LENGTH].get(index % VECTOR_LENGTH))
    }

    fn set_particle(&mut self, index: usize, particle: Particle) -> StorageResult<()> {
        if index >= self.len {
            return Err(StorageError::contract(
                "set_particle",
                format!("index {index} outside {} allocated", self.len),
            ));
        }
        self.tiles[index / VECTOR_LENGTH].set(index % VECTOR_LENGTH, &particle);
        Ok(())
    }

    fn slice_x(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Tile, x))
    }

    fn slice_v(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Tile, v))
    }

    fn slice_f(&self) -> FieldSlice<'_, [f64; 3]> {
        self.view(offset_of!(Tile, f))
    }

    fn slice_type(&self) -> FieldSlice<'_, u32> {
        self.view(offset_of!(Tile, kind))
    }

    fn slice_id(&self) -> FieldSlice<'_, u64> {
        self.view(offset_of!(Tile, id))
    }

    fn slice_q(&self) -> FieldSlice<'_, f64> {
        self.view(offset_of!(Tile, q))
    }
}
