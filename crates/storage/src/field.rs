//! Read-only views over a single particle field.
//!
//! A [`FieldSlice`] addresses element `i` of a field inside an arbitrary
//! storage layout with three strides:
//!
//! ```text
//! byte(i) = base + (i / tile_len) * tile_stride + (i % tile_len) * lane_stride
//! ```
//!
//! - struct-of-arrays: `tile_len = 1`, `tile_stride = size_of::<T>()`
//! - array-of-structs: `tile_len = 1`, `tile_stride = size_of::<Particle>()`
//! - tiled: `tile_len = V`, `tile_stride = size_of::<Tile>()`,
//!   `lane_stride = size_of::<T>()`
//!
//! Views borrow the backend, so they cannot outlive a `resize` or `permute`.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

/// Strided read-only view of one field for the allocated population.
#[derive(Clone, Copy)]
pub struct FieldSlice<'a, T: Pod> {
    bytes: &'a [u8],
    base: usize,
    tile_len: usize,
    tile_stride: usize,
    lane_stride: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> FieldSlice<'a, T> {
    /// View over a contiguous array of `T`.
    pub fn contiguous(values: &'a [T]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(values),
            base: 0,
            tile_len: 1,
            tile_stride: size_of::<T>(),
            lane_stride: 0,
            len: values.len(),
            _marker: PhantomData,
        }
    }

    /// View over field `T` embedded at byte `offset` in each of `records`.
    pub fn strided<R: Pod>(records: &'a [R], offset: usize, len: usize) -> Self {
        debug_assert!(offset + size_of::<T>() <= size_of::<R>());
        debug_assert!(len <= records.len());
        Self {
            bytes: bytemuck::cast_slice(records),
            base: offset,
            tile_len: 1,
            tile_stride: size_of::<R>(),
            lane_stride: 0,
            len,
            _marker: PhantomData,
        }
    }

    /// View over field `T` stored as a `[T; lanes]` array at byte `offset`
    /// of each tile in `tiles`. Only the first `len` elements are visible.
    pub fn tiled<R: Pod>(tiles: &'a [R], offset: usize, lanes: usize, len: usize) -> Self {
        debug_assert!(offset + lanes * size_of::<T>() <= size_of::<R>());
        debug_assert!(len <= tiles.len() * lanes);
        Self {
            bytes: bytemuck::cast_slice(tiles),
            base: offset,
            tile_len: lanes,
            tile_stride: size_of::<R>(),
            lane_stride: size_of::<T>(),
            len,
            _marker: PhantomData,
        }
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the view has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element `i`, or `None` when out of range.
    pub fn get(&self, i: usize) -> Option<T> {
        if i >= self.len {
            return None;
        }
        let start = self.base
            + (i / self.tile_len) * self.tile_stride
            + (i % self.tile_len) * self.lane_stride;
        let raw = &self.bytes[start..start + size_of::<T>()];
        Some(bytemuck::pod_read_unaligned(raw))
    }

    /// Iterate over all visible elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    /// Copy the visible elements into a `Vec`.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for FieldSlice<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
