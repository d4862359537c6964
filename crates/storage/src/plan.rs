//! Externally produced plans consumed by `permute`, `migrate` and `gather`.
//!
//! Plans are read-only inputs: a neighbor-list builder produces the
//! [`Permutation`], a redistribution engine produces [`DistributionPlan`] and
//! [`HaloPlan`]. Backends never retain them after the call.

use crate::error::{StorageError, StorageResult};

/// Index reordering applied uniformly to every field.
///
/// Entry `i` of the reordered storage takes the value previously held at
/// `source(i)`. Only the first `len()` entries are reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    sources: Vec<usize>,
}

impl Permutation {
    /// Build from a source-index list, rejecting anything that is not a
    /// bijection on `0..sources.len()`.
    pub fn new(sources: Vec<usize>) -> StorageResult<Self> {
        let n = sources.len();
        let mut seen = vec![false; n];
        for (i, &s) in sources.iter().enumerate() {
            if s >= n {
                return Err(StorageError::contract(
                    "permute",
                    format!("entry {i} refers to index {s}, outside 0..{n}"),
                ));
            }
            if std::mem::replace(&mut seen[s], true) {
                return Err(StorageError::contract(
                    "permute",
                    format!("index {s} appears more than once"),
                ));
            }
        }
        Ok(Self { sources })
    }

    /// The identity reordering of `n` entries.
    pub fn identity(n: usize) -> Self {
        Self {
            sources: (0..n).collect(),
        }
    }

    /// Permutation that sorts `keys` ascending (stable), e.g. by cell index.
    pub fn sorting_by_key<K: Ord>(keys: &[K]) -> Self {
        let mut sources: Vec<usize> = (0..keys.len()).collect();
        sources.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        Self { sources }
    }

    /// Number of entries reordered.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// `true` when no entries are reordered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source index for destination slot `i`.
    pub fn source(&self, i: usize) -> usize {
        self.sources[i]
    }

    /// All source indices in destination order.
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    /// `true` if every entry maps to itself.
    pub fn is_identity(&self) -> bool {
        self.sources.iter().enumerate().all(|(i, &s)| i == s)
    }
}

/// Destination rank for every owned entry, consumed by `migrate`.
///
/// Entries whose destination is this process's own rank stay; all others are
/// sent. Received entries are appended after the kept ones in sender-rank
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    destinations: Vec<usize>,
}

impl DistributionPlan {
    /// Plan sending owned entry `i` to rank `destinations[i]`.
    pub fn new(destinations: Vec<usize>) -> Self {
        Self { destinations }
    }

    /// Plan that keeps all `owned` entries on `rank`.
    pub fn stay(rank: usize, owned: usize) -> Self {
        Self {
            destinations: vec![rank; owned],
        }
    }

    /// Number of owned entries the plan was built for.
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    /// `true` when the plan covers no entries.
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Destination ranks in owned-entry order.
    pub fn destinations(&self) -> &[usize] {
        &self.destinations
    }

    /// Check the plan against the owned count and the group size.
    pub fn validate(&self, owned: usize, group_size: usize) -> StorageResult<()> {
        if self.destinations.len() != owned {
            return Err(StorageError::contract(
                "migrate",
                format!(
                    "plan covers {} entries but {owned} are owned",
                    self.destinations.len()
                ),
            ));
        }
        if let Some((i, &rank)) = self
            .destinations
            .iter()
            .enumerate()
            .find(|(_, rank)| **rank >= group_size)
        {
            return Err(StorageError::contract(
                "migrate",
                format!("entry {i} sent to rank {rank}, group has {group_size}"),
            ));
        }
        Ok(())
    }
}

/// One owned entry to be copied into a neighbor's ghost region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaloExport {
    /// Owned entry index on this process
    pub index: usize,
    /// Receiving rank (may be this rank for periodic self-images)
    pub rank: usize,
    /// Position shift applied to the copy (non-zero across a periodic face)
    pub shift: [f64; 3],
}

/// Ghost-exchange plan consumed by `gather`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HaloPlan {
    exports: Vec<HaloExport>,
}

impl HaloPlan {
    /// Plan from an explicit export list.
    pub fn new(exports: Vec<HaloExport>) -> Self {
        Self { exports }
    }

    /// Append one export.
    pub fn push(&mut self, index: usize, rank: usize, shift: [f64; 3]) {
        self.exports.push(HaloExport { index, rank, shift });
    }

    /// Exports in plan order.
    pub fn exports(&self) -> &[HaloExport] {
        &self.exports
    }

    /// Number of exports.
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    /// `true` when nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Check every export refers to an owned entry and a valid rank.
    pub fn validate(&self, owned: usize, group_size: usize) -> StorageResult<()> {
        for (k, e) in self.exports.iter().enumerate() {
            if e.index >= owned {
                return Err(StorageError::contract(
                    "gather",
                    format!("export {k} refers to entry {}, only {owned} owned", e.index),
                ));
            }
            if e.rank >= group_size {
                return Err(StorageError::contract(
                    "gather",
                    format!("export {k} targets rank {}, group has {group_size}", e.rank),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_rejects_duplicates() {
        assert!(Permutation::new(vec![0, 0, 1]).is_err());
        assert!(Permutation::new(vec![0, 3, 1]).is_err());
        assert!(Permutation::new(vec![2, 0, 1]).is_ok());
    }

    #[test]
    fn test_sorting_by_key_is_stable() {
        let p = Permutation::sorting_by_key(&[3, 1, 3, 0]);
        assert_eq!(p.sources(), &[3, 1, 0, 2]);
    }

    #[test]
    fn test_identity() {
        assert!(Permutation::identity(5).is_identity());
        assert!(!Permutation::new(vec![1, 0]).unwrap().is_identity());
    }

    #[test]
    fn test_distribution_plan_validation() {
        let plan = DistributionPlan::new(vec![0, 1, 2]);
        assert!(plan.validate(3, 3).is_ok());
        assert!(plan.validate(2, 3).is_err());
        assert!(plan.validate(3, 2).is_err());
    }

    #[test]
    fn test_halo_plan_validation() {
        let mut plan = HaloPlan::default();
        plan.push(1, 0, [0.0; 3]);
        assert!(plan.validate(2, 1).is_ok());
        assert!(plan.validate(1, 1).is_err());
    }
}
