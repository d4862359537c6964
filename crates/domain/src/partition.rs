//! Deterministic block partitioner for the 3-D process grid.

/// Chooses a 3-D process-grid shape for a given process count.
///
/// Shapes are as close to cubic as the prime factorization allows and are
/// returned in non-increasing order, so the same process count always yields
/// the same shape (restarts reproduce the partition).
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockPartitioner;

impl BlockPartitioner {
    /// Ranks along each dimension for `num_ranks` processes.
    ///
    /// The product of the result always equals `num_ranks`.
    pub fn ranks_per_dimension(&self, num_ranks: usize) -> [usize; 3] {
        let mut dims = [1usize; 3];
        // Largest factors first, each onto the currently smallest dimension.
        for p in prime_factors(num_ranks.max(1)).into_iter().rev() {
            let smallest = (0..3).min_by_key(|&d| (dims[d], d)).unwrap_or(0);
            dims[smallest] *= p;
        }
        dims.sort_unstable_by(|a, b| b.cmp(a));
        dims
    }
}

/// Prime factors in ascending order, with multiplicity.
fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Row-major (last dimension fastest) rank of block coordinate `pos`.
pub fn block_rank(pos: [usize; 3], dims: [usize; 3]) -> usize {
    (pos[0] * dims[1] + pos[1]) * dims[2] + pos[2]
}

/// Block coordinate of `rank`, inverse of [`block_rank`].
pub fn block_position(rank: usize, dims: [usize; 3]) -> [usize; 3] {
    [
        rank / (dims[1] * dims[2]),
        (rank / dims[2]) % dims[1],
        rank % dims[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_shapes() {
        let p = BlockPartitioner;
        assert_eq!(p.ranks_per_dimension(1), [1, 1, 1]);
        assert_eq!(p.ranks_per_dimension(2), [2, 1, 1]);
        assert_eq!(p.ranks_per_dimension(4), [2, 2, 1]);
        assert_eq!(p.ranks_per_dimension(6), [3, 2, 1]);
        assert_eq!(p.ranks_per_dimension(8), [2, 2, 2]);
        assert_eq!(p.ranks_per_dimension(12), [3, 2, 2]);
        assert_eq!(p.ranks_per_dimension(7), [7, 1, 1]);
    }

    #[test]
    fn test_product_matches_rank_count() {
        let p = BlockPartitioner;
        for n in 1..=64 {
            let dims = p.ranks_per_dimension(n);
            assert_eq!(dims.iter().product::<usize>(), n, "n = {n}");
            assert!(dims[0] >= dims[1] && dims[1] >= dims[2]);
        }
    }

    #[test]
    fn test_block_position_round_trip() {
        let dims = [3, 2, 2];
        for r in 0..12 {
            assert_eq!(block_rank(block_position(r, dims), dims), r);
        }
        assert_eq!(block_position(1, [2, 2, 1]), [0, 1, 0]);
        assert_eq!(block_position(2, [2, 2, 1]), [1, 0, 0]);
    }
}
