//! Storage backend contract checks run against every layout.
//!
//! - identity permute leaves every field unchanged
//! - resize(n) then resize(m >= n) preserves the first n entries
//! - permute moves every field of a particle together
//! - migrate across a thread group conserves particles and ordering

use std::thread;

use storage::{
    create_backend, local_group, Communicator, DistributionPlan, HaloPlan, Layout, Particle,
    Permutation, StorageBackend,
};

const LAYOUTS: [Layout; 3] = [Layout::Soa, Layout::Aos, Layout::Aosoa];

/// Fill `n` entries with distinguishable values derived from the index.
fn filled(layout: Layout, n: usize) -> Box<dyn StorageBackend> {
    let mut b = create_backend(layout);
    b.resize(n);
    for i in 0..n {
        let f = i as f64;
        let p = Particle::new(1000 + i as u64, (i % 3) as u32, [f, 2.0 * f, 3.0 * f])
            .with_velocity([-f, 0.5 * f, 1.0])
            .with_charge(0.1 * f);
        b.set_particle(i, Particle { f: [f, f, f], ..p }).unwrap();
    }
    b
}

fn snapshot(b: &dyn StorageBackend) -> Vec<Particle> {
    (0..b.len()).map(|i| b.particle(i).unwrap()).collect()
}

#[test]
fn identity_permute_is_a_no_op() {
    for layout in LAYOUTS {
        let mut b = filled(layout, 21);
        let before = snapshot(b.as_ref());
        b.permute(&Permutation::identity(21)).unwrap();
        assert_eq!(snapshot(b.as_ref()), before, "{layout:?}");
        assert_eq!(b.len(), 21);
    }
}

#[test]
fn growing_resize_preserves_prefix() {
    for layout in LAYOUTS {
        let mut b = filled(layout, 13);
        let before = snapshot(b.as_ref());
        b.resize(13);
        b.resize(40);
        assert_eq!(b.len(), 40);
        assert_eq!(&snapshot(b.as_ref())[..13], &before[..], "{layout:?}");
        assert_eq!(b.slice_x().len(), 40);
        assert_eq!(b.particle(39), Some(Particle::default()));
    }
}

#[test]
fn shrinking_resize_preserves_prefix() {
    for layout in LAYOUTS {
        let mut b = filled(layout, 17);
        let before = snapshot(b.as_ref());
        b.resize(5);
        assert_eq!(snapshot(b.as_ref()), before[..5].to_vec(), "{layout:?}");
    }
}

#[test]
fn permute_keeps_fields_in_step() {
    for layout in LAYOUTS {
        let n = 19;
        let mut b = filled(layout, n);
        let before = snapshot(b.as_ref());

        // Reverse order
        let perm = Permutation::new((0..n).rev().collect()).unwrap();
        b.permute(&perm).unwrap();

        for i in 0..n {
            assert_eq!(b.particle(i), Some(before[n - 1 - i]), "{layout:?} slot {i}");
        }
        let ids = b.slice_id().to_vec();
        let xs = b.slice_x().to_vec();
        for (id, x) in ids.iter().zip(&xs) {
            let original = (id - 1000) as f64;
            assert_eq!(x[0], original, "{layout:?}: position detached from id");
        }
    }
}

#[test]
fn permute_longer_than_storage_is_rejected() {
    for layout in LAYOUTS {
        let mut b = filled(layout, 3);
        assert!(b.permute(&Permutation::identity(4)).is_err());
    }
}

#[test]
fn views_track_current_length() {
    for layout in LAYOUTS {
        let mut b = filled(layout, 4);
        assert_eq!(b.slice_q().len(), 4);
        b.resize(11);
        assert_eq!(b.slice_q().len(), 11);
        assert_eq!(b.slice_type().len(), 11);
        assert_eq!(b.slice_id().len(), 11);
    }
}

#[test]
fn migrate_across_four_ranks_conserves_particles() {
    let handles: Vec<_> = local_group(4)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let rank = comm.rank();
                let mut b = create_backend(LAYOUTS[rank % 3]);
                b.resize(8);
                for i in 0..8 {
                    let id = (rank * 8 + i) as u64;
                    b.set_particle(i, Particle::new(id, 0, [id as f64; 3])).unwrap();
                }
                // Entry i goes to rank i % 4.
                let plan = DistributionPlan::new((0..8).map(|i| i % 4).collect());
                let owned = b.migrate(&comm, 8, &plan).unwrap();
                (rank, owned, b.slice_id().to_vec())
            })
        })
        .collect();

    let mut all_ids = Vec::new();
    for h in handles {
        let (rank, owned, ids) = h.join().unwrap();
        assert_eq!(owned, 8);
        assert_eq!(ids.len(), 8);
        // Kept entries first, then arrivals in sender-rank order.
        let expected: Vec<u64> = std::iter::once(rank)
            .chain((0..4).filter(|&r| r != rank))
            .flat_map(|src| {
                [(src * 8 + rank) as u64, (src * 8 + rank + 4) as u64]
            })
            .collect();
        assert_eq!(ids, expected, "rank {rank}");
        all_ids.extend(ids);
    }
    all_ids.sort_unstable();
    assert_eq!(all_ids, (0..32).collect::<Vec<u64>>());
}

#[test]
fn gather_fills_ghosts_from_neighbors() {
    let handles: Vec<_> = local_group(2)
        .into_iter()
        .map(|comm| {
            thread::spawn(move || {
                let rank = comm.rank();
                let other = 1 - rank;
                let mut b = create_backend(Layout::Aosoa);
                b.resize(3);
                for i in 0..3 {
                    let id = (rank * 10 + i) as u64;
                    b.set_particle(i, Particle::new(id, 0, [rank as f64, 0.0, 0.0]))
                        .unwrap();
                }
                let mut plan = HaloPlan::default();
                plan.push(2, other, [0.0; 3]);
                plan.push(0, other, [0.0, 0.0, 5.0]);

                let ghosts = b.gather(&comm, 3, &plan).unwrap();
                let first = snapshot(b.as_ref());
                b.gather(&comm, 3, &plan).unwrap();
                let second = snapshot(b.as_ref());
                (rank, ghosts, first, second)
            })
        })
        .collect();

    for h in handles {
        let (rank, ghosts, first, second) = h.join().unwrap();
        let other = 1 - rank;
        assert_eq!(ghosts, 2);
        assert_eq!(first.len(), 5);
        assert_eq!(first, second, "gather must be idempotent");
        assert_eq!(first[3].id, (other * 10 + 2) as u64);
        assert_eq!(first[4].id, (other * 10) as u64);
        assert_eq!(first[4].x, [other as f64, 0.0, 5.0]);
        // Owned entries untouched
        assert_eq!(first[0].id, (rank * 10) as u64);
    }
}
