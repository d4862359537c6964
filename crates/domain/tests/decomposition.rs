//! Domain Manager scenarios on one process and on a four-rank thread group.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use domain::{DomainError, DomainManager, UnitConfig};
use storage::{
    create_backend, local_group, Communicator, DistributionPlan, HaloPlan, Layout, Particle,
    Permutation, SingleProcess,
};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn single(layout: Layout) -> DomainManager {
    DomainManager::new(
        create_backend(layout),
        Arc::new(SingleProcess),
        UnitConfig::lj(),
    )
}

/// Run `body` once per rank of a `size`-rank thread group.
fn on_ranks<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(Arc<dyn Communicator>) -> T + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = local_group(size)
            .into_iter()
            .map(|comm| {
                let body = &body;
                s.spawn(move || body(Arc::new(comm)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn single_process_reference_box() {
    let mut m = single(Layout::Aosoa);
    m.create_domain([0.0; 3], [20.0; 3], Some(2.5)).unwrap();

    let g = *m.geometry().unwrap();
    assert!(approx(g.cell_size(), 0.01));
    assert_eq!(g.halo_cells(), 250);
    assert_eq!(m.halo_width().unwrap(), 2.5);
    assert_eq!(m.ranks_per_dim().unwrap(), [1, 1, 1]);
    assert_eq!(m.rank_dim_pos().unwrap(), [0, 0, 0]);
    for d in 0..3 {
        assert!(approx(g.global_extent()[d], 20.0));
        assert!(approx(g.owned_lo()[d], 0.0));
        assert!(approx(g.owned_hi()[d], 20.0));
        assert!(approx(g.ghost_lo()[d], -2.5));
        assert!(approx(g.ghost_hi()[d], 22.5));
        assert!(approx(g.owned_extent()[d], 20.0));
    }
    let c = m.counts();
    assert!(c.owned + c.ghost <= c.capacity);
}

#[test]
fn non_cubic_box_leaves_manager_uninitialized() {
    let mut m = single(Layout::Soa);
    let err = m
        .create_domain([0.0; 3], [10.0, 10.0, 5.0], Some(1.0))
        .unwrap_err();
    assert!(matches!(err, DomainError::Configuration(_)));
    assert!(!m.is_initialized());
    assert!(matches!(m.geometry(), Err(DomainError::Uninitialized(_))));
    assert!(matches!(
        m.update_domain([0.0; 3], [1.0; 3]),
        Err(DomainError::Uninitialized(_))
    ));

    // A valid box still works afterwards.
    m.create_domain([0.0; 3], [10.0; 3], Some(1.0)).unwrap();
    assert!(m.is_initialized());
}

#[test]
fn halo_never_shrinks_as_cutoff_grows() {
    let mut previous = 0;
    for step in 0..40 {
        let cutoff = 0.037 * step as f64;
        let mut m = single(Layout::Soa).with_grid_num_cells(200);
        m.create_domain([0.0; 3], [20.0; 3], Some(cutoff)).unwrap();
        let g = *m.geometry().unwrap();
        assert_eq!(g.halo_cells(), (cutoff / 0.1 - 1e-9).ceil().max(0.0) as usize);
        assert!(g.halo_cells() >= previous, "cutoff {cutoff}");
        assert!(g.ghost_hi()[0] - g.owned_hi()[0] >= cutoff - 1e-9);
        previous = g.halo_cells();
    }
}

#[test]
fn update_domain_round_trip_is_idempotent() {
    let mut m = single(Layout::Aos).with_grid_num_cells(100);
    m.create_domain([0.0; 3], [10.0; 3], Some(0.5)).unwrap();

    let low = [2.0, 1.0, 0.0];
    let high = [7.5, 9.0, 10.0];
    m.update_domain(low, high).unwrap();
    let first = *m.geometry().unwrap();
    for d in 0..3 {
        assert!(approx(first.owned_lo()[d], low[d]));
        assert!(approx(first.owned_hi()[d], high[d]));
        assert!(approx(first.ghost_lo()[d], low[d] - 0.5));
        assert!(approx(first.ghost_hi()[d], high[d] + 0.5));
        assert!(approx(first.owned_extent()[d], high[d] - low[d]));
    }

    m.update_domain(low, high).unwrap();
    assert_eq!(*m.geometry().unwrap(), first);
    assert_eq!(m.ranks_per_dim().unwrap(), [1, 1, 1]);
}

#[test]
fn rejected_update_keeps_previous_geometry() {
    let mut m = single(Layout::Soa).with_grid_num_cells(100);
    m.create_domain([0.0; 3], [10.0; 3], Some(0.5)).unwrap();
    let before = *m.geometry().unwrap();
    assert!(m.update_domain([5.0, 0.0, 0.0], [5.0, 10.0, 10.0]).is_err());
    assert!(m.update_domain([0.0; 3], [11.0; 3]).is_err());
    assert_eq!(*m.geometry().unwrap(), before);
}

#[test]
fn identity_permute_keeps_fields_and_counts() {
    for layout in [Layout::Soa, Layout::Aos, Layout::Aosoa] {
        let mut m = single(layout);
        let particles: Vec<Particle> = (0..11)
            .map(|i| {
                Particle::new(i, (i % 2) as u32, [i as f64, 0.5, 1.5]).with_velocity([1.0, 0.0, -1.0])
            })
            .collect();
        m.populate(&particles).unwrap();
        let counts = m.counts();
        let before = m.slice_all().unwrap().x.to_vec();

        m.permute(&Permutation::identity(11)).unwrap();
        assert_eq!(m.counts(), counts);
        let all = m.slice_all().unwrap();
        assert_eq!(all.x.to_vec(), before);
        assert_eq!(all.id.to_vec(), (0..11).collect::<Vec<u64>>());
    }
}

#[test]
fn resize_growth_preserves_prefix_through_manager() {
    let mut m = single(Layout::Aosoa);
    let particles: Vec<Particle> = (0..5).map(|i| Particle::new(i, 0, [i as f64; 3])).collect();
    m.populate(&particles).unwrap();
    m.resize(5).unwrap();
    m.resize(19).unwrap();
    assert_eq!(m.n_max(), 19);
    for (i, p) in particles.iter().enumerate() {
        assert_eq!(m.particle(i), Some(*p));
    }
    assert_eq!(m.slice_integrate().unwrap().v.len(), 19);
}

#[test]
fn four_ranks_split_xy_into_quarters() {
    let results = on_ranks(4, |comm| {
        let mut m = DomainManager::new(create_backend(Layout::Soa), comm, UnitConfig::lj());
        m.create_domain([0.0; 3], [20.0; 3], Some(2.5)).unwrap();
        (
            m.ranks_per_dim().unwrap(),
            m.rank_dim_pos().unwrap(),
            *m.geometry().unwrap(),
        )
    });

    let mut positions = HashSet::new();
    for (shape, pos, g) in &results {
        assert_eq!(*shape, [2, 2, 1]);
        assert!(pos[0] < 2 && pos[1] < 2 && pos[2] == 0);
        assert!(positions.insert(*pos), "shared position {pos:?}");

        let extent = g.owned_extent();
        assert!(approx(extent[0] * extent[1], 20.0 * 20.0 / 4.0));
        assert!(approx(extent[2], 20.0));
        for d in 0..3 {
            assert!(g.owned_lo()[d] >= -1e-9 && g.owned_hi()[d] <= 20.0 + 1e-9);
            assert!(approx(g.ghost_lo()[d], g.owned_lo()[d] - 2.5));
        }
        assert!(approx(g.owned_lo()[0], 10.0 * pos[0] as f64));
        assert!(approx(g.owned_lo()[1], 10.0 * pos[1] as f64));
    }
    assert_eq!(positions.len(), 4);
}

#[test]
fn four_ranks_migrate_and_gather() {
    let results = on_ranks(4, |comm| {
        let rank = comm.rank() as u64;
        let mut m = DomainManager::new(create_backend(Layout::Aosoa), comm, UnitConfig::lj())
            .with_grid_num_cells(20);
        m.create_domain([0.0; 3], [20.0; 3], Some(2.0)).unwrap();

        let particles: Vec<Particle> = (0..8)
            .map(|i| Particle::new(rank * 8 + i, 0, [rank as f64, i as f64, 1.0]))
            .collect();
        m.populate(&particles).unwrap();
        assert_eq!(m.n(), 32);

        // Entry i goes to rank i % 4.
        let plan = DistributionPlan::new((0..8).map(|i| i % 4).collect());
        m.migrate(&plan).unwrap();
        assert_eq!(m.n(), 32);
        assert_eq!(m.n_local(), 8);
        assert_eq!(m.n_ghost(), 0);

        // First owned entry goes to the next rank, shifted one box length.
        let mut halo = HaloPlan::default();
        halo.push(0, (m.comm().rank() + 1) % 4, [20.0, 0.0, 0.0]);
        m.gather(&halo).unwrap();
        let first = m.slice_all().unwrap().x.to_vec();
        m.gather(&halo).unwrap();
        assert_eq!(m.slice_all().unwrap().x.to_vec(), first);

        let c = m.counts();
        assert_eq!(c.ghost, 1);
        assert!(c.owned + c.ghost <= c.capacity);
        assert!(c.owned <= c.global);

        let ids = m.slice_all().unwrap().id.to_vec();
        let ghost_x = m.particle(8).unwrap().x;
        (ids[..8].to_vec(), ghost_x)
    });

    let mut seen: Vec<u64> = results.iter().flat_map(|(ids, _)| ids.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..32).collect::<Vec<u64>>());
    for (_, ghost_x) in &results {
        assert!(ghost_x[0] >= 20.0);
    }
}

#[test]
fn migrate_that_loses_particles_is_rejected() {
    let results = on_ranks(2, |comm| {
        let rank = comm.rank() as u64;
        let mut m = DomainManager::new(create_backend(Layout::Soa), comm, UnitConfig::lj());
        m.populate(&[Particle::new(rank, 0, [0.0; 3])]).unwrap();
        // Rank 1 hands in a plan that does not cover its owned entry.
        let plan = if rank == 0 {
            DistributionPlan::stay(0, 1)
        } else {
            DistributionPlan::new(Vec::new())
        };
        m.migrate(&plan)
    });
    assert!(matches!(results[0], Err(DomainError::CommunicationFailure(_))));
    assert!(matches!(results[1], Err(DomainError::ContractViolation(_))));
}

#[test]
fn gather_with_rejected_plan_fails_on_every_rank() {
    let results = on_ranks(2, |comm| {
        let rank = comm.rank();
        let mut m = DomainManager::new(create_backend(Layout::Aos), comm, UnitConfig::lj());
        m.populate(&[Particle::new(rank as u64, 0, [0.5; 3])]).unwrap();

        // Rank 1 exports an entry it does not own.
        let mut plan = HaloPlan::default();
        let index = if rank == 0 { 0 } else { 5 };
        plan.push(index, 1 - rank, [0.0; 3]);
        let outcome = m.gather(&plan);
        (outcome, m.counts())
    });

    assert!(matches!(results[0].0, Err(DomainError::CommunicationFailure(_))));
    assert!(matches!(results[1].0, Err(DomainError::ContractViolation(_))));
    for (_, counts) in &results {
        assert_eq!(counts.ghost, 0);
        assert_eq!(counts.owned, 1);
        assert!(counts.owned + counts.ghost <= counts.capacity);
    }
}

#[test]
fn oversized_cutoff_is_a_configuration_error() {
    let mut m = single(Layout::Soa).with_grid_num_cells(10);
    let err = m
        .create_domain([0.0; 3], [10.0; 3], Some(1e30))
        .unwrap_err();
    assert!(matches!(err, DomainError::Configuration(_)));
    assert!(!m.is_initialized());
}

#[test]
fn update_domain_off_origin_box() {
    let mut m = single(Layout::Soa).with_grid_num_cells(100);
    m.create_domain([-5.0; 3], [5.0; 3], Some(0.3)).unwrap();
    let g = *m.geometry().unwrap();
    assert!(approx(g.owned_lo()[0], -5.0));
    assert!(approx(g.ghost_lo()[0], -5.3));

    m.update_domain([-3.0, -5.0, 0.0], [2.0, 5.0, 4.96]).unwrap();
    let global = m.grid().unwrap().global();
    assert_eq!(
        [0, 1, 2].map(|d| global.global_offset(d)),
        [20, 0, 50]
    );
    assert_eq!(
        [0, 1, 2].map(|d| global.owned_num_cell(d)),
        [50, 100, 50]
    );

    let g = *m.geometry().unwrap();
    let expected_lo = [-3.0, -5.0, 0.0];
    let expected_hi = [2.0, 5.0, 5.0];
    for d in 0..3 {
        assert!(approx(g.owned_lo()[d], expected_lo[d]), "axis {d}");
        assert!(approx(g.owned_hi()[d], expected_hi[d]), "axis {d}");
        assert!(approx(g.ghost_lo()[d], expected_lo[d] - 0.3), "axis {d}");
        assert!(approx(g.ghost_hi()[d], expected_hi[d] + 0.3), "axis {d}");
    }

    // A boundary below the global low corner is rejected.
    assert!(m.update_domain([-6.0, -5.0, -5.0], [0.0; 3]).is_err());
}
