//! Edge case tests for dci.
//!
//! Boundary budgets, blind mode, capacity shortfall and configuration
//! errors.

use std::collections::HashSet;

use dci::{ConstructionConfig, DciError, DciIndex, QueryConfig, dataset};

// =============================================================================
// Capacity and k edge cases
// =============================================================================

#[test]
fn k_larger_than_n_returns_every_point() {
    let data = dataset::generate_uniform(3, 6, 0);
    let mut index = DciIndex::new(3, 2, 2).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let out = index.query(&data[0..3], 50, &QueryConfig::default()).expect("query");
    assert_eq!(out.num_returned(0), 6);
    assert_eq!(out.neighbors(0)[0].id, 0);
    assert_eq!(out.neighbors(0)[0].dist, 0.0);
}

#[test]
fn single_point_index_is_searchable() {
    let data = vec![1.0, 2.0, 3.0];
    let mut index = DciIndex::new(3, 2, 3).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let out = index.query(&[0.0, 0.0, 0.0], 1, &QueryConfig::default()).expect("query");
    assert_eq!(out.neighbors(0)[0].id, 0);
}

#[test]
fn tight_retrieve_cap_reports_the_shortfall() {
    let data = dataset::generate_uniform(5, 200, 2);
    let query = dataset::generate_uniform(5, 1, 3);
    let mut index = DciIndex::with_seed(5, 2, 2, 0).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let cfg = QueryConfig {
        num_to_retrieve: Some(3),
        prop_to_retrieve: 0.0,
        ..QueryConfig::default()
    };
    let out = index.query(&query, 10, &cfg).expect("query");

    // The cap is checked between round-robin rounds, so the last round may
    // promote one extra point per composite.
    let returned = out.num_returned(0);
    assert!(
        (3..=4).contains(&returned),
        "expected 3 or 4 results, got {returned}"
    );
    assert!(returned < 10);
}

// =============================================================================
// Blind mode
// =============================================================================

#[test]
fn blind_query_returns_exactly_the_retrieve_cap() {
    let data = dataset::generate_uniform(10, 100, 0);
    let query = dataset::generate_uniform(10, 1, 9);
    let mut index = DciIndex::with_seed(10, 2, 2, 0).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let cfg = QueryConfig {
        blind: true,
        num_to_visit: Some(20),
        num_to_retrieve: Some(7),
        prop_to_visit: 0.0,
        prop_to_retrieve: 0.0,
        ..QueryConfig::default()
    };
    let out = index.query(&query, 7, &cfg).expect("query");

    let ids: Vec<usize> = out.neighbors(0).iter().map(|n| n.id).collect();
    assert_eq!(ids.len(), 7);
    let distinct: HashSet<usize> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 7);
    assert!(ids.iter().all(|&id| id < 100));
    // Projected displacements, not Euclidean distances.
    assert!(out.neighbors(0).iter().all(|n| n.dist.is_finite() && n.dist >= 0.0));
}

#[test]
fn blind_output_is_contained_in_the_non_blind_visited_set() {
    let data = dataset::generate_uniform(8, 150, 4);
    let query = dataset::generate_uniform(8, 1, 5);
    let mut index = DciIndex::with_seed(8, 2, 3, 1).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let blind_cfg = QueryConfig {
        blind: true,
        num_to_visit: Some(30),
        num_to_retrieve: Some(10),
        prop_to_visit: 0.0,
        prop_to_retrieve: 0.0,
        ..QueryConfig::default()
    };
    let blind_ids: HashSet<usize> = index
        .query(&query, 10, &blind_cfg)
        .expect("blind")
        .neighbors(0)
        .iter()
        .map(|n| n.id)
        .collect();

    // Same visit budget, retrieve axis wide open, k covering everything:
    // the non-blind query evaluates a superset of the blind promotions.
    let wide_cfg = QueryConfig {
        num_to_visit: Some(30),
        prop_to_visit: 0.0,
        prop_to_retrieve: 1.0,
        ..QueryConfig::default()
    };
    let visited: HashSet<usize> = index
        .query(&query, 150, &wide_cfg)
        .expect("wide")
        .neighbors(0)
        .iter()
        .map(|n| n.id)
        .collect();

    assert!(blind_ids.is_subset(&visited));
}

// =============================================================================
// Budget monotonicity
// =============================================================================

#[test]
fn recall_is_monotone_in_the_visit_budget() {
    let dim = 8;
    let n = 400;
    let k = 5;
    let data = dataset::generate_low_intrinsic(dim, 3, n, 6);
    let queries = dataset::generate_low_intrinsic(dim, 3, 10, 7);

    let mut index = DciIndex::with_seed(dim, 2, 3, 2).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let mut recalls = Vec::new();
    for cap in [5usize, 20, 100, n] {
        let cfg = QueryConfig {
            num_to_visit: Some(cap),
            prop_to_visit: 0.0,
            prop_to_retrieve: 1.0,
            ..QueryConfig::default()
        };
        let out = index.query(&queries, k, &cfg).expect("query");

        let mut total = 0.0;
        for (qi, query) in queries.chunks_exact(dim).enumerate() {
            let truth: Vec<usize> = dataset::ground_truth(query, &data, dim, k)
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            let got: Vec<usize> = out.neighbors(qi).iter().map(|n| n.id).collect();
            total += dataset::recall_at_k(&truth, &got, k);
        }
        recalls.push(total / 10.0);
    }

    assert!(
        recalls.windows(2).all(|w| w[0] <= w[1]),
        "recall sequence {recalls:?} is not monotone"
    );
    assert_eq!(*recalls.last().unwrap(), 1.0);
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn zero_k_is_rejected() {
    let data = dataset::generate_uniform(4, 10, 0);
    let mut index = DciIndex::new(4, 2, 2).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");
    assert!(matches!(
        index.query(&data[0..4], 0, &QueryConfig::default()),
        Err(DciError::InvalidParameter(_))
    ));
}

#[test]
fn mismatched_query_length_is_rejected() {
    let data = dataset::generate_uniform(4, 10, 0);
    let mut index = DciIndex::new(4, 2, 2).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");
    assert!(matches!(
        index.query(&[1.0, 2.0, 3.0], 1, &QueryConfig::default()),
        Err(DciError::DimensionMismatch { .. })
    ));
}

#[test]
fn fully_inactive_budget_is_rejected() {
    let data = dataset::generate_uniform(4, 10, 0);
    let mut index = DciIndex::new(4, 2, 2).expect("create");
    index
        .add(&data, 1, &ConstructionConfig::default())
        .expect("add");

    let cfg = QueryConfig {
        prop_to_visit: 0.0,
        prop_to_retrieve: 0.0,
        ..QueryConfig::default()
    };
    assert_eq!(
        index.query(&data[0..4], 1, &cfg).unwrap_err(),
        DciError::InactiveBudget
    );
}
