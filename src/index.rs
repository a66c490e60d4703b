//! The index object: lifecycle, hierarchy construction, batch querying.
//!
//! A `DciIndex` borrows the caller's point array for its whole populated
//! life; it owns everything else. Construction builds the levels coarsest
//! first, assigning each point to its nearest coarser-level parent with a
//! k=1 query of the partially built pyramid. Queries descend the pyramid,
//! narrowing a field of view level by level, and run the caller's budget
//! verbatim on the finest level.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{ConstructionConfig, ExpansionBasis, QueryConfig};
use crate::error::{DciError, Result};
use crate::hierarchy::{self, Level};
use crate::projection::ProjectionBank;
use crate::query::{Budget, Candidate, Collection, Eligibility, run_level_query};

/// One returned neighbour.
///
/// `dist` is the Euclidean distance to the query, except under blind
/// queries where it is the candidate's largest projected displacement at
/// promotion time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub dist: f64,
}

/// Results of a batch query: one flat buffer of neighbours plus per-query
/// offsets. Queries that terminated before finding k points simply own a
/// shorter slice.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    neighbors: Vec<Neighbor>,
    offsets: Vec<usize>,
}

impl QueryOutput {
    pub fn num_queries(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Neighbours of one query, ascending by distance (promotion order
    /// under blind queries).
    pub fn neighbors(&self, query: usize) -> &[Neighbor] {
        &self.neighbors[self.offsets[query]..self.offsets[query + 1]]
    }

    /// How many neighbours the query actually produced.
    pub fn num_returned(&self, query: usize) -> usize {
        self.offsets[query + 1] - self.offsets[query]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Neighbor]> + '_ {
        (0..self.num_queries()).map(|q| self.neighbors(q))
    }
}

/// Prioritized DCI index over a borrowed point array.
///
/// Points are `f64` values laid out flat, each point occupying `dim`
/// consecutive elements. The array is never copied; it must outlive the
/// index, which the lifetime parameter enforces.
pub struct DciIndex<'a> {
    dim: usize,
    num_comp: usize,
    num_simp: usize,
    rng: StdRng,
    base_bank: ProjectionBank,
    data: Option<&'a [f64]>,
    /// Coarsest level first. A single-level index has exactly one entry.
    levels: Vec<Level>,
}

impl<'a> DciIndex<'a> {
    /// Allocates an empty index and samples its projection bank with the
    /// default seed.
    pub fn new(dim: usize, num_comp_indices: usize, num_simp_indices: usize) -> Result<Self> {
        Self::with_seed(dim, num_comp_indices, num_simp_indices, 0)
    }

    /// Allocates an empty index, seeding the RNG that drives projection
    /// sampling and level assignment.
    pub fn with_seed(
        dim: usize,
        num_comp_indices: usize,
        num_simp_indices: usize,
        seed: u64,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(DciError::InvalidParameter("dim must be at least 1".into()));
        }
        if num_comp_indices == 0 {
            return Err(DciError::InvalidParameter(
                "num_comp_indices must be at least 1".into(),
            ));
        }
        if num_simp_indices == 0 || num_simp_indices > 255 {
            return Err(DciError::InvalidParameter(
                "num_simp_indices must lie in 1..=255".into(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let base_bank = ProjectionBank::sample(dim, num_comp_indices * num_simp_indices, &mut rng);
        Ok(Self {
            dim,
            num_comp: num_comp_indices,
            num_simp: num_simp_indices,
            rng,
            base_bank,
            data: None,
            levels: Vec::new(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_comp_indices(&self) -> usize {
        self.num_comp
    }

    pub fn num_simp_indices(&self) -> usize {
        self.num_simp
    }

    /// Number of points currently indexed; zero before `add`.
    pub fn num_points(&self) -> usize {
        self.levels.last().map_or(0, Level::num_points)
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Attaches `data.len() / dim` points and builds every level.
    ///
    /// The requested level count is clamped to the point count. The
    /// configured construction budget drives the parent-assignment queries
    /// of multi-level builds; it is unused for `num_levels == 1`.
    pub fn add(
        &mut self,
        data: &'a [f64],
        num_levels: usize,
        cfg: &ConstructionConfig,
    ) -> Result<()> {
        if self.data.is_some() {
            return Err(DciError::AlreadyPopulated);
        }
        if num_levels == 0 {
            return Err(DciError::InvalidParameter(
                "num_levels must be at least 1".into(),
            ));
        }
        cfg.validate()?;
        if data.is_empty() {
            return Err(DciError::InvalidParameter(
                "data must contain at least one point".into(),
            ));
        }
        if data.len() % self.dim != 0 {
            return Err(DciError::DimensionMismatch {
                index_dim: self.dim,
                input_dim: data.len(),
            });
        }

        let n = data.len() / self.dim;
        let num_indices = self.num_comp * self.num_simp;
        let num_levels = num_levels.min(n);

        let mut levels: Vec<Level> = Vec::with_capacity(num_levels);
        if num_levels == 1 {
            let members = (0..n as u32).collect();
            levels.push(Level::build(
                self.base_bank.clone(),
                members,
                data,
                self.dim,
                self.num_simp,
            ));
        } else {
            let tops =
                hierarchy::assign_top_levels(n, num_levels, cfg.num_coarse_points, &mut self.rng);
            // Directions are sampled independently per level; the base bank
            // serves the finest level.
            let coarse_banks: Vec<ProjectionBank> = (0..num_levels - 1)
                .map(|_| ProjectionBank::sample(self.dim, num_indices, &mut self.rng))
                .collect();

            let mut parent_cfg = cfg.query.clone();
            parent_cfg.min_num_finest_level_points = 1;

            for li in 0..num_levels {
                let members: Vec<u32> =
                    (0..n).filter(|&p| tops[p] <= li).map(|p| p as u32).collect();
                let bank = if li == num_levels - 1 {
                    self.base_bank.clone()
                } else {
                    coarse_banks[li].clone()
                };

                if li == 0 {
                    levels.push(Level::build(bank, members, data, self.dim, self.num_simp));
                    hierarchy::refresh_descendant_counts(&mut levels);
                    continue;
                }

                let coarser = &levels[li - 1];
                let coarser_len = coarser.num_points();
                let mut coarser_local = vec![u32::MAX; n];
                for local in 0..coarser_len as u32 {
                    coarser_local[coarser.global_id(local) as usize] = local;
                }

                // A point already present on the coarser level parents
                // itself; everything else searches for its nearest parent
                // through the levels built so far.
                let parents: Vec<u32> = members
                    .iter()
                    .map(|&global| {
                        let local = coarser_local[global as usize];
                        if local != u32::MAX {
                            return local;
                        }
                        let point = point_at(data, self.dim, global);
                        descend(&levels, data, self.dim, point, 1, &parent_cfg)
                            .first()
                            .map_or(0, |c| c.local_id)
                    })
                    .collect();

                let (ordered, ranges) = hierarchy::group_by_parent(&members, &parents, coarser_len);
                levels[li - 1].set_child_ranges(ranges);
                levels.push(Level::build(bank, ordered, data, self.dim, self.num_simp));
                hierarchy::refresh_descendant_counts(&mut levels);
            }
        }

        debug!(
            num_points = n,
            num_levels = levels.len(),
            "index populated"
        );
        self.levels = levels;
        self.data = Some(data);
        Ok(())
    }

    /// Returns up to `k` neighbours for each of `queries.len() / dim`
    /// queries, each `dim` consecutive values.
    ///
    /// Queries of a batch run in parallel; results are ordered by query and
    /// identical to a single-threaded run. Under `cfg.blind` the output
    /// holds up to the effective retrieve cap candidates per query in
    /// promotion order, and no true distances are computed.
    pub fn query(&self, queries: &[f64], k: usize, cfg: &QueryConfig) -> Result<QueryOutput> {
        let data = self.data.ok_or(DciError::EmptyIndex)?;
        if k == 0 {
            return Err(DciError::InvalidParameter("k must be at least 1".into()));
        }
        if queries.is_empty() || queries.len() % self.dim != 0 {
            return Err(DciError::DimensionMismatch {
                index_dim: self.dim,
                input_dim: queries.len(),
            });
        }
        cfg.validate()?;

        let num_queries = queries.len() / self.dim;
        let mut cfg = cfg.clone();
        cfg.min_num_finest_level_points = k;
        debug!(num_queries, k, "running batch query");

        let per_query: Vec<Vec<Neighbor>> = (0..num_queries)
            .into_par_iter()
            .map(|qi| {
                let point = &queries[qi * self.dim..(qi + 1) * self.dim];
                descend(&self.levels, data, self.dim, point, k, &cfg)
                    .into_iter()
                    .map(|c| Neighbor {
                        id: c.global_id as usize,
                        dist: c.dist,
                    })
                    .collect()
            })
            .collect();

        let mut offsets = Vec::with_capacity(num_queries + 1);
        offsets.push(0);
        let mut neighbors = Vec::new();
        for mut list in per_query {
            neighbors.append(&mut list);
            offsets.push(neighbors.len());
        }
        Ok(QueryOutput { neighbors, offsets })
    }

    /// Drops all per-level state but keeps the projection bank.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.data = None;
    }

    /// As `clear`, then re-samples the projection bank from the index's
    /// RNG stream.
    pub fn reset(&mut self) {
        self.clear();
        self.base_bank =
            ProjectionBank::sample(self.dim, self.num_comp * self.num_simp, &mut self.rng);
    }

    #[cfg(test)]
    pub(crate) fn levels(&self) -> &[Level] {
        &self.levels
    }
}

#[inline]
fn point_at(data: &[f64], dim: usize, id: u32) -> &[f64] {
    &data[id as usize * dim..(id as usize + 1) * dim]
}

/// Walks the pyramid from the coarsest level down, narrowing the eligible
/// set, and returns the deepest level's candidates.
///
/// Fractional budgets scale by the eligible pool at intermediate levels and
/// by the level's full point count at the deepest level, where the caller's
/// configuration applies as given.
fn descend(
    levels: &[Level],
    data: &[f64],
    dim: usize,
    point: &[f64],
    k: usize,
    cfg: &QueryConfig,
) -> Vec<Candidate> {
    let deepest = levels.len() - 1;
    let mut eligibility = Eligibility::All;

    for (li, level) in levels.iter().enumerate() {
        let query_proj = level.bank().project_one(point);
        let pool = eligibility.pool(level.num_points());
        if pool == 0 {
            return Vec::new();
        }

        if li == deepest {
            let budget = Budget {
                visit_rounds: cfg.visit_cap(level.num_points()).map(|v| v * level.num_simp()),
                retrieve: cfg.retrieve_cap(level.num_points()),
            };
            let collection = if cfg.blind {
                Collection::PromotionOrder
            } else {
                Collection::Ranked { keep: k }
            };
            return run_level_query(
                level, point, &query_proj, data, dim, &eligibility, &budget, collection,
            );
        }

        // Intermediate level: budgets scale by the eligible pool and the
        // retrieve axis is floored at the field of view so there is always
        // something to expand.
        let budget = Budget {
            visit_rounds: cfg.visit_cap(pool).map(|v| v * level.num_simp()),
            retrieve: cfg
                .retrieve_cap(pool)
                .map(|r| r.max(cfg.field_of_view)),
        };
        let ranked = !cfg.blind && cfg.expansion == ExpansionBasis::Retrieved;
        let collection = if ranked {
            Collection::Ranked {
                keep: budget.retrieve.unwrap_or(pool).min(pool),
            }
        } else {
            Collection::PromotionOrder
        };
        let candidates = run_level_query(
            level, point, &query_proj, data, dim, &eligibility, &budget, collection,
        );
        if candidates.is_empty() {
            return Vec::new();
        }

        // Expand the top field_of_view candidates, and keep expanding until
        // enough finest-level points stay reachable to satisfy k.
        let mut selected: SmallVec<[u32; 64]> = SmallVec::new();
        let mut covered = 0u64;
        for c in &candidates {
            selected.push(c.local_id);
            covered += u64::from(level.finest_descendants(c.local_id));
            if selected.len() >= cfg.field_of_view
                && covered >= cfg.min_num_finest_level_points as u64
            {
                break;
            }
        }

        let mut eligible = vec![false; levels[li + 1].num_points()];
        let mut count = 0usize;
        for &parent in &selected {
            let range = level.child_range(parent);
            for child in range.start..range.start + range.len {
                eligible[child as usize] = true;
            }
            count += range.len as usize;
        }
        eligibility = Eligibility::Mask { eligible, count };
    }

    unreachable!("descent returns at the deepest level")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn unit_square() -> Vec<f64> {
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]
    }

    #[test]
    fn rejects_bad_construction_parameters() {
        assert!(DciIndex::new(0, 2, 3).is_err());
        assert!(DciIndex::new(8, 0, 3).is_err());
        assert!(DciIndex::new(8, 2, 0).is_err());
    }

    #[test]
    fn query_before_add_is_an_error() {
        let index = DciIndex::new(2, 2, 3).unwrap();
        let err = index
            .query(&[0.0, 0.0], 1, &QueryConfig::default())
            .unwrap_err();
        assert_eq!(err, DciError::EmptyIndex);
    }

    #[test]
    fn double_add_is_an_error() {
        let data = unit_square();
        let mut index = DciIndex::new(2, 2, 3).unwrap();
        index.add(&data, 1, &ConstructionConfig::default()).unwrap();
        assert_eq!(
            index.add(&data, 1, &ConstructionConfig::default()),
            Err(DciError::AlreadyPopulated)
        );
    }

    #[test]
    fn single_level_keeps_identity_id_mapping() {
        let data = unit_square();
        let mut index = DciIndex::new(2, 2, 3).unwrap();
        index.add(&data, 1, &ConstructionConfig::default()).unwrap();
        let level = &index.levels()[0];
        for local in 0..level.num_points() as u32 {
            assert_eq!(level.global_id(local), local);
        }
    }

    #[test]
    fn hierarchy_membership_is_nested() {
        let data: Vec<f64> = (0..400).map(|i| (i as f64 * 0.7).sin()).collect();
        let mut index = DciIndex::new(4, 2, 3).unwrap();
        let cfg = ConstructionConfig {
            num_coarse_points: 10,
            ..ConstructionConfig::default()
        };
        index.add(&data, 3, &cfg).unwrap();
        assert_eq!(index.num_levels(), 3);

        let levels = index.levels();
        for li in 0..levels.len() - 1 {
            let coarse: HashSet<u32> = levels[li].globals().iter().copied().collect();
            let fine: HashSet<u32> = levels[li + 1].globals().iter().copied().collect();
            assert!(
                coarse.is_subset(&fine),
                "level {li} must be contained in level {}",
                li + 1
            );
        }
        assert_eq!(levels.last().unwrap().num_points(), 100);
    }

    #[test]
    fn position_files_are_sorted_at_every_level() {
        let data: Vec<f64> = (0..500).map(|i| (i as f64 * 0.13).sin()).collect();
        let mut index = DciIndex::new(5, 2, 3).unwrap();
        let cfg = ConstructionConfig {
            num_coarse_points: 12,
            ..ConstructionConfig::default()
        };
        index.add(&data, 2, &cfg).unwrap();

        for (li, level) in index.levels().iter().enumerate() {
            for (si, simple) in level.simples().iter().enumerate() {
                let entries = simple.entries();
                assert!(
                    entries.windows(2).all(|w| w[0].key <= w[1].key),
                    "level {li} simple index {si} is out of order"
                );
                assert_eq!(entries.len(), level.num_points());
            }
        }
    }

    #[test]
    fn child_ranges_tile_the_next_level() {
        let data: Vec<f64> = (0..600).map(|i| (i as f64 * 0.31).cos()).collect();
        let mut index = DciIndex::new(3, 2, 2).unwrap();
        let cfg = ConstructionConfig {
            num_coarse_points: 15,
            ..ConstructionConfig::default()
        };
        index.add(&data, 2, &cfg).unwrap();

        let levels = index.levels();
        let coarse = &levels[0];
        let fine_len = levels[1].num_points();

        let mut seen = vec![false; fine_len];
        let mut descendants = 0u32;
        for local in 0..coarse.num_points() as u32 {
            let range = coarse.child_range(local);
            descendants += range.len;
            for child in range.start..range.start + range.len {
                assert!(!seen[child as usize], "child {child} owned twice");
                seen[child as usize] = true;
            }
            assert_eq!(coarse.finest_descendants(local), range.len);
        }
        assert_eq!(descendants as usize, fine_len);
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn clear_then_re_add_produces_valid_results() {
        let data = unit_square();
        let mut index = DciIndex::new(2, 2, 3).unwrap();
        index.add(&data, 1, &ConstructionConfig::default()).unwrap();
        let first = index.query(&[0.1, 0.1], 1, &QueryConfig::default()).unwrap();
        assert_eq!(first.neighbors(0)[0].id, 0);

        index.clear();
        assert_eq!(index.num_points(), 0);

        let shifted: Vec<f64> = unit_square().iter().map(|v| v + 10.0).collect();
        index
            .add(&shifted, 1, &ConstructionConfig::default())
            .unwrap();
        let second = index
            .query(&[11.2, 11.2], 1, &QueryConfig::default())
            .unwrap();
        assert_eq!(second.neighbors(0)[0].id, 3);
    }

    #[test]
    fn reset_changes_projections_clear_does_not() {
        let data = unit_square();

        let mut cleared = DciIndex::with_seed(2, 1, 2, 9).unwrap();
        cleared.add(&data, 1, &ConstructionConfig::default()).unwrap();
        let before = cleared.base_bank.clone();
        cleared.clear();
        assert_eq!(before.project_one(&[1.0, 2.0]), cleared.base_bank.project_one(&[1.0, 2.0]));

        let mut reset = DciIndex::with_seed(2, 1, 2, 9).unwrap();
        reset.add(&data, 1, &ConstructionConfig::default()).unwrap();
        let before = reset.base_bank.clone();
        reset.reset();
        assert_ne!(before.project_one(&[1.0, 2.0]), reset.base_bank.project_one(&[1.0, 2.0]));
    }
}
