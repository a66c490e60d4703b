//! Coarse-to-fine level structure.
//!
//! Every level owns its own projection bank and position files over its
//! subset of the points. A coarser level's points each map to a contiguous
//! range of positions at the next finer level; the finer level is laid out
//! so that all children of one parent are adjacent, which is what makes the
//! field-of-view restriction a union of ranges instead of a scattered set.

use rand::Rng;
use rand::rngs::StdRng;

use crate::position::{IndexEntry, SimpleIndex};
use crate::projection::ProjectionBank;

/// Contiguous block of next-finer-level local ids descending from one point.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChildRange {
    pub start: u32,
    pub len: u32,
}

/// One level of the index: a projection bank, the sorted position files of
/// every simple index, and the id plumbing that ties the level to its
/// neighbours in the pyramid.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    bank: ProjectionBank,
    /// num_comp · num_simp position files, composite-major.
    simples: Vec<SimpleIndex>,
    /// Local id → global id.
    globals: Vec<u32>,
    /// Local id → children at the next finer level. Empty at the finest.
    child_ranges: Vec<ChildRange>,
    /// Local id → number of finest-level points below it.
    finest_descendants: Vec<u32>,
    num_simp: usize,
}

impl Level {
    /// Builds a level over `members` (global ids, already in final local
    /// order): projects the member points through `bank` and sorts one
    /// position file per direction.
    pub fn build(
        bank: ProjectionBank,
        members: Vec<u32>,
        data: &[f64],
        dim: usize,
        num_simp: usize,
    ) -> Self {
        let n = members.len();
        let num_indices = bank.count();

        let mut gathered = vec![0.0; dim * n];
        for (local, &global) in members.iter().enumerate() {
            let src = &data[global as usize * dim..(global as usize + 1) * dim];
            gathered[local * dim..(local + 1) * dim].copy_from_slice(src);
        }
        let proj = bank.project(&gathered, n);

        let simples = (0..num_indices)
            .map(|i| {
                SimpleIndex::build(
                    members
                        .iter()
                        .enumerate()
                        .map(|(local, &global)| IndexEntry {
                            key: proj[local * num_indices + i],
                            local_id: local as u32,
                            global_id: global,
                        })
                        .collect(),
                )
            })
            .collect();

        Self {
            bank,
            simples,
            globals: members,
            child_ranges: Vec::new(),
            finest_descendants: vec![1; n],
            num_simp,
        }
    }

    pub fn num_points(&self) -> usize {
        self.globals.len()
    }

    pub fn bank(&self) -> &ProjectionBank {
        &self.bank
    }

    pub fn num_simp(&self) -> usize {
        self.num_simp
    }

    pub fn num_comp(&self) -> usize {
        self.simples.len() / self.num_simp
    }

    /// The simple indices of one composite index.
    pub fn composite(&self, comp: usize) -> &[SimpleIndex] {
        &self.simples[comp * self.num_simp..(comp + 1) * self.num_simp]
    }

    pub fn global_id(&self, local: u32) -> u32 {
        self.globals[local as usize]
    }

    pub fn child_range(&self, local: u32) -> ChildRange {
        self.child_ranges[local as usize]
    }

    pub fn finest_descendants(&self, local: u32) -> u32 {
        self.finest_descendants[local as usize]
    }

    pub fn set_child_ranges(&mut self, ranges: Vec<ChildRange>) {
        debug_assert_eq!(ranges.len(), self.num_points());
        self.child_ranges = ranges;
    }

    #[cfg(test)]
    pub fn globals(&self) -> &[u32] {
        &self.globals
    }

    #[cfg(test)]
    pub fn simples(&self) -> &[SimpleIndex] {
        &self.simples
    }
}

/// Draws the coarsest level each point reaches. Level 0 is the coarsest and
/// `num_levels - 1` the finest; a point assigned level ℓ is a member of
/// every level ≥ ℓ. Promotion is geometric with ratio r chosen so the
/// coarsest level holds `num_coarse_points` in expectation, and the
/// coarsest level is forced non-empty.
pub(crate) fn assign_top_levels(
    num_points: usize,
    num_levels: usize,
    num_coarse_points: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    debug_assert!(num_levels >= 2);
    let target = num_coarse_points.clamp(1, num_points);
    let ratio = (target as f64 / num_points as f64).powf(1.0 / (num_levels - 1) as f64);

    let mut tops: Vec<usize> = (0..num_points)
        .map(|_| {
            let mut level = num_levels - 1;
            while level > 0 && rng.random::<f64>() < ratio {
                level -= 1;
            }
            level
        })
        .collect();
    if !tops.contains(&0) {
        tops[0] = 0;
    }
    tops
}

/// Orders the members of a finer level so that the children of each
/// coarser-level parent are adjacent, and records each parent's range.
///
/// `parents[i]` is the coarser-level local id owning `members[i]`. Member
/// order is preserved within each group, so the layout is deterministic.
pub(crate) fn group_by_parent(
    members: &[u32],
    parents: &[u32],
    num_parents: usize,
) -> (Vec<u32>, Vec<ChildRange>) {
    debug_assert_eq!(members.len(), parents.len());
    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); num_parents];
    for (&member, &parent) in members.iter().zip(parents) {
        buckets[parent as usize].push(member);
    }

    let mut ordered = Vec::with_capacity(members.len());
    let mut ranges = Vec::with_capacity(num_parents);
    for bucket in buckets {
        ranges.push(ChildRange {
            start: ordered.len() as u32,
            len: bucket.len() as u32,
        });
        ordered.extend(bucket);
    }
    (ordered, ranges)
}

/// Recomputes `finest_descendants` for every level so that counts are
/// relative to the deepest level currently present.
pub(crate) fn refresh_descendant_counts(levels: &mut [Level]) {
    let Some(last) = levels.len().checked_sub(1) else {
        return;
    };
    levels[last].finest_descendants = vec![1; levels[last].num_points()];
    for i in (0..last).rev() {
        let (coarse, fine) = levels.split_at_mut(i + 1);
        let level = &mut coarse[i];
        let below = &fine[0];
        level.finest_descendants = level
            .child_ranges
            .iter()
            .map(|range| {
                (range.start..range.start + range.len)
                    .map(|child| below.finest_descendants[child as usize])
                    .sum()
            })
            .collect();
    }
}
