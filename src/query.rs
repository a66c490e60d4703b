//! Prioritized multi-probe query engine.
//!
//! Each composite index walks its simple indices outward from the query's
//! projected coordinate, always taking the smallest projected displacement
//! next. A point is promoted once every simple index in the composite has
//! stepped over it; the first composite to promote a point triggers its
//! evaluation. Composites are serviced round-robin, one step per round, so
//! promotion order is identical no matter how the surrounding batch is
//! scheduled.

use std::collections::BinaryHeap;

use crate::distance::euclidean_distance;
use crate::hierarchy::Level;
use crate::position::SimpleIndex;

/// Points admitted at one stage of a hierarchical descent.
pub(crate) enum Eligibility {
    All,
    Mask { eligible: Vec<bool>, count: usize },
}

impl Eligibility {
    #[inline]
    fn admits(&self, local_id: u32) -> bool {
        match self {
            Eligibility::All => true,
            Eligibility::Mask { eligible, .. } => eligible[local_id as usize],
        }
    }

    /// Size of the admitted pool out of `level_points`.
    pub fn pool(&self, level_points: usize) -> usize {
        match self {
            Eligibility::All => level_points,
            Eligibility::Mask { count, .. } => *count,
        }
    }
}

/// Effective termination budget for one level query.
///
/// `visit_rounds` is in units of round-robin rounds (one pop per composite
/// per round); callers scale the per-point visit cap by the number of simple
/// indices, which is what lets an uncapped query drain every position file.
pub(crate) struct Budget {
    pub visit_rounds: Option<usize>,
    pub retrieve: Option<usize>,
}

/// What the engine keeps while it runs.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Collection {
    /// Bounded best-`keep` set by true distance, returned ascending.
    Ranked { keep: usize },
    /// Every promoted point in promotion order, no distance computation;
    /// the reported value is the projected displacement at promotion time.
    PromotionOrder,
}

/// A promoted point, in the id spaces of the level that produced it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub local_id: u32,
    pub global_id: u32,
    /// True Euclidean distance, or projected displacement in promotion-order
    /// collection.
    pub dist: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Toward larger keys.
    Up,
    /// Toward smaller keys.
    Down,
}

/// One pending step of one simple-index cursor.
#[derive(Debug)]
struct Step {
    gap: f64,
    simple: u32,
    dir: Direction,
    pos: u32,
}

impl Step {
    fn dir_rank(&self) -> u8 {
        match self.dir {
            Direction::Up => 0,
            Direction::Down => 1,
        }
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Step {}

impl Ord for Step {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse the gap so the smallest pops
        // first. Ties break toward the lower simple-index id, then toward
        // the upward cursor.
        other
            .gap
            .total_cmp(&self.gap)
            .then_with(|| other.simple.cmp(&self.simple))
            .then_with(|| other.dir_rank().cmp(&self.dir_rank()))
    }
}

impl PartialOrd for Step {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// First eligible position at or beyond `from`, walking in `dir`.
fn seek(
    simple: &SimpleIndex,
    from: usize,
    simple_id: u32,
    dir: Direction,
    query_key: f64,
    eligibility: &Eligibility,
) -> Option<Step> {
    let pos = match dir {
        Direction::Up => {
            (from..simple.len()).find(|&p| eligibility.admits(simple.entry(p).local_id))?
        }
        Direction::Down => (0..=from)
            .rev()
            .find(|&p| eligibility.admits(simple.entry(p).local_id))?,
    };
    Some(Step {
        gap: (simple.entry(pos).key - query_key).abs(),
        simple: simple_id,
        dir,
        pos: pos as u32,
    })
}

/// Per-composite traversal state.
struct CompositeCursor<'l> {
    simples: &'l [SimpleIndex],
    query_proj: &'l [f64],
    heap: BinaryHeap<Step>,
    /// Per local id: how many of this composite's simple indices have
    /// stepped over the point.
    counts: Vec<u8>,
}

impl<'l> CompositeCursor<'l> {
    fn new(
        simples: &'l [SimpleIndex],
        query_proj: &'l [f64],
        eligibility: &Eligibility,
        level_points: usize,
    ) -> Self {
        let mut heap = BinaryHeap::with_capacity(2 * simples.len());
        for (j, (simple, &query_key)) in simples.iter().zip(query_proj).enumerate() {
            let start = simple.insertion_point(query_key);
            if let Some(step) = seek(simple, start, j as u32, Direction::Up, query_key, eligibility)
            {
                heap.push(step);
            }
            if start > 0 {
                if let Some(step) = seek(
                    simple,
                    start - 1,
                    j as u32,
                    Direction::Down,
                    query_key,
                    eligibility,
                ) {
                    heap.push(step);
                }
            }
        }
        Self {
            simples,
            query_proj,
            heap,
            counts: vec![0; level_points],
        }
    }

    /// Pushes the popped cursor's next step, if any position remains.
    fn advance(&mut self, step: &Step, eligibility: &Eligibility) {
        let simple = &self.simples[step.simple as usize];
        let query_key = self.query_proj[step.simple as usize];
        let next = match step.dir {
            Direction::Up => {
                let from = step.pos as usize + 1;
                (from < simple.len())
                    .then(|| seek(simple, from, step.simple, Direction::Up, query_key, eligibility))
                    .flatten()
            }
            Direction::Down => (step.pos > 0)
                .then(|| {
                    seek(
                        simple,
                        step.pos as usize - 1,
                        step.simple,
                        Direction::Down,
                        query_key,
                        eligibility,
                    )
                })
                .flatten(),
        };
        if let Some(next) = next {
            self.heap.push(next);
        }
    }
}

/// Bounded max-heap entry for the retrieved set. Distance ties break by
/// global id so eviction is deterministic.
#[derive(Debug)]
struct Kept {
    dist: f64,
    local_id: u32,
    global_id: u32,
}

impl PartialEq for Kept {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Kept {}

impl Ord for Kept {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.global_id.cmp(&other.global_id))
    }
}

impl PartialOrd for Kept {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs the prioritized traversal over one level.
///
/// `query_proj` holds the query's projection under the level's bank, one
/// value per simple index, composite-major. `data` is the raw point array;
/// it is only read in ranked collection.
pub(crate) fn run_level_query(
    level: &Level,
    query: &[f64],
    query_proj: &[f64],
    data: &[f64],
    dim: usize,
    eligibility: &Eligibility,
    budget: &Budget,
    collection: Collection,
) -> Vec<Candidate> {
    let num_simp = level.num_simp();
    let num_comp = level.num_comp();
    let level_points = level.num_points();

    let mut composites: Vec<CompositeCursor<'_>> = (0..num_comp)
        .map(|c| {
            CompositeCursor::new(
                level.composite(c),
                &query_proj[c * num_simp..(c + 1) * num_simp],
                eligibility,
                level_points,
            )
        })
        .collect();

    let mut evaluated = vec![false; level_points];
    let mut num_retrieved = 0usize;
    let mut promoted: Vec<Candidate> = Vec::new();
    let mut kept: BinaryHeap<Kept> = BinaryHeap::new();
    let keep = match collection {
        Collection::Ranked { keep } => keep,
        Collection::PromotionOrder => 0,
    };

    let mut rounds = 0usize;
    'traversal: loop {
        if budget.visit_rounds.is_some_and(|cap| rounds >= cap) {
            break;
        }
        if budget.retrieve.is_some_and(|cap| num_retrieved >= cap) {
            break;
        }

        let mut any_active = false;
        for cursor in composites.iter_mut() {
            let Some(step) = cursor.heap.pop() else {
                continue;
            };
            any_active = true;

            let entry = *cursor.simples[step.simple as usize].entry(step.pos as usize);
            cursor.counts[entry.local_id as usize] += 1;

            if cursor.counts[entry.local_id as usize] == num_simp as u8
                && !evaluated[entry.local_id as usize]
            {
                evaluated[entry.local_id as usize] = true;
                num_retrieved += 1;
                match collection {
                    Collection::PromotionOrder => {
                        promoted.push(Candidate {
                            local_id: entry.local_id,
                            global_id: entry.global_id,
                            dist: step.gap,
                        });
                        if budget.retrieve.is_some_and(|cap| num_retrieved >= cap) {
                            break 'traversal;
                        }
                    }
                    Collection::Ranked { .. } => {
                        let point =
                            &data[entry.global_id as usize * dim..(entry.global_id as usize + 1) * dim];
                        let candidate = Kept {
                            dist: euclidean_distance(query, point),
                            local_id: entry.local_id,
                            global_id: entry.global_id,
                        };
                        if kept.len() < keep {
                            kept.push(candidate);
                        } else if keep > 0
                            && kept.peek().is_some_and(|worst| candidate.dist < worst.dist)
                        {
                            kept.pop();
                            kept.push(candidate);
                        }
                    }
                }
            }

            cursor.advance(&step, eligibility);
        }

        if !any_active {
            break;
        }
        rounds += 1;
    }

    match collection {
        Collection::PromotionOrder => promoted,
        Collection::Ranked { .. } => kept
            .into_sorted_vec()
            .into_iter()
            .map(|k| Candidate {
                local_id: k.local_id,
                global_id: k.global_id,
                dist: k.dist,
            })
            .collect(),
    }
}
