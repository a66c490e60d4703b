//! Construction and query configuration records.

use serde::{Deserialize, Serialize};

use crate::error::{DciError, Result};

/// Which coarse-level candidates seed the field of view at the next level.
///
/// Under tight budgets the order in which candidates are promoted (first
/// full-composite agreement) and the order of their true distances can
/// disagree; this picks which one drives the descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpansionBasis {
    /// Expand the candidates closest to the query in ambient space.
    #[default]
    Retrieved,
    /// Expand candidates in promotion order. Always in effect when `blind`
    /// is set, since no true distances exist to rank by.
    Promoted,
}

/// Termination budget and probe configuration for a query.
///
/// Each budget axis combines an absolute count and a fraction of the point
/// pool; the effective cap is the maximum of the active forms. A query
/// terminates as soon as either axis reaches its cap. Inactive forms are
/// `None` (absolute) and `0.0` (fractional); at least one form of one axis
/// must be active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Skip true-distance computation and return candidates in promotion
    /// order. The distance reported for each candidate is then its largest
    /// projected displacement rather than a Euclidean distance, and the
    /// retrieve axis caps how many candidates are collected.
    pub blind: bool,
    /// Absolute visit cap.
    pub num_to_visit: Option<usize>,
    /// Absolute retrieve cap.
    pub num_to_retrieve: Option<usize>,
    /// Fractional visit cap in [0, 1].
    pub prop_to_visit: f64,
    /// Fractional retrieve cap in [0, 1].
    pub prop_to_retrieve: f64,
    /// Number of candidates expanded into the next level during a
    /// hierarchical descent. Ignored when the index has a single level.
    pub field_of_view: usize,
    /// Basis for field-of-view expansion.
    pub expansion: ExpansionBasis,
    /// Overwritten by the engine before each descent; ignored on input.
    pub min_num_finest_level_points: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            blind: false,
            num_to_visit: None,
            num_to_retrieve: None,
            prop_to_visit: 1.0,
            prop_to_retrieve: 1.0,
            field_of_view: 100,
            expansion: ExpansionBasis::default(),
            min_num_finest_level_points: 0,
        }
    }
}

impl QueryConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for (name, prop) in [
            ("prop_to_visit", self.prop_to_visit),
            ("prop_to_retrieve", self.prop_to_retrieve),
        ] {
            if !(0.0..=1.0).contains(&prop) {
                return Err(DciError::InvalidParameter(format!(
                    "{name} must lie in [0, 1], got {prop}"
                )));
            }
        }
        if self.field_of_view == 0 {
            return Err(DciError::InvalidParameter(
                "field_of_view must be at least 1".into(),
            ));
        }
        if self.num_to_visit.is_none()
            && self.num_to_retrieve.is_none()
            && self.prop_to_visit <= 0.0
            && self.prop_to_retrieve <= 0.0
        {
            return Err(DciError::InactiveBudget);
        }
        Ok(())
    }

    /// Effective visit cap, in points, against a pool of `n` points.
    /// `None` means the axis is inactive and never fires.
    pub(crate) fn visit_cap(&self, n: usize) -> Option<usize> {
        effective_axis(self.num_to_visit, self.prop_to_visit, n)
    }

    /// Effective retrieve cap against a pool of `n` points.
    pub(crate) fn retrieve_cap(&self, n: usize) -> Option<usize> {
        effective_axis(self.num_to_retrieve, self.prop_to_retrieve, n)
    }
}

fn effective_axis(absolute: Option<usize>, prop: f64, n: usize) -> Option<usize> {
    let fractional = (prop > 0.0).then(|| (prop * n as f64).ceil() as usize);
    match (absolute, fractional) {
        (Some(a), Some(f)) => Some(a.max(f)),
        (Some(a), None) => Some(a),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    }
}

/// Parameters for `DciIndex::add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionConfig {
    /// Target number of points on the coarsest level. Intermediate levels
    /// are geometrically spaced between this and the full point count.
    pub num_coarse_points: usize,
    /// Budget used to associate each point with its nearest coarser-level
    /// parent while the hierarchy is being built. Ignored for single-level
    /// indices.
    pub query: QueryConfig,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            num_coarse_points: 1000,
            query: QueryConfig {
                prop_to_retrieve: 0.002,
                field_of_view: 10,
                ..QueryConfig::default()
            },
        }
    }
}

impl ConstructionConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_coarse_points == 0 {
            return Err(DciError::InvalidParameter(
                "num_coarse_points must be at least 1".into(),
            ));
        }
        self.query.validate()
    }
}
