//! Prioritized Dynamic Continuous Indexing (DCI) for exact
//! k-nearest-neighbour search in high-dimensional Euclidean space.
//!
//! # Algorithm
//!
//! DCI projects every point onto a set of random one-dimensional
//! subspaces and keeps one sorted *position file* per direction. A query
//! walks each position file outward from the query's own projection,
//! always taking the smallest projected displacement next; a point whose
//! every direction within a *composite index* has been crossed is promoted
//! and checked against the raw data. Because closeness in every projection
//! is necessary for closeness in ambient space, true neighbours surface
//! early, and a visit/retrieve budget bounds the work:
//!
//! - **Uncapped**, the traversal degenerates to exact brute force.
//! - **Capped**, query time is linear in ambient dimensionality and
//!   sublinear in the data's *intrinsic* dimensionality, which is the
//!   regime tree- and hash-based indices handle poorly.
//!
//! Optionally the points are layered into a coarse-to-fine pyramid of
//! uniformly sampled subsets; a query narrows a field of view level by
//! level so the budget is spent inside an ever-smaller neighbourhood.
//!
//! # Usage
//!
//! ```rust
//! use dci::{ConstructionConfig, DciIndex, QueryConfig};
//!
//! # fn main() -> dci::Result<()> {
//! // Four points on the unit square, two values per point.
//! let data = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
//!
//! let mut index = DciIndex::new(2, 2, 3)?;
//! index.add(&data, 1, &ConstructionConfig::default())?;
//!
//! let out = index.query(&[0.1, 0.1], 1, &QueryConfig::default())?;
//! assert_eq!(out.neighbors(0)[0].id, 0);
//! # Ok(())
//! # }
//! ```
//!
//! The index never copies the point array: `add` borrows it for the life
//! of the populated index, and queries read it when evaluating candidates.
//!
//! # References
//!
//! - Li & Malik (2017): "Fast k-Nearest Neighbour Search via Prioritized
//!   DCI" (<https://arxiv.org/abs/1703.00440>)
//! - Li & Malik (2016): "Fast k-Nearest Neighbour Search via Dynamic
//!   Continuous Indexing"

pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;

mod hierarchy;
mod linalg;
mod position;
mod projection;
mod query;

pub use config::{ConstructionConfig, ExpansionBasis, QueryConfig};
pub use error::{DciError, Result};
pub use index::{DciIndex, Neighbor, QueryOutput};
