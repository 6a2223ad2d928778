//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `community`: group-annotated tree snapshots (branch lengths + per-node
//!   partition counts) and the label-randomization operation.
//! - `unifrac`: the unweighted UniFrac metric, observed and randomized.
//! - `null`: permutation null distributions and significance fractions.
//! - `io`: Newick / group-file ingestion and TSV score output.
//! - `error`: the crate-wide error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod community;
pub mod error;
pub mod io;
pub mod null;
pub mod unifrac;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use community::{CommunityNode, CommunityTree, NO_BRANCH_LENGTH, UNASSIGNED_GROUP};
pub use error::TreeFracError;
pub use null::{null_distribution, score_significance};
pub use unifrac::{
    combination_labels, partition_ratio, unweighted_unifrac, unweighted_unifrac_randomized,
};
