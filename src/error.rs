//! Error type shared across the crate.

use phylotree::tree::{NewickParseError, TreeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeFracError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("newick parse error: {0}")]
    Newick(#[from] NewickParseError),

    #[error("leaf node {node} has no name")]
    UnnamedLeaf { node: usize },

    #[error("node {node} counts group '{group}' which is not registered")]
    UnknownGroup { node: usize, group: String },

    #[error("node {node} has negative branch length {length} (only -1 marks an undefined length)")]
    NegativeBranchLength { node: usize, length: f64 },

    #[error("group '{group}' was selected but no leaf belongs to it")]
    GroupNotFound { group: String },

    #[error("malformed group file line {line}: {text:?}")]
    GroupFileParse { line: usize, text: String },

    #[error("no trees parsed from input")]
    NoTrees,
}
