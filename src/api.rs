//! Python binding layer for UniFrac computations.
//!
//! Provides Python functions for scoring group-annotated Newick tree files,
//! with an optional label-permutation significance test.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::sync::atomic::AtomicBool;

use crate::community::CommunityTree;
use crate::error::TreeFracError;
use crate::io::{read_group_map, read_newick_trees};
use crate::null::{null_distribution, score_significance};
use crate::unifrac::{combination_labels, unweighted_unifrac};

/// Compute unweighted UniFrac scores for every tree in a Newick file.
///
/// Args:
///     tree_path: Path to a Newick tree file (one tree per line, .gz supported)
///     group_path: Path to a leaf-to-group assignment file (name<TAB>group)
///     groups: Group names to compare; empty scores all groups jointly (default: [])
///
/// Returns:
///     A tuple of (labels, scores) where:
///     - labels is a list of combination labels ("A-B", ..., "A-B-C")
///     - scores is one list of values per tree, aligned with labels
///
/// Raises:
///     ValueError: If files cannot be read, a tree is malformed, or the
///     trees disagree on the group combinations being scored
#[pyfunction]
#[pyo3(signature = (tree_path, group_path, groups=vec![]))]
fn unweighted_scores(
    tree_path: String,
    group_path: String,
    groups: Vec<String>,
) -> PyResult<(Vec<String>, Vec<Vec<f64>>)> {
    let communities = load_communities(&tree_path, &group_path)?;
    let labels = consistent_labels(&communities, &groups)?;

    let scores = communities
        .iter()
        .map(|community| unweighted_unifrac(community, &groups).map_err(to_py_err))
        .collect::<PyResult<Vec<_>>>()?;

    Ok((labels, scores))
}

/// Compute observed scores plus permutation significance for every tree.
///
/// Args:
///     tree_path: Path to a Newick tree file (one tree per line, .gz supported)
///     group_path: Path to a leaf-to-group assignment file (name<TAB>group)
///     groups: Group names to compare; empty scores all groups jointly (default: [])
///     iters: Number of permutation draws per tree (default: 1000)
///     seed: Base seed for the permutation draws (default: 0)
///
/// Returns:
///     A tuple of (labels, scores, fractions) where fractions holds, per
///     tree and combination, the fraction of null draws at or above the
///     observed score.
///
/// Raises:
///     ValueError: If files cannot be read or a tree is malformed
#[pyfunction]
#[pyo3(signature = (tree_path, group_path, groups=vec![], iters=1000, seed=0))]
fn unweighted_significance(
    tree_path: String,
    group_path: String,
    groups: Vec<String>,
    iters: usize,
    seed: u64,
) -> PyResult<(Vec<String>, Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    let communities = load_communities(&tree_path, &group_path)?;
    let labels = consistent_labels(&communities, &groups)?;
    let cancel = AtomicBool::new(false);

    let mut scores = Vec::with_capacity(communities.len());
    let mut fractions = Vec::with_capacity(communities.len());
    for community in &communities {
        let observed = unweighted_unifrac(community, &groups).map_err(to_py_err)?;
        let null =
            null_distribution(community, &groups, iters, seed, &cancel).map_err(to_py_err)?;
        fractions.push(score_significance(&observed, &null));
        scores.push(observed);
    }

    Ok((labels, scores, fractions))
}

/// Read and annotate every tree in the input file.
fn load_communities(tree_path: &str, group_path: &str) -> PyResult<Vec<CommunityTree>> {
    let assignments = read_group_map(group_path).map_err(to_py_err)?;
    let trees = read_newick_trees(tree_path).map_err(to_py_err)?;
    trees
        .iter()
        .map(|tree| CommunityTree::from_tree(tree, &assignments).map_err(to_py_err))
        .collect()
}

/// All trees in one file must expose the same combinations, otherwise the
/// per-tree score lists would not be comparable row by row.
fn consistent_labels(
    communities: &[CommunityTree],
    groups: &[String],
) -> PyResult<Vec<String>> {
    let mut labels: Option<Vec<String>> = None;
    for (idx, community) in communities.iter().enumerate() {
        let tree_labels = combination_labels(community, groups);
        match &labels {
            None => labels = Some(tree_labels),
            Some(first) if *first != tree_labels => {
                return Err(PyValueError::new_err(format!(
                    "tree {} scores different group combinations than tree 0",
                    idx
                )));
            }
            Some(_) => {}
        }
    }
    labels.ok_or_else(|| PyValueError::new_err("no trees to score"))
}

fn to_py_err(e: TreeFracError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Python module definition
#[pymodule]
fn treefrac(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(unweighted_scores, m)?)?;
    m.add_function(wrap_pyfunction!(unweighted_significance, m)?)?;
    Ok(())
}
