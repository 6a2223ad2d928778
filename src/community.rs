//! Group-annotated tree snapshots for diversity metrics.
//!
//! # Overview
//! A `CommunityTree` captures everything the UniFrac computation needs from a
//! phylogenetic tree: one entry per node holding the branch length above the
//! node and a partition count: how many descendant leaves belong to each
//! sample group. The snapshot is extracted once from a parsed
//! [`phylotree::tree::Tree`] plus a leaf→group assignment map and is then
//! read-only as far as the metric is concerned.
//!
//! # Node ordering
//! Nodes are stored in post-order: every child index is smaller than its
//! parent's index and the root is last. `recount` relies on this to rebuild
//! all partition counts in a single forward pass.
//!
//! # Randomized relabeling
//! For permutation testing, `randomize_labels` shuffles which leaves carry
//! which group label within a chosen group subset, holding topology and
//! branch lengths fixed, then refreshes every partition count.

use crate::error::TreeFracError;
use phylotree::tree::Tree as PhyloTree;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Sentinel branch length meaning "no defined length" (e.g. the root).
/// Nodes carrying it never contribute to branch-length accumulations.
pub const NO_BRANCH_LENGTH: f64 = -1.0;

/// Reserved group name given to leaves absent from the assignment map.
/// It is registered like any other group but excluded from "all groups"
/// enumeration.
pub const UNASSIGNED_GROUP: &str = "ungrouped";

/// One tree node: branch length above it, child indices, the group label
/// (leaves only) and the per-group descendant-leaf counts.
#[derive(Debug, Clone)]
pub struct CommunityNode {
    /// Length of the edge above this node, or [`NO_BRANCH_LENGTH`].
    pub branch_length: f64,

    /// Indices of child nodes (empty for leaves). Always smaller than the
    /// index of this node.
    pub children: Vec<usize>,

    /// Group label, `Some` only on leaves. Source of truth for `recount`.
    pub group: Option<String>,

    /// Number of descendant leaves per group. Keys with nonzero count are
    /// exactly the groups with leaves below this node.
    pub pcount: HashMap<String, usize>,
}

/// An index-addressable, group-annotated snapshot of a phylogenetic tree.
#[derive(Debug, Clone)]
pub struct CommunityTree {
    /// All nodes in post-order (children before parents, root last).
    pub nodes: Vec<CommunityNode>,

    /// Index of the root node.
    pub root: usize,

    /// Registered group names in first-encounter (leaf traversal) order,
    /// including [`UNASSIGNED_GROUP`] when any leaf lacks an assignment.
    pub groups: Vec<String>,
}

impl CommunityTree {
    /// Extract a snapshot from a parsed tree and a leaf→group map.
    ///
    /// Branch lengths come from each node's parent edge; a missing edge
    /// (the root, unannotated nodes) becomes [`NO_BRANCH_LENGTH`]. Leaves
    /// not present in `assignments` are labeled [`UNASSIGNED_GROUP`].
    ///
    /// # Errors
    /// Returns an error if the tree is malformed or a leaf has no name.
    pub fn from_tree(
        tree: &PhyloTree,
        assignments: &HashMap<String, String>,
    ) -> Result<Self, TreeFracError> {
        let root_id = tree.get_root()?;
        let mut nodes = Vec::new();
        let mut groups = Vec::new();
        let root = Self::build(tree, root_id, assignments, &mut nodes, &mut groups)?;
        Ok(CommunityTree { nodes, root, groups })
    }

    /// Parse a Newick string and extract its snapshot in one step.
    pub fn from_newick(
        newick: &str,
        assignments: &HashMap<String, String>,
    ) -> Result<Self, TreeFracError> {
        let tree = PhyloTree::from_newick(newick)?;
        Self::from_tree(&tree, assignments)
    }

    /// Recursively append `node_id` and its subtree in post-order,
    /// returning the snapshot index of the appended node.
    fn build(
        tree: &PhyloTree,
        node_id: usize,
        assignments: &HashMap<String, String>,
        nodes: &mut Vec<CommunityNode>,
        groups: &mut Vec<String>,
    ) -> Result<usize, TreeFracError> {
        let node = tree.get(&node_id)?;
        let branch_length = node.parent_edge.unwrap_or(NO_BRANCH_LENGTH);

        // Leaf: a single-entry partition count from the assignment map.
        if node.children.is_empty() {
            let name = node
                .name
                .clone()
                .ok_or(TreeFracError::UnnamedLeaf { node: node_id })?;
            let group = assignments
                .get(&name)
                .map(String::as_str)
                .unwrap_or(UNASSIGNED_GROUP)
                .to_string();
            if !groups.contains(&group) {
                groups.push(group.clone());
            }
            nodes.push(CommunityNode {
                branch_length,
                children: Vec::new(),
                group: Some(group.clone()),
                pcount: HashMap::from([(group, 1)]),
            });
            return Ok(nodes.len() - 1);
        }

        // Internal node: children first, then merge their counts.
        let mut children = Vec::with_capacity(node.children.len());
        for &child_id in &node.children {
            children.push(Self::build(tree, child_id, assignments, nodes, groups)?);
        }
        let mut pcount: HashMap<String, usize> = HashMap::new();
        for &child in &children {
            for (group, count) in &nodes[child].pcount {
                *pcount.entry(group.clone()).or_insert(0) += count;
            }
        }
        nodes.push(CommunityNode {
            branch_length,
            children,
            group: None,
            pcount,
        });
        Ok(nodes.len() - 1)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.group.is_some()).count()
    }

    /// All registered group names, placeholder included.
    pub fn group_names(&self) -> &[String] {
        &self.groups
    }

    /// Registered group names with the unassigned placeholder removed:
    /// the set scored when the caller selects no groups explicitly.
    pub fn comparable_groups(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.as_str() != UNASSIGNED_GROUP)
            .cloned()
            .collect()
    }

    /// Leaf count per group over the whole tree.
    pub fn group_census(&self) -> HashMap<String, usize> {
        let mut census: HashMap<String, usize> = HashMap::new();
        for node in &self.nodes {
            if let Some(group) = &node.group {
                *census.entry(group.clone()).or_insert(0) += 1;
            }
        }
        census
    }

    /// Verify the annotation invariants the metric relies on: branch
    /// lengths are non-negative or exactly the sentinel, and every counted
    /// group is registered.
    pub fn check_annotation(&self) -> Result<(), TreeFracError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.branch_length < 0.0 && node.branch_length != NO_BRANCH_LENGTH {
                return Err(TreeFracError::NegativeBranchLength {
                    node: i,
                    length: node.branch_length,
                });
            }
            for group in node.pcount.keys() {
                if !self.groups.iter().any(|g| g == group) {
                    return Err(TreeFracError::UnknownGroup {
                        node: i,
                        group: group.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Randomly redistribute the group labels of all leaves belonging to
    /// `groups`, then rebuild every partition count.
    ///
    /// Topology and branch lengths are untouched; the label multiset is
    /// preserved (shuffled, not resampled), so per-group leaf totals are
    /// invariant under relabeling.
    pub fn randomize_labels<R: Rng + ?Sized>(&mut self, groups: &[String], rng: &mut R) {
        let mut members = Vec::new();
        let mut labels = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(group) = &node.group {
                if groups.iter().any(|g| g == group) {
                    members.push(i);
                    labels.push(group.clone());
                }
            }
        }
        labels.shuffle(rng);
        for (i, label) in members.into_iter().zip(labels) {
            self.nodes[i].group = Some(label);
        }
        self.recount();
    }

    /// Rebuild every node's partition count from the current leaf labels.
    /// Single forward pass; correct because nodes are stored post-order.
    pub fn recount(&mut self) {
        for i in 0..self.nodes.len() {
            let pcount = if let Some(group) = &self.nodes[i].group {
                HashMap::from([(group.clone(), 1)])
            } else {
                let mut merged: HashMap<String, usize> = HashMap::new();
                for child in self.nodes[i].children.clone() {
                    for (group, count) in &self.nodes[child].pcount {
                        *merged.entry(group.clone()).or_insert(0) += count;
                    }
                }
                merged
            };
            self.nodes[i].pcount = pcount;
        }
    }
}
