//! Unweighted UniFrac over group-annotated trees.
//!
//! The unweighted UniFrac statistic is the fraction of a tree's total branch
//! length that is *unique* to a single sample group, within a chosen set of
//! groups. A branch is unique when every leaf below it belongs to one group
//! of the set; it is shared when leaves from several of the groups sit below
//! it. Branches whose leaves all fall outside the set contribute nothing.
//!
//! Two entry points share one core:
//!
//! 1. [`unweighted_unifrac`] scores the observed tree.
//! 2. [`unweighted_unifrac_randomized`] scores a freshly relabeled copy per
//!    group combination, yielding one draw of the permutation null model.

use crate::community::{CommunityTree, NO_BRANCH_LENGTH};
use crate::error::TreeFracError;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Compute the unweighted UniFrac score for one group set.
///
/// # Algorithm
/// For every node, restrict its partition counts to `group_set`:
/// - no group of the set below the node → the node is out of scope;
/// - exactly one group below it → its branch length is unique;
/// - any group below it → its branch length counts toward the total.
///
/// Nodes carrying the [`NO_BRANCH_LENGTH`] sentinel are excluded from both
/// sums regardless of their counts. The score is `unique / total`,
/// normalized to `0.0` when no branch length fell within the set (the
/// degenerate 0/0 and x/0 cases).
///
/// Node order is irrelevant; the sums are order-independent.
pub fn partition_ratio(tree: &CommunityTree, group_set: &[String]) -> f64 {
    let mut unique_bl = 0.0;
    let mut total_bl = 0.0;

    for node in &tree.nodes {
        let in_scope = node
            .pcount
            .iter()
            .filter(|&(group, &count)| count > 0 && group_set.iter().any(|g| g == group))
            .count();
        if in_scope == 0 {
            continue;
        }
        if node.branch_length != NO_BRANCH_LENGTH {
            if in_scope == 1 {
                unique_bl += node.branch_length.abs();
            }
            total_bl += node.branch_length.abs();
        }
    }

    let ratio = unique_bl / total_bl;
    if ratio.is_nan() || ratio.is_infinite() { 0.0 } else { ratio }
}

/// Score every pairwise group combination plus the full selected set.
///
/// Pairs are enumerated in selection order: for groups `[X, Y, Z]` the
/// output slots correspond to `(X,Y)`, `(X,Z)`, `(Y,Z)`, then the combined
/// set `{X,Y,Z}`. An empty selection yields a single value computed over
/// every registered group except the unassigned placeholder.
///
/// # Output shape
/// Length is `C(n,2) + 1`, with one quirk kept for output compatibility:
/// when exactly two groups are selected the single pair already equals the
/// combined score, so the final slot is skipped and stays `0.0`.
///
/// # Errors
/// Fails on malformed annotation (negative non-sentinel branch length,
/// counts naming an unregistered group) or a selected group with no leaves.
pub fn unweighted_unifrac(
    tree: &CommunityTree,
    selected: &[String],
) -> Result<Vec<f64>, TreeFracError> {
    tree.check_annotation()?;
    validate_selection(tree, selected)?;

    let num_groups = selected.len();
    let num_comp = num_groups * num_groups.saturating_sub(1) / 2;
    let mut scores = vec![0.0; num_comp + 1];

    let mut slot = 0;
    for a in 0..num_groups {
        for l in a + 1..num_groups {
            let pair = [selected[a].clone(), selected[l].clone()];
            scores[slot] = partition_ratio(tree, &pair);
            slot += 1;
        }
    }

    if num_comp != 1 {
        scores[slot] = partition_ratio(tree, &combined_set(tree, selected));
    }

    Ok(scores)
}

/// Score randomized relabelings of the tree, one fresh copy per combination.
///
/// Same output shape and combination order as [`unweighted_unifrac`], but
/// each slot is computed on a deep copy whose leaf labels were shuffled
/// within that combination's groups (topology and branch lengths fixed,
/// partition counts recomputed). One call is a single draw of the null
/// model; repeat with independent RNG state to build a distribution.
///
/// `cancel` is polled after each copy/relabel step. Once it reads `true`
/// the scores collected so far are returned as-is; cancellation is
/// cooperative and not an error.
pub fn unweighted_unifrac_randomized<R: Rng + ?Sized>(
    tree: &CommunityTree,
    selected: &[String],
    rng: &mut R,
    cancel: &AtomicBool,
) -> Result<Vec<f64>, TreeFracError> {
    tree.check_annotation()?;
    validate_selection(tree, selected)?;

    let num_groups = selected.len();
    let num_comp = num_groups * num_groups.saturating_sub(1) / 2;
    let mut scores = vec![0.0; num_comp + 1];

    let mut slot = 0;
    for a in 0..num_groups {
        for l in a + 1..num_groups {
            let pair = [selected[a].clone(), selected[l].clone()];
            let mut shuffled = tree.clone();
            shuffled.randomize_labels(&pair, rng);
            if cancel.load(Ordering::Relaxed) {
                return Ok(scores);
            }
            scores[slot] = partition_ratio(&shuffled, &pair);
            slot += 1;
        }
    }

    if num_comp != 1 {
        let combined = combined_set(tree, selected);
        let mut shuffled = tree.clone();
        shuffled.randomize_labels(&combined, rng);
        if cancel.load(Ordering::Relaxed) {
            return Ok(scores);
        }
        scores[slot] = partition_ratio(&shuffled, &combined);
    }

    Ok(scores)
}

/// Human-readable label per output slot: `X-Y` for each pair, then the
/// joined combined set. Always the same length as the score vector.
pub fn combination_labels(tree: &CommunityTree, selected: &[String]) -> Vec<String> {
    let num_groups = selected.len();
    let mut labels = Vec::new();
    for a in 0..num_groups {
        for l in a + 1..num_groups {
            labels.push(format!("{}-{}", selected[a], selected[l]));
        }
    }
    labels.push(combined_set(tree, selected).join("-"));
    labels
}

/// The group set scored in the final output slot: the explicit selection,
/// or every registered group minus the unassigned placeholder.
fn combined_set(tree: &CommunityTree, selected: &[String]) -> Vec<String> {
    if selected.is_empty() {
        tree.comparable_groups()
    } else {
        selected.to_vec()
    }
}

fn validate_selection(tree: &CommunityTree, selected: &[String]) -> Result<(), TreeFracError> {
    for group in selected {
        if !tree.groups.iter().any(|g| g == group) {
            return Err(TreeFracError::GroupNotFound {
                group: group.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::CommunityNode;
    use itertools::Itertools;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn leaf(group: &str, branch_length: f64) -> CommunityNode {
        CommunityNode {
            branch_length,
            children: Vec::new(),
            group: Some(group.to_string()),
            pcount: HashMap::new(),
        }
    }

    fn inner(children: Vec<usize>, branch_length: f64) -> CommunityNode {
        CommunityNode {
            branch_length,
            children,
            group: None,
            pcount: HashMap::new(),
        }
    }

    fn build(nodes: Vec<CommunityNode>, groups: &[&str]) -> CommunityTree {
        let root = nodes.len() - 1;
        let mut tree = CommunityTree {
            nodes,
            root,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        };
        tree.recount();
        tree
    }

    fn names(groups: &[&str]) -> Vec<String> {
        groups.iter().map(|g| g.to_string()).collect()
    }

    /// Three leaves in groups A, A, B. The A-A cherry sits above a 0.5
    /// branch, the node joining in B above a 0.3 branch, and no other edge
    /// carries a defined length. For {A, B}: unique 0.5, total 0.8.
    fn aab_tree() -> CommunityTree {
        build(
            vec![
                leaf("A", NO_BRANCH_LENGTH),
                leaf("A", NO_BRANCH_LENGTH),
                leaf("B", NO_BRANCH_LENGTH),
                inner(vec![0, 1], 0.5),
                inner(vec![3, 2], 0.3),
                inner(vec![4], NO_BRANCH_LENGTH),
            ],
            &["A", "B"],
        )
    }

    /// Three groups mingled across three cherries: (A,B), (A,C), (B,C),
    /// with cherry branches 1.0 / 2.0 / 4.0 and every leaf branch 0.25.
    /// Pairwise scores are all distinct: 0.875, 0.75, 0.5.
    fn mingled_tree() -> CommunityTree {
        build(
            vec![
                leaf("A", 0.25),
                leaf("B", 0.25),
                inner(vec![0, 1], 1.0),
                leaf("A", 0.25),
                leaf("C", 0.25),
                inner(vec![3, 4], 2.0),
                leaf("B", 0.25),
                leaf("C", 0.25),
                inner(vec![6, 7], 4.0),
                inner(vec![2, 5, 8], NO_BRANCH_LENGTH),
            ],
            &["A", "B", "C"],
        )
    }

    #[test]
    fn ratio_matches_worked_example() {
        let tree = aab_tree();
        let ratio = partition_ratio(&tree, &names(&["A", "B"]));
        assert!((ratio - 0.625).abs() < 1e-12);
    }

    #[test]
    fn single_group_scores_one() {
        // Restricted to A alone, every in-scope branch is unique.
        let tree = aab_tree();
        assert_eq!(partition_ratio(&tree, &names(&["A"])), 1.0);
    }

    #[test]
    fn disjoint_group_scores_zero() {
        // Group C is registered but has no leaves: total stays 0 and the
        // degenerate ratio normalizes to 0.
        let mut tree = aab_tree();
        tree.groups.push("C".to_string());
        assert_eq!(partition_ratio(&tree, &names(&["C"])), 0.0);
    }

    #[test]
    fn sentinel_branch_never_contributes() {
        let mut tree = aab_tree();

        // Give the topmost node (counts A:2, B:1) a defined length: it now
        // joins the total.
        tree.nodes[5].branch_length = 0.2;
        assert!((partition_ratio(&tree, &names(&["A", "B"])) - 0.5).abs() < 1e-12);

        // Back to the sentinel: excluded again despite its counts.
        tree.nodes[5].branch_length = NO_BRANCH_LENGTH;
        assert!((partition_ratio(&tree, &names(&["A", "B"])) - 0.625).abs() < 1e-12);
    }

    #[test]
    fn two_groups_fill_only_the_pair_slot() {
        let tree = aab_tree();
        let scores = unweighted_unifrac(&tree, &names(&["A", "B"])).unwrap();

        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 0.625).abs() < 1e-12);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn three_groups_enumerate_pairs_in_selection_order() {
        let tree = mingled_tree();
        let scores = unweighted_unifrac(&tree, &names(&["A", "B", "C"])).unwrap();

        assert_eq!(scores.len(), 4);
        assert!((scores[0] - 0.875).abs() < 1e-12); // (A,B)
        assert!((scores[1] - 0.75).abs() < 1e-12); // (A,C)
        assert!((scores[2] - 0.5).abs() < 1e-12); // (B,C)
        assert!((scores[3] - 1.5 / 8.5).abs() < 1e-12); // {A,B,C}
    }

    #[test]
    fn labels_track_slots() {
        let tree = mingled_tree();
        let labels = combination_labels(&tree, &names(&["A", "B", "C"]));
        assert_eq!(labels, vec!["A-B", "A-C", "B-C", "A-B-C"]);

        let labels = combination_labels(&tree, &[]);
        assert_eq!(labels, vec!["A-B-C"]);
    }

    #[test]
    fn empty_selection_scores_registered_set() {
        let tree = mingled_tree();
        let scores = unweighted_unifrac(&tree, &[]).unwrap();

        assert_eq!(scores.len(), 1);
        assert!((scores[0] - 1.5 / 8.5).abs() < 1e-12);
    }

    #[test]
    fn empty_selection_skips_placeholder_group() {
        let map: HashMap<String, String> = [("A1", "A"), ("A2", "A"), ("B1", "B")]
            .iter()
            .map(|(leaf, group)| (leaf.to_string(), group.to_string()))
            .collect();
        let tree =
            CommunityTree::from_newick("((A1:0.5,A2:0.5):0.3,(B1:0.4,B2:0.4):0.6);", &map).unwrap();

        let scores = unweighted_unifrac(&tree, &[]).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0], partition_ratio(&tree, &names(&["A", "B"])));
    }

    #[test]
    fn all_scores_stay_in_unit_interval() {
        let tree = mingled_tree();
        let groups = names(&["A", "B", "C"]);
        for pair in groups.iter().combinations(2) {
            let set: Vec<String> = pair.into_iter().cloned().collect();
            let ratio = partition_ratio(&tree, &set);
            assert!((0.0..=1.0).contains(&ratio));
        }
    }

    #[test]
    fn randomized_draws_vary_and_stay_bounded() {
        let tree = mingled_tree();
        let groups = names(&["A", "B", "C"]);
        let cancel = AtomicBool::new(false);

        let mut seen = std::collections::HashSet::new();
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let scores =
                unweighted_unifrac_randomized(&tree, &groups, &mut rng, &cancel).unwrap();
            assert_eq!(scores.len(), 4);
            for &score in &scores {
                assert!((0.0..=1.0).contains(&score));
            }
            seen.insert(scores[0].to_bits());
        }

        // Relabeling must actually move scores around, not echo one value.
        assert!(seen.len() > 1);
    }

    #[test]
    fn randomized_draws_are_reproducible_per_seed() {
        let tree = mingled_tree();
        let groups = names(&["A", "B", "C"]);
        let cancel = AtomicBool::new(false);

        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);
        let a = unweighted_unifrac_randomized(&tree, &groups, &mut first, &cancel).unwrap();
        let b = unweighted_unifrac_randomized(&tree, &groups, &mut second, &cancel).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cancelled_run_returns_partial_output() {
        let tree = mingled_tree();
        let groups = names(&["A", "B", "C"]);
        let cancel = AtomicBool::new(true);
        let mut rng = StdRng::seed_from_u64(0);

        let scores = unweighted_unifrac_randomized(&tree, &groups, &mut rng, &cancel).unwrap();
        assert_eq!(scores, vec![0.0; 4]);
    }

    #[test]
    fn selected_group_must_exist() {
        let tree = aab_tree();
        let result = unweighted_unifrac(&tree, &names(&["A", "Z"]));
        assert!(matches!(result, Err(TreeFracError::GroupNotFound { .. })));
    }

    #[test]
    fn malformed_annotation_is_an_error() {
        let mut tree = aab_tree();
        tree.nodes[3].branch_length = -0.5;
        let result = unweighted_unifrac(&tree, &names(&["A", "B"]));
        assert!(matches!(
            result,
            Err(TreeFracError::NegativeBranchLength { .. })
        ));
    }
}
