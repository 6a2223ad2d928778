//! Permutation null model for UniFrac scores.
//!
//! An observed UniFrac score on its own says nothing about chance: a null
//! distribution is built by rescoring the tree under random leaf
//! relabelings and asking how often chance alone reaches the observed
//! value. Draws are independent, so they run in parallel; each draw owns a
//! seeded RNG stream, which keeps fixed-seed runs reproducible regardless
//! of scheduling.

use crate::community::CommunityTree;
use crate::error::TreeFracError;
use crate::unifrac::unweighted_unifrac_randomized;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Draw `iters` independent randomized score vectors.
///
/// Draw `i` runs on `StdRng::seed_from_u64(seed + i)`. Draws execute in
/// parallel; the engine call inside each draw stays single-threaded.
/// Cancellation drops not-yet-started draws, so a cancelled run returns
/// the subset collected so far.
pub fn null_distribution(
    tree: &CommunityTree,
    selected: &[String],
    iters: usize,
    seed: u64,
    cancel: &AtomicBool,
) -> Result<Vec<Vec<f64>>, TreeFracError> {
    let draws = (0..iters)
        .into_par_iter()
        .filter_map(|i| {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            Some(unweighted_unifrac_randomized(tree, selected, &mut rng, cancel))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

/// Per-slot fraction of null draws at or above the observed score, i.e.
/// the one-sided permutation significance. Slots absent from a draw (possible
/// only on cancelled partial draws) count as below. Returns zeros when the
/// null set is empty.
pub fn score_significance(observed: &[f64], null: &[Vec<f64>]) -> Vec<f64> {
    if null.is_empty() {
        return vec![0.0; observed.len()];
    }
    observed
        .iter()
        .enumerate()
        .map(|(slot, &score)| {
            let hits = null
                .iter()
                .filter(|draw| draw.get(slot).is_some_and(|&d| d >= score))
                .count();
            hits as f64 / null.len() as f64
        })
        .collect()
}
