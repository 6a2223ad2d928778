use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use treefrac::community::CommunityTree;
use treefrac::io::{ScoreRow, read_group_map, read_newick_trees, write_score_table};
use treefrac::null::{null_distribution, score_significance};
use treefrac::unifrac::{combination_labels, unweighted_unifrac};

/// Compute unweighted UniFrac scores for group-annotated Newick trees and
/// write a labeled score table (TSV). With `--iters` a label-permutation
/// null model is run and the fraction of null draws reaching each observed
/// score is reported alongside it.
#[derive(Parser, Debug)]
#[command(name = "treefrac", version, about = "Unweighted UniFrac scores for Newick trees")]
struct Args {
    /// Path to a Newick tree file (one tree per line, .gz supported)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Path to a leaf-to-group assignment file (name<TAB>group per line)
    #[arg(short = 'm', long = "groups")]
    groups: PathBuf,

    /// Groups to compare (comma-separated). Empty = score all groups jointly
    #[arg(short = 'g', long = "group", value_delimiter = ',')]
    selected: Vec<String>,

    /// Permutation iterations for the null model (0 = observed scores only)
    #[arg(short = 'n', long = "iters", default_value_t = 0)]
    iters: usize,

    /// Base seed for the permutation draws
    #[arg(short = 's', long = "seed", default_value_t = 0)]
    seed: u64,

    /// Output path for the TSV score table
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Quiet mode: suppresses progress messages on stdout
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    // Read assignments and trees
    let t0 = Instant::now();
    let assignments = match read_group_map(&args.groups) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Failed to read group file {:?}: {e}", args.groups);
            std::process::exit(2);
        }
    };
    let trees = match read_newick_trees(&args.input) {
        Ok(trees) => trees,
        Err(e) => {
            eprintln!("Failed to read trees from {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    let read_s = t0.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Reading input {read_s:.3}s"));
    log_if(
        !args.quiet,
        format!(
            "Read {} leaf assignments for {} tree(s)",
            assignments.len(),
            trees.len()
        ),
    );

    // Score each tree, with the permutation test when requested
    let t1 = Instant::now();
    let cancel = AtomicBool::new(false);
    let mut rows = Vec::new();
    for (idx, tree) in trees.iter().enumerate() {
        let community = match CommunityTree::from_tree(tree, &assignments) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to annotate tree {idx}: {e}");
                std::process::exit(3);
            }
        };
        let scores = match unweighted_unifrac(&community, &args.selected) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to score tree {idx}: {e}");
                std::process::exit(3);
            }
        };
        let significance = if args.iters > 0 {
            let null = match null_distribution(
                &community,
                &args.selected,
                args.iters,
                args.seed,
                &cancel,
            ) {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("Permutation test failed on tree {idx}: {e}");
                    std::process::exit(3);
                }
            };
            Some(score_significance(&scores, &null))
        } else {
            None
        };

        let labels = combination_labels(&community, &args.selected);
        for (slot, (label, score)) in labels.into_iter().zip(scores).enumerate() {
            rows.push(ScoreRow {
                tree: idx,
                comparison: label,
                score,
                significance: significance.as_ref().map(|sig| sig[slot]),
            });
        }
    }
    let comp_s = t1.elapsed().as_secs_f64();
    if args.iters > 0 {
        log_if(
            !args.quiet,
            format!(
                "Scored {} tree(s) with {} permutation(s) each {comp_s:.3}s",
                trees.len(),
                args.iters
            ),
        );
    } else {
        log_if(!args.quiet, format!("Scored {} tree(s) {comp_s:.3}s", trees.len()));
    }

    // Write the table
    let t2 = Instant::now();
    if let Err(e) = write_score_table(&args.output, &rows) {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let write_s = t2.elapsed().as_secs_f64();
    log_if(!args.quiet, format!("Writing to output {write_s:.3}s"));
}

fn log_if(show: bool, msg: String) {
    if show {
        println!("{}", msg);
    }
}
