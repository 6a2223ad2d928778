//! File ingestion and score output.
//!
//! Trees arrive as Newick text (one tree per line, `#` comments allowed,
//! optionally gzip-compressed); group assignments as two-column
//! `name<TAB>group` files. Scores leave as labeled TSV tables, gzipped
//! when the output path ends in `.gz`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree;

use crate::error::TreeFracError;

fn open_reader(path: &Path) -> Result<Box<dyn Read>, TreeFracError> {
    let file = File::open(path)?;
    if path.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Read every Newick tree from a file, one per line.
///
/// Blank lines and lines starting with `#` are skipped. A `.gz` suffix
/// selects gzip decompression.
pub fn read_newick_trees<P: AsRef<Path>>(path: P) -> Result<Vec<Tree>, TreeFracError> {
    let reader = BufReader::new(open_reader(path.as_ref())?);
    let mut trees = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let newick = line.trim();
        if newick.is_empty() || newick.starts_with('#') {
            continue;
        }
        trees.push(Tree::from_newick(newick)?);
    }
    if trees.is_empty() {
        return Err(TreeFracError::NoTrees);
    }
    Ok(trees)
}

/// Read a leaf→group assignment file: one `name<TAB>group` pair per line
/// (any whitespace separator accepted), `#` comments and blank lines
/// skipped.
pub fn read_group_map<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>, TreeFracError> {
    let reader = BufReader::new(open_reader(path.as_ref())?);
    let mut assignments = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let mut fields = text.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(name), Some(group), None) => {
                assignments.insert(name.to_string(), group.to_string());
            }
            _ => {
                return Err(TreeFracError::GroupFileParse {
                    line: idx + 1,
                    text: text.to_string(),
                });
            }
        }
    }
    Ok(assignments)
}

/// One output row: which tree, which group combination, the observed
/// score, and (when a permutation test ran) the fraction of null draws at
/// or above it.
#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub tree: usize,
    pub comparison: String,
    pub score: f64,
    pub significance: Option<f64>,
}

/// Write score rows as TSV to a file.
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_score_table<P: AsRef<Path>>(path: P, rows: &[ScoreRow]) -> io::Result<()> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "writing to stdout is not supported by write_score_table",
        ));
    }

    let is_gz = p.to_string_lossy().ends_with(".gz");
    let mut out: Box<dyn Write> = if is_gz {
        let f = File::create(p)?;
        let enc = GzEncoder::new(f, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    let with_significance = rows.first().is_some_and(|r| r.significance.is_some());
    if with_significance {
        writeln!(&mut out, "tree\tcomparison\tscore\tfraction_ge_observed")?;
    } else {
        writeln!(&mut out, "tree\tcomparison\tscore")?;
    }

    for row in rows {
        match row.significance {
            Some(sig) => writeln!(
                &mut out,
                "{}\t{}\t{}\t{}",
                row.tree, row.comparison, row.score, sig
            )?,
            None => writeln!(&mut out, "{}\t{}\t{}", row.tree, row.comparison, row.score)?,
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_newick_lines_and_skips_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# two trivial trees").unwrap();
        writeln!(file, "(A:1,B:2);").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "((A:1,B:1):1,C:2);").unwrap();

        let trees = read_newick_trees(file.path()).unwrap();
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn empty_tree_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();
        assert!(matches!(
            read_newick_trees(file.path()),
            Err(TreeFracError::NoTrees)
        ));
    }

    #[test]
    fn parses_group_map() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# leaf\tgroup").unwrap();
        writeln!(file, "A1\tforest").unwrap();
        writeln!(file, "A2\tforest").unwrap();
        writeln!(file, "B1\tpasture").unwrap();

        let map = read_group_map(file.path()).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("A1").map(String::as_str), Some("forest"));
        assert_eq!(map.get("B1").map(String::as_str), Some("pasture"));
    }

    #[test]
    fn rejects_malformed_group_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "A1\tforest").unwrap();
        writeln!(file, "B1 pasture extra").unwrap();

        assert!(matches!(
            read_group_map(file.path()),
            Err(TreeFracError::GroupFileParse { line: 2, .. })
        ));
    }

    #[test]
    fn writes_score_table_with_and_without_significance() {
        let rows = vec![
            ScoreRow {
                tree: 0,
                comparison: "A-B".to_string(),
                score: 0.625,
                significance: None,
            },
            ScoreRow {
                tree: 0,
                comparison: "A-B-C".to_string(),
                score: 0.25,
                significance: None,
            },
        ];
        let file = NamedTempFile::new().unwrap();
        write_score_table(file.path(), &rows).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("tree\tcomparison\tscore\n"));
        assert!(text.contains("0\tA-B\t0.625\n"));

        let rows: Vec<ScoreRow> = rows
            .into_iter()
            .map(|r| ScoreRow {
                significance: Some(0.04),
                ..r
            })
            .collect();
        let file = NamedTempFile::new().unwrap();
        write_score_table(file.path(), &rows).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("tree\tcomparison\tscore\tfraction_ge_observed\n"));
        assert!(text.contains("0\tA-B\t0.625\t0.04\n"));
    }

    #[test]
    fn refuses_stdout_path() {
        assert!(write_score_table("-", &[]).is_err());
    }
}
