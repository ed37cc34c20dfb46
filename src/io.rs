use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{FormatError, PhyloError, Result};
use crate::model::{NamedTree, Network, Tree};
use crate::newick::split_statements;

/// One `;`-terminated statement of a tree file, named by its position.
#[derive(Debug, Clone)]
pub struct TreeRecord {
    /// `t1`, `t2`, ... in input order.
    pub name: String,
    pub text: String,
    pub tree: std::result::Result<Tree, FormatError>,
}

impl TreeRecord {
    pub fn is_valid(&self) -> bool {
        self.tree.is_ok()
    }
}

/// Read a whole input file, or stdin when `path` is `-`.
pub fn read_input<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    fs::read_to_string(p)
}

/// Split a tree list on `;` and parse every statement.
///
/// Malformed trees keep their slot (and name) so they can be reported.
pub fn parse_tree_list(text: &str) -> Vec<TreeRecord> {
    split_statements(text)
        .into_iter()
        .filter(|statement| !statement.is_empty())
        .enumerate()
        .map(|(k, statement)| TreeRecord {
            name: format!("t{}", k + 1),
            tree: Tree::from_newick(&statement),
            text: statement,
        })
        .collect()
}

pub fn read_tree_list<P: AsRef<Path>>(path: P) -> Result<Vec<TreeRecord>> {
    Ok(parse_tree_list(&read_input(path)?))
}

/// Well-formed trees of a list; at least `required` of them must exist.
pub fn valid_trees(records: &[TreeRecord], required: usize) -> Result<Vec<NamedTree>> {
    let trees: Vec<NamedTree> = records
        .iter()
        .filter_map(|record| {
            let tree = record.tree.as_ref().ok()?;
            Some(NamedTree::new(record.name.clone(), tree.clone()))
        })
        .collect();
    if trees.len() < required {
        return Err(PhyloError::InsufficientTrees {
            found: trees.len(),
            required,
        });
    }
    Ok(trees)
}

/// Parse text holding exactly one network statement.
pub fn parse_network(text: &str) -> std::result::Result<Network, FormatError> {
    let statements: Vec<String> = split_statements(text)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    match statements.as_slice() {
        [] => Err(FormatError::EmptyInput),
        [single] => Network::from_newick(single),
        many => Err(FormatError::NetworkCount(many.len())),
    }
}

/// Read one network; returns the statement text alongside the parsed network.
pub fn read_network<P: AsRef<Path>>(path: P) -> Result<(String, Network)> {
    let text = read_input(path)?;
    let network = parse_network(&text)?;
    Ok((text.trim().to_string(), network))
}

/// Open `path` for writing: stdout for `-`, gzip-compressed when it ends with `.gz`.
pub fn open_output<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }

    let is_gz = p.to_string_lossy().ends_with(".gz");
    let out: Box<dyn Write> = if is_gz {
        let f = File::create(p)?;
        let enc = GzEncoder::new(f, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };
    Ok(out)
}

/// Write a labeled square matrix as TSV.
/// If `path` ends with `.gz`, the output is gzip-compressed; `-` writes to stdout.
pub fn write_matrix_tsv<P: AsRef<Path>, T: Display>(
    path: P,
    names: &[String],
    mat: &[Vec<T>],
) -> io::Result<()> {
    let mut out = open_output(path)?;
    write_matrix(&mut out, names, mat)?;
    out.flush()
}

fn write_matrix<W: Write, T: Display>(out: &mut W, names: &[String], mat: &[Vec<T>]) -> io::Result<()> {
    // Header row
    write!(out, "\t")?;
    for (k, name) in names.iter().enumerate() {
        if k > 0 {
            write!(out, "\t")?;
        }
        write!(out, "{}", name)?;
    }
    writeln!(out)?;

    // Rows
    for (i, row) in mat.iter().enumerate() {
        write!(out, "{}", names[i])?;
        for val in row {
            write!(out, "\t{}", val)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// One line per item, e.g. the Newick export of a tree multiset.
pub fn write_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, lines: &[S]) -> io::Result<()> {
    let mut out = open_output(path)?;
    for line in lines {
        writeln!(out, "{}", line.as_ref())?;
    }
    out.flush()
}

pub fn write_text<P: AsRef<Path>>(path: P, text: &str) -> io::Result<()> {
    let mut out = open_output(path)?;
    out.write_all(text.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("phylonet-rspr-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_tree_list_names_and_errors() {
        let records = parse_tree_list("((a,b),c);\n((a,b),c;\n(a,(b,c));\n");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "t1");
        assert!(records[0].is_valid());
        assert!(!records[1].is_valid());
        assert_eq!(records[2].name, "t3");

        let trees = valid_trees(&records, 2).unwrap();
        assert_eq!(
            trees.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t3"]
        );
    }

    #[test]
    fn test_tree_list_missing_final_semicolon() {
        let records = parse_tree_list("((a,b),c);\n(a,(b,c))");
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].tree.as_ref().unwrap_err(),
            &FormatError::MissingSemicolon
        );
    }

    #[test]
    fn test_valid_trees_requires_enough() {
        let records = parse_tree_list("((a,b),c);\n(((;");
        assert!(matches!(
            valid_trees(&records, 2),
            Err(PhyloError::InsufficientTrees {
                found: 1,
                required: 2
            })
        ));
    }

    #[test]
    fn test_parse_network_counts_statements() {
        assert!(parse_network("((a,(b)#H1),(#H1,c));\n").is_ok());
        assert_eq!(
            parse_network("(a,b);(c,d);").unwrap_err(),
            FormatError::NetworkCount(2)
        );
        assert_eq!(parse_network("  \n").unwrap_err(), FormatError::EmptyInput);
    }

    #[test]
    fn test_write_matrix_tsv_plain_and_gzip() {
        let names = vec!["t1".to_string(), "t2".to_string()];
        let mat = vec![vec!["0", "1"], vec!["1", "0"]];
        let expected = "\tt1\tt2\nt1\t0\t1\nt2\t1\t0\n";

        let plain = temp_path("matrix.tsv");
        write_matrix_tsv(&plain, &names, &mat).unwrap();
        assert_eq!(fs::read_to_string(&plain).unwrap(), expected);

        let gz = temp_path("matrix.tsv.gz");
        write_matrix_tsv(&gz, &names, &mat).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(File::open(&gz).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, expected);

        let _ = fs::remove_file(plain);
        let _ = fs::remove_file(gz);
    }

    #[test]
    fn test_read_files() {
        let trees = temp_path("trees.nwk");
        fs::write(&trees, "((a,b),c);\n((a,c),b);\n").unwrap();
        let records = read_tree_list(&trees).unwrap();
        assert_eq!(records.len(), 2);

        let net = temp_path("network.nwk");
        fs::write(&net, "((a,(b)#H1),(#H1,c));\n").unwrap();
        let (text, network) = read_network(&net).unwrap();
        assert_eq!(text, "((a,(b)#H1),(#H1,c));");
        assert_eq!(network.num_reticulations(), 1);

        let _ = fs::remove_file(trees);
        let _ = fs::remove_file(net);
    }
}
