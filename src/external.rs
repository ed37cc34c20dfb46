//! Subprocess oracle around the `rspr` executable (https://github.com/cwhidden/rspr).
//!
//! The two trees are written to the child's stdin, one Newick string per
//! line. The distance is read from the last output line (`... drSPR=N`) and
//! the agreement forest from the third line from the end, whose first two
//! fields are a header. Neighborhoods are not something `rspr` produces, so
//! they come from the native [`SprNeighborhood`].

use crate::error::OracleError;
use crate::model::Tree;
use crate::oracle::{Comparison, RsprOracle, require_same_taxa};
use crate::spr::SprNeighborhood;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parsed result of one `rspr` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsprOutput {
    pub distance: u32,
    pub forest: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExternalRspr {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for ExternalRspr {
    fn default() -> Self {
        Self::new("rspr")
    }
}

impl ExternalRspr {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Some(Duration::from_secs(60)),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the executable on one pair of trees.
    pub fn run(&self, a: &Tree, b: &Tree) -> Result<RsprOutput, OracleError> {
        require_same_taxa(a, b)?;
        let unavailable =
            |e: std::io::Error| OracleError::Unavailable(format!("{}: {e}", self.program.display()));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(unavailable)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{}\n{}\n", a.to_newick(), b.to_newick());
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(unavailable(e));
            }
        }

        let started = Instant::now();
        let status = loop {
            match child.try_wait().map_err(unavailable)? {
                Some(status) => break status,
                None if self.timeout.is_some_and(|limit| started.elapsed() > limit) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(program = %self.program.display(), "rspr timed out, killed");
                    return Err(OracleError::Timeout(started.elapsed()));
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let out = out_reader.join().unwrap_or_default();
        let err = err_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(OracleError::Unavailable(format!(
                "{} exited with {status}: {}",
                self.program.display(),
                err.trim()
            )));
        }
        if !err.trim().is_empty() {
            warn!(stderr = err.trim(), "rspr reported errors");
        }
        debug!(elapsed = ?started.elapsed(), "rspr finished");
        parse_output(&out)
    }
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut text = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut text);
    }
    text
}

/// Extract the distance and agreement forest from `rspr` stdout.
pub fn parse_output(stdout: &str) -> Result<RsprOutput, OracleError> {
    let lines: Vec<&str> = stdout.trim().lines().collect();
    let malformed = || OracleError::Unavailable(format!("unrecognised rspr output: {stdout:?}"));

    let last = lines.last().ok_or_else(malformed)?;
    let field = last.split_whitespace().last().ok_or_else(malformed)?;
    let (_, value) = field.split_once('=').ok_or_else(malformed)?;
    let distance = value.parse::<u32>().map_err(|_| malformed())?;

    let forest = match lines.len().checked_sub(3) {
        Some(k) => lines[k]
            .split_whitespace()
            .skip(2)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };
    Ok(RsprOutput { distance, forest })
}

impl RsprOracle for ExternalRspr {
    fn distance(&self, a: &Tree, b: &Tree) -> Result<u32, OracleError> {
        if a.canonical_form() == b.canonical_form() {
            return Ok(0);
        }
        self.run(a, b).map(|out| out.distance)
    }

    fn neighbors(&self, tree: &Tree) -> Result<Vec<Tree>, OracleError> {
        Ok(SprNeighborhood::neighborhood(tree))
    }

    fn compare(&self, a: &Tree, b: &Tree) -> Result<Comparison, OracleError> {
        if a.canonical_form() == b.canonical_form() {
            return Ok(Comparison {
                distance: 0,
                forest: None,
            });
        }
        self.run(a, b).map(|out| Comparison {
            distance: out.distance,
            forest: Some(out.forest),
        })
    }
}
