use clap::{Args, Parser, Subcommand, ValueEnum};
use phylonet_rspr::config::{EmbeddingConfig, GraphConfig, PairwiseConfig, ScaleGuidance, SearchBudget};
use phylonet_rspr::embedding::{EmbeddingCache, parse_leaf_list};
use phylonet_rspr::error::PhyloError;
use phylonet_rspr::external::ExternalRspr;
use phylonet_rspr::graph::{build_graph, induced_graph, pairwise_distances};
use phylonet_rspr::io::{read_network, read_tree_list, valid_trees, write_lines, write_matrix_tsv, write_text};
use phylonet_rspr::oracle::RsprOracle;
use phylonet_rspr::report::{ResultSet, matrix_cells};
use phylonet_rspr::spr::SprNeighborhood;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Displayed trees of phylogenetic networks and rSPR distances / graphs of trees.
#[derive(Parser, Debug)]
#[command(name = "phylonet-rspr", version, about = "Network embeddings and rSPR distances for phylogenetic trees")]
struct Cli {
    /// Quiet mode: only warnings and errors are logged (RUST_LOG overrides)
    #[arg(short = 'q', long = "quiet", default_value_t = false, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate the trees displayed by a network
    Embed(EmbedArgs),
    /// Pairwise rSPR distance matrix of a tree list
    Drspr(DrsprArgs),
    /// rSPR graph of a tree list
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
struct Outputs {
    /// Text report path (`-` for stdout)
    #[arg(short = 'r', long = "report", default_value = "-")]
    report: PathBuf,

    /// JSON export path
    #[arg(long = "json")]
    json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EmbedArgs {
    /// Extended Newick file holding exactly one network (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Comma separated leaf subset to restrict displayed trees to
    #[arg(short = 'l', long = "leaves")]
    leaves: Option<String>,

    /// Ceiling on reticulation-choice combinations
    #[arg(long = "max-combinations")]
    max_combinations: Option<u128>,

    /// Apply the stricter ceiling used when every tree will be rendered
    #[arg(long = "rendering", default_value_t = false)]
    rendering: bool,

    /// Newick export of distinct trees with counts (`.gz` compresses)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    #[command(flatten)]
    outputs: Outputs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OracleArg {
    Native,
    External,
}

#[derive(Args, Debug)]
struct OracleArgs {
    /// rSPR oracle: in-process search or the external `rspr` executable
    #[arg(long = "oracle", value_enum, default_value_t = OracleArg::Native)]
    oracle: OracleArg,

    /// Path of the `rspr` executable for `--oracle external`
    #[arg(long = "rspr-path", default_value = "rspr")]
    rspr_path: PathBuf,

    /// Per-call time budget in seconds (0 disables)
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,

    /// Distinct trees the native distance search may hold
    #[arg(long = "max-states", default_value_t = SearchBudget::default().max_states)]
    max_states: usize,

    /// Run oracle calls sequentially
    #[arg(long = "sequential", default_value_t = false)]
    sequential: bool,
}

impl OracleArgs {
    fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    fn build(&self) -> Box<dyn RsprOracle> {
        match self.oracle {
            OracleArg::Native => Box::new(SprNeighborhood::new(SearchBudget {
                max_states: self.max_states,
                timeout: self.timeout(),
            })),
            OracleArg::External => {
                Box::new(ExternalRspr::new(&self.rspr_path).with_timeout(self.timeout()))
            }
        }
    }
}

#[derive(Args, Debug)]
struct DrsprArgs {
    /// File of `;`-terminated Newick trees (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path for the TSV distance matrix (`.gz` compresses)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Also report maximum agreement forests (external oracle only)
    #[arg(long = "forests", default_value_t = false)]
    forests: bool,

    #[command(flatten)]
    oracle: OracleArgs,

    #[command(flatten)]
    outputs: Outputs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum GraphMode {
    /// Breadth-first expansion of rSPR neighborhoods from the input trees
    Expand,
    /// Input trees only, joined when one move apart
    Induced,
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// File of `;`-terminated Newick trees (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    #[arg(long = "mode", value_enum, default_value_t = GraphMode::Induced)]
    mode: GraphMode,

    /// Bound on distinct trees held by an expanded graph
    #[arg(long = "max-nodes", default_value_t = GraphConfig::default().max_nodes)]
    max_nodes: usize,

    #[command(flatten)]
    oracle: OracleArgs,

    #[command(flatten)]
    outputs: Outputs,
}

/// Failure of one CLI run, carrying its exit code.
enum Failure {
    Input(String),
    Compute(String),
    Output(String),
}

impl Failure {
    fn code(&self) -> i32 {
        match self {
            Failure::Input(_) => 2,
            Failure::Compute(_) => 3,
            Failure::Output(_) => 4,
        }
    }

    fn message(&self) -> &str {
        match self {
            Failure::Input(m) | Failure::Compute(m) | Failure::Output(m) => m,
        }
    }
}

fn input_failure(path: &Path, e: PhyloError) -> Failure {
    Failure::Input(format!("Failed to read {:?}: {e}", path))
}

fn compute_failure(e: PhyloError) -> Failure {
    Failure::Compute(e.to_string())
}

fn output_failure(path: &Path, e: std::io::Error) -> Failure {
    Failure::Output(format!("Failed to write output {:?}: {e}", path))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let outcome = match &cli.command {
        Command::Embed(args) => run_embed(args),
        Command::Drspr(args) => run_drspr(args),
        Command::Graph(args) => run_graph(args),
    };
    if let Err(failure) = outcome {
        eprintln!("{}", failure.message());
        std::process::exit(failure.code());
    }
}

fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_embed(args: &EmbedArgs) -> Result<(), Failure> {
    let t0 = Instant::now();
    let (newick, network) = read_network(&args.input).map_err(|e| input_failure(&args.input, e))?;
    info!(
        "Reading network {:.3}s: {} reticulations, {} leaves",
        t0.elapsed().as_secs_f64(),
        network.num_reticulations(),
        network.leaf_labels().len()
    );
    if network.num_reticulations() > ScaleGuidance::HEADLESS_RETICULATIONS
        || network.leaf_labels().len() > ScaleGuidance::HEADLESS_LEAVES
    {
        warn!("network is beyond the sizes enumeration is known to handle comfortably");
    }

    let mut config = if args.rendering {
        EmbeddingConfig::for_rendering()
    } else {
        EmbeddingConfig::default()
    };
    if let Some(max) = args.max_combinations {
        config = config.with_max_combinations(max);
    }

    let leaves = args.leaves.as_deref().map(parse_leaf_list);
    let t1 = Instant::now();
    let mut cache = EmbeddingCache::new(network, config);
    let summary = cache.summary();
    let multiset = cache.process(leaves.as_deref()).map_err(|e| match e {
        PhyloError::InvalidLeafSubset(_) => Failure::Input(e.to_string()),
        other => compute_failure(other),
    })?;
    info!(
        "Enumerating displayed trees {:.3}s: {} distinct of {}",
        t1.elapsed().as_secs_f64(),
        multiset.len(),
        multiset.combinations()
    );

    let result = ResultSet::new()
        .with_network(newick, summary)
        .with_multiset(multiset);
    if let Some(path) = &args.output {
        write_lines(path, &result.newick_lines()).map_err(|e| output_failure(path, e))?;
    }
    write_outputs(&result, &args.outputs)
}

fn run_drspr(args: &DrsprArgs) -> Result<(), Failure> {
    let t0 = Instant::now();
    let records = read_tree_list(&args.input).map_err(|e| input_failure(&args.input, e))?;
    let trees = valid_trees(&records, 2).map_err(|e| input_failure(&args.input, e))?;
    info!(
        "Reading trees {:.3}s: {} of {} well formed",
        t0.elapsed().as_secs_f64(),
        trees.len(),
        records.len()
    );

    let oracle = args.oracle.build();
    let config = PairwiseConfig {
        parallel: !args.oracle.sequential,
        forests: args.forests,
        cancel: None,
    };
    let t1 = Instant::now();
    let matrix = pairwise_distances(&trees, &oracle, &config).map_err(compute_failure)?;
    info!(
        "Determining rSPR distances {:.3}s for {} combinations",
        t1.elapsed().as_secs_f64(),
        matrix.pair_count()
    );
    if let Err(e) = matrix.completion() {
        warn!("{e}");
    }

    if let Some(path) = &args.output {
        let t2 = Instant::now();
        write_matrix_tsv(path, matrix.names(), &matrix_cells(&matrix))
            .map_err(|e| output_failure(path, e))?;
        info!("Writing matrix {:.3}s", t2.elapsed().as_secs_f64());
    }

    let result = ResultSet::new().with_inputs(records).with_matrix(matrix);
    write_outputs(&result, &args.outputs)
}

fn run_graph(args: &GraphArgs) -> Result<(), Failure> {
    let t0 = Instant::now();
    let records = read_tree_list(&args.input).map_err(|e| input_failure(&args.input, e))?;
    let required = match args.mode {
        GraphMode::Expand => 1,
        GraphMode::Induced => 2,
    };
    let trees = valid_trees(&records, required).map_err(|e| input_failure(&args.input, e))?;
    info!(
        "Reading trees {:.3}s: {} of {} well formed",
        t0.elapsed().as_secs_f64(),
        trees.len(),
        records.len()
    );

    let oracle = args.oracle.build();
    let config = GraphConfig {
        parallel: !args.oracle.sequential,
        ..GraphConfig::default()
    }
    .with_max_nodes(args.max_nodes);
    let t1 = Instant::now();
    let graph = match args.mode {
        GraphMode::Expand => build_graph(&trees, &oracle, &config),
        GraphMode::Induced => induced_graph(&trees, &oracle, &config),
    }
    .map_err(compute_failure)?;
    info!(
        "Building rSPR graph {:.3}s: {} trees, {} moves",
        t1.elapsed().as_secs_f64(),
        graph.len(),
        graph.edge_count()
    );
    if let Err(e) = graph.completion() {
        warn!("{e}");
    }

    let result = ResultSet::new().with_inputs(records).with_graph(graph);
    write_outputs(&result, &args.outputs)
}

fn write_outputs(result: &ResultSet, outputs: &Outputs) -> Result<(), Failure> {
    let t0 = Instant::now();
    write_text(&outputs.report, &result.text()).map_err(|e| output_failure(&outputs.report, e))?;
    if let Some(path) = &outputs.json {
        let json = result
            .to_json()
            .map_err(|e| Failure::Output(format!("Failed to serialise report: {e}")))?;
        write_text(path, &json).map_err(|e| output_failure(path, e))?;
    }
    let target = if outputs.report.as_os_str() == "-" { "stdout" } else { "output" };
    info!("Writing to {target} {:.3}s", t0.elapsed().as_secs_f64());
    Ok(())
}
