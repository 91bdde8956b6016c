//! moltrans CLI entry point
//!
//! ```
//! moltrans cluster --data ensemble.csv --out results/ --threshold 1.5
//! moltrans render clusters --data clustered.csv --out results/
//! ```
//!
//! Every command reads the dataset and configuration fresh, computes its
//! result in memory and only then publishes files into `--out`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use moltrans_core::{
    append_charge_transfer_columns, cluster_statistics, read_parameters,
    synthesize_transfer_function, ColoredDendrogram, DataFrame, DistanceMetric, Linkage,
    TransitionError,
};
use moltrans_report::{
    config::PipelineConfig,
    find_renderer,
    outputs::{publish_csv, publish_json, write_atomic},
    pipeline::{
        cluster_dataset, cluster_transition_request, dendrogram_request, feature_vector_table,
        member_transition_request, publish_submission, submit_render_job, RenderRequest,
    },
    OutputContract, RenderOutcome, RendererProcess,
};

/// Hierarchical clustering and diagram rendering for electronic transitions
#[derive(Parser, Debug)]
#[command(name = "moltrans")]
#[command(version)]
#[command(about = "Cluster electronic transitions and render their diagrams", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML); defaults apply when omitted
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the selected feature columns as their own table
    Select(DataArgs),

    /// Cluster the feature vectors and write labels, colors and transfer function
    Cluster(ClusterArgs),

    /// Rebuild the transfer function from a saved dendrogram.json
    TransferFunction(TransferFunctionArgs),

    /// Submit a render job to the external renderer
    #[command(subcommand)]
    Render(RenderCommand),

    /// Append charge difference and charge transfer columns
    ChargeTransfer(DataArgs),

    /// Per-cluster hole/particle charge statistics
    Stats(StatsArgs),

    /// Convert an excited-state parameter file to CSV
    Params(ParamsArgs),

    /// Check the renderer installation
    Check,

    /// Show version info
    Version,
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Input dataset (CSV with a header row)
    #[arg(long, short = 'd')]
    data: PathBuf,

    /// Output directory
    #[arg(long, short = 'o')]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ClusterArgs {
    #[command(flatten)]
    io: DataArgs,

    /// Cut threshold (overrides config)
    #[arg(long)]
    threshold: Option<f64>,

    /// Linkage: single, complete, average or ward (overrides config)
    #[arg(long)]
    linkage: Option<Linkage>,

    /// Metric: euclidean, l1, l2, manhattan or cosine (overrides config)
    #[arg(long)]
    metric: Option<DistanceMetric>,

    /// Cluster index painted with the accent color
    #[arg(long)]
    highlight: Option<usize>,
}

#[derive(Args, Debug)]
struct TransferFunctionArgs {
    /// dendrogram.json written by `moltrans cluster`
    #[arg(long)]
    colors: PathBuf,

    /// Cluster index painted with the accent color
    #[arg(long)]
    highlight: Option<usize>,

    /// Output directory
    #[arg(long, short = 'o')]
    out: PathBuf,
}

#[derive(Subcommand, Debug)]
enum RenderCommand {
    /// Dendrogram of the configured feature vectors
    Dendrogram {
        #[command(flatten)]
        io: DataArgs,

        /// Cut threshold passed to the renderer (overrides config)
        #[arg(long)]
        threshold: Option<f64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// One transition diagram per cluster id
    Clusters {
        #[command(flatten)]
        io: DataArgs,

        /// Cluster column (overrides config)
        #[arg(long)]
        cluster_column: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Transition diagram of the members matching a name and state
    Member {
        #[command(flatten)]
        io: DataArgs,

        /// Substring of the member name
        #[arg(long)]
        name: String,

        /// Substring of the state label
        #[arg(long)]
        state: String,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Renderer timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct StatsArgs {
    #[command(flatten)]
    io: DataArgs,

    /// Cluster column (overrides config)
    #[arg(long)]
    cluster_column: Option<String>,

    /// Number of subgroups; defaults to the hole/particle pairs present
    #[arg(long)]
    subgroups: Option<usize>,
}

#[derive(Args, Debug)]
struct ParamsArgs {
    /// Parameter file: `name energy wavelength osc rot` per line
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Output directory
    #[arg(long, short = 'o')]
    out: PathBuf,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        if let Some(cause) = err.chain().find_map(|c| c.downcast_ref::<TransitionError>()) {
            let guidance = cause.user_message();
            if guidance != cause.to_string() {
                eprintln!();
                eprintln!("{}", guidance);
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Select(args) => run_select(&config, args),
        Commands::Cluster(args) => run_cluster(config, args),
        Commands::TransferFunction(args) => run_transfer_function(args),
        Commands::Render(command) => run_render(config, command),
        Commands::ChargeTransfer(args) => run_charge_transfer(args),
        Commands::Stats(args) => run_stats(&config, args),
        Commands::Params(args) => run_params(args),
        Commands::Check => check_renderer(&config),
        Commands::Version => show_version(),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_dataset(path: &Path) -> Result<DataFrame> {
    let frame = DataFrame::read_csv(path)
        .with_context(|| format!("Failed to load dataset: {}", path.display()))?;
    log::info!("Loaded dataset {}", path.display());
    Ok(frame)
}

fn run_select(config: &PipelineConfig, args: DataArgs) -> Result<()> {
    let dataset = load_dataset(&args.data)?;
    let table = feature_vector_table(config, &dataset)?;

    let contract = OutputContract::new(&args.out)?;
    publish_csv(&contract.feature_vector_csv(), &table)?;
    println!("Feature vector: {}", contract.feature_vector_csv().display());
    Ok(())
}

fn run_cluster(mut config: PipelineConfig, args: ClusterArgs) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.clustering.threshold = threshold;
    }
    if let Some(linkage) = args.linkage {
        config.clustering.linkage = linkage;
    }
    if let Some(metric) = args.metric {
        config.clustering.metric = metric;
    }
    if args.highlight.is_some() {
        config.colors.highlight = args.highlight;
    }
    config.validate().context("Invalid clustering options")?;

    let dataset = load_dataset(&args.io.data)?;
    let report = cluster_dataset(&config, &dataset)?;
    let labels = report.labels_table(&config.labels.cluster_column)?;

    let contract = OutputContract::new(&args.io.out)?;
    publish_csv(&contract.cluster_labels_csv(), &labels)?;
    publish_json(&contract.dendrogram_json(), &report.dendrogram)?;
    write_atomic(
        &contract.transfer_function_json(),
        report.transfer_function.to_json()?.as_bytes(),
    )?;

    println!(
        "Clusters: {} at threshold {} ({} leaves)",
        report.dendrogram.k(),
        config.clustering.threshold,
        report.dendrogram.leaf_colors.len()
    );
    println!("Results:  {}", contract.base_dir.display());
    Ok(())
}

fn run_transfer_function(args: TransferFunctionArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.colors)
        .with_context(|| format!("Failed to read {}", args.colors.display()))?;
    let dendrogram: ColoredDendrogram = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.colors.display()))?;

    let tf = synthesize_transfer_function(&dendrogram.leaf_colors, dendrogram.k(), args.highlight)?;

    let contract = OutputContract::new(&args.out)?;
    write_atomic(&contract.transfer_function_json(), tf.to_json()?.as_bytes())?;
    println!(
        "Transfer function: {} bands -> {}",
        tf.bands(),
        contract.transfer_function_json().display()
    );
    Ok(())
}

fn renderer_for(config: &PipelineConfig, run: &RunArgs) -> RendererProcess {
    let renderer = RendererProcess::from_config(&config.renderer);
    match run.timeout {
        Some(secs) => renderer.with_timeout(Duration::from_secs(secs.max(1))),
        None => renderer,
    }
}

fn run_render(mut config: PipelineConfig, command: RenderCommand) -> Result<()> {
    let (io, run_args) = match &command {
        RenderCommand::Dendrogram { io, run, .. }
        | RenderCommand::Clusters { io, run, .. }
        | RenderCommand::Member { io, run, .. } => (io, run),
    };
    let dataset = load_dataset(&io.data)?;
    let contract = OutputContract::new(&io.out)?;
    let renderer = renderer_for(&config, run_args);

    let request = match &command {
        RenderCommand::Dendrogram { threshold, .. } => {
            if let Some(t) = threshold {
                config.clustering.threshold = *t;
            }
            RenderRequest::Dendrogram {
                request: dendrogram_request(&config, &dataset)?,
                threshold: config.clustering.threshold,
            }
        }
        RenderCommand::Clusters { cluster_column, .. } => {
            if let Some(column) = cluster_column {
                config.labels.cluster_column = column.clone();
            }
            RenderRequest::ClusterTransitions {
                dataset: &dataset,
                request: cluster_transition_request(&config),
            }
        }
        RenderCommand::Member { name, state, .. } => RenderRequest::MemberTransition {
            dataset: &dataset,
            request: member_transition_request(&config, name, state),
        },
    };

    let submission = submit_render_job(&renderer, &request, &contract.base_dir)?;
    let published = publish_submission(&contract, &submission)?;

    println!("Job:       {}", submission.job_id);
    println!("Directory: {}", contract.job_dir(&submission.job_id).display());
    for artifact in submission.artifacts() {
        println!("  ✓ {}", artifact.display());
    }

    let failures: Vec<&RenderOutcome> = submission.failures().collect();
    for failure in &failures {
        let run = failure.run();
        eprintln!(
            "  ✗ {} [{}, exit {:?}]: {}",
            failure.expected_artifact().display(),
            failure.status(),
            run.exit_code,
            run.stderr.trim()
        );
    }
    println!("Published {} artifact(s) to {}", published, contract.manifest_json().display());

    if !failures.is_empty() {
        anyhow::bail!(
            "Render job {} had {} failing run(s); logs are in {}",
            submission.job_id,
            failures.len(),
            contract.job_dir(&submission.job_id).display()
        );
    }
    Ok(())
}

fn run_charge_transfer(args: DataArgs) -> Result<()> {
    let mut frame = load_dataset(&args.data)?;
    let subgroups = append_charge_transfer_columns(&mut frame)?;

    let contract = OutputContract::new(&args.out)?;
    publish_csv(&contract.charge_transfer_csv(), &frame)?;
    println!(
        "Charge transfer: {} subgroups -> {}",
        subgroups,
        contract.charge_transfer_csv().display()
    );
    Ok(())
}

fn run_stats(config: &PipelineConfig, args: StatsArgs) -> Result<()> {
    let dataset = load_dataset(&args.io.data)?;
    let column = args
        .cluster_column
        .as_deref()
        .unwrap_or(&config.labels.cluster_column);
    let stats = cluster_statistics(&dataset, column, args.subgroups)?;

    let contract = OutputContract::new(&args.io.out)?;
    publish_csv(&contract.statistics_csv(), &stats.extrema)?;
    publish_csv(&contract.statistics_diff_csv(), &stats.spread)?;
    publish_csv(&contract.statistics_mean_csv(), &stats.moments)?;
    println!("Statistics: {}", contract.base_dir.display());
    Ok(())
}

fn run_params(args: ParamsArgs) -> Result<()> {
    let frame = read_parameters(&args.input)
        .with_context(|| format!("Failed to read parameters: {}", args.input.display()))?;

    let contract = OutputContract::new(&args.out)?;
    publish_csv(&contract.parameters_csv(), &frame)?;
    println!("Parameters: {}", contract.parameters_csv().display());
    Ok(())
}

fn check_renderer(config: &PipelineConfig) -> Result<()> {
    println!("moltrans v{}", moltrans_report::VERSION);
    println!();
    println!("Renderer:");
    match find_renderer(&config.renderer) {
        Some(path) => println!("  ✓ {}", path.display()),
        None => println!("  ✗ {} not found", config.renderer.executable.display()),
    }
    println!(
        "  entries: {}, {}, {}",
        config.renderer.dendrogram_entry,
        config.renderer.cluster_entry,
        config.renderer.member_entry
    );
    println!("  timeout: {}s", config.renderer.timeout_secs);
    Ok(())
}

fn show_version() -> Result<()> {
    println!("moltrans v{}", moltrans_report::VERSION);
    Ok(())
}
