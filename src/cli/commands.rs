//! CLI command definitions for golden-forge.
//!
//! `run` executes the whole curation pipeline. The per-stage commands read
//! and write the same on-disk layout so a single stage can be re-run and
//! inspected in isolation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::bands::BandClassifier;
use crate::error::{CurationError, LockIssue};
use crate::export::{read_json, to_canonical_json, write_bytes, write_outputs, Package, SPLITS_FILE};
use crate::integrity::{
    collect_locked_files, invalidate_release, Lockfile, ReleaseChecker, LOCKFILE_NAME,
};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{CurationConfig, CurationPipeline, StageReports};
use crate::split::Splits;
use crate::storage::{Admission, CandidateRecord, CandidateStore, StoreOptions};

/// Default output directory for curated datasets.
const DEFAULT_OUTPUT_DIR: &str = "./golden-out";

/// Curation & integrity engine for stratified golden spec datasets.
#[derive(Parser)]
#[command(name = "golden-forge")]
#[command(about = "Curate, split and lock a stratified golden dataset")]
#[command(version)]
#[command(
    long_about = "golden-forge turns an oversubscribed pool of validated candidate specs into a fixed-size stratified dataset.\n\nStages: dedup, top-up, diversity, bands, split, package, lock. Identical seed and input produce identical bytes.\n\nExample usage:\n  golden-forge run --input candidates.jsonl --out ./golden-out --seed 2025 --enforce"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, global = true, env = "GOLDEN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run every stage, then package and lock the dataset.
    Run(RunArgs),

    /// Remove near-duplicates and trim strata to the replication target.
    Dedup(DedupArgs),

    /// Refill strata left short by dedup.
    #[command(name = "top-up")]
    TopUp(TopUpArgs),

    /// Score per-stratum diversity of the final items.
    Diversity(CheckArgs),

    /// Verify the global length-band mix of the final items.
    Bands(CheckArgs),

    /// Assign final items to train/val/test.
    Split(SplitArgs),

    /// Write the split artifacts.
    Package(PackageArgs),

    /// Digest the output directory into the lockfile.
    Lock(OutArgs),

    /// Verify the lockfile and the release invariants.
    Verify(OutArgs),
}

/// Arguments for `golden-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSONL file of validated candidates.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Reserve pool consulted after the main pool during top-up.
    #[arg(short, long)]
    pub reserve: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,

    /// Run seed (overrides config and GOLDEN_SEED).
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Fail on diversity and band-mix violations.
    #[arg(long)]
    pub enforce: bool,

    /// Write Prometheus text exposition here after the run.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

/// Arguments for `golden-forge dedup`.
#[derive(Parser, Debug)]
pub struct DedupArgs {
    /// JSONL file of validated candidates.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,

    /// Run seed (overrides config and GOLDEN_SEED).
    #[arg(short, long)]
    pub seed: Option<u64>,
}

/// Arguments for `golden-forge top-up`.
#[derive(Parser, Debug)]
pub struct TopUpArgs {
    /// Dedup survivors (`stages/deduped.jsonl`).
    #[arg(short, long)]
    pub kept: PathBuf,

    /// Full candidate pool.
    #[arg(short, long)]
    pub pool: PathBuf,

    /// Reserve pool consulted after the main pool.
    #[arg(short, long)]
    pub reserve: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,

    /// Run seed (overrides config and GOLDEN_SEED).
    #[arg(short, long)]
    pub seed: Option<u64>,
}

/// Arguments for `golden-forge diversity` and `golden-forge bands`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Final items (`stages/topped.jsonl`).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,

    /// Run seed (overrides config and GOLDEN_SEED).
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Fail on violations instead of warning.
    #[arg(long)]
    pub enforce: bool,
}

/// Arguments for `golden-forge split`.
#[derive(Parser, Debug)]
pub struct SplitArgs {
    /// Final items (`stages/topped.jsonl`).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,

    /// Run seed (overrides config and GOLDEN_SEED).
    #[arg(short, long)]
    pub seed: Option<u64>,
}

/// Arguments for `golden-forge package`.
#[derive(Parser, Debug)]
pub struct PackageArgs {
    /// Final items (`stages/topped.jsonl`).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Split assignment (`splits.json`).
    #[arg(long)]
    pub splits: PathBuf,

    /// Output directory.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,
}

/// Arguments for `golden-forge lock` and `golden-forge verify`.
#[derive(Parser, Debug)]
pub struct OutArgs {
    /// Output directory holding reports, splits and artifacts.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub out: PathBuf,
}

/// Summary printed after `run`.
#[derive(Debug, Serialize)]
struct RunSummary {
    status: String,
    seed: u64,
    candidates: usize,
    excluded: usize,
    dropped: usize,
    trimmed: usize,
    dedup_ratio: f64,
    retention_ratio: f64,
    topped_up: usize,
    items: usize,
    diversity_pass: bool,
    band_pass: bool,
    root_digest: String,
    output: String,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => run_pipeline_command(config_path, args).await,
        Commands::Dedup(args) => run_dedup_command(config_path, args).await,
        Commands::TopUp(args) => run_top_up_command(config_path, args).await,
        Commands::Diversity(args) => run_diversity_command(config_path, args).await,
        Commands::Bands(args) => run_bands_command(config_path, args).await,
        Commands::Split(args) => run_split_command(config_path, args).await,
        Commands::Package(args) => run_package_command(config_path, args).await,
        Commands::Lock(args) => run_lock_command(args).await,
        Commands::Verify(args) => run_verify_command(config_path, args).await,
    }
}

/// Resolves configuration: defaults, YAML file, `GOLDEN_*` environment,
/// then CLI flags.
fn resolve_config(
    path: Option<&Path>,
    seed: Option<u64>,
    enforce: bool,
) -> anyhow::Result<CurationConfig> {
    let mut config = match path {
        Some(path) => CurationConfig::from_yaml_file(path).map_err(|e| {
            anyhow::anyhow!("Failed to load config {}: {}", path.display(), e)
        })?,
        None => CurationConfig::default(),
    }
    .apply_env()?;

    if let Some(seed) = seed {
        config.seed = seed;
    }
    if enforce {
        config.enforce = true;
    }
    config.validate()?;
    Ok(config)
}

fn store_options(config: &CurationConfig, admission: Admission) -> StoreOptions {
    StoreOptions {
        locales: config.locales.clone(),
        classifier: BandClassifier::new(config.bands.clone()),
        admission,
    }
}

async fn load_records(
    path: &Path,
    config: &CurationConfig,
    admission: Admission,
) -> anyhow::Result<CandidateStore> {
    let (store, _) = CandidateStore::load(path, &store_options(config, admission))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
    Ok(store)
}

async fn load_optional(
    path: Option<&Path>,
    config: &CurationConfig,
) -> anyhow::Result<Vec<CandidateRecord>> {
    match path {
        Some(path) => Ok(load_records(path, config, Admission::Candidates)
            .await?
            .into_records()),
        None => Ok(Vec::new()),
    }
}

// ============================================================================
// Full pipeline
// ============================================================================

async fn run_pipeline_command(config_path: Option<&Path>, args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, args.enforce)?;
    if args.metrics_out.is_some() {
        init_metrics()?;
    }

    let options = store_options(&config, Admission::Candidates);
    let (store, summary) = CandidateStore::load(&args.input, &options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", args.input.display(), e))?;
    let reserve = load_optional(args.reserve.as_deref(), &config).await?;

    let pipeline = CurationPipeline::new(config)?;
    let result = pipeline.run(&store, &reserve);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) => {
            invalidate_release(&args.out).await?;
            write_outputs(&args.out, &failure.reports.render()?).await?;
            write_metrics(args.metrics_out.as_deref()).await?;
            warn!(
                out = %args.out.display(),
                "Reports written up to the failing stage"
            );
            return Err(failure.error.into());
        }
    };

    let outputs = outcome.render()?;
    write_outputs(&args.out, &outputs).await?;
    write_metrics(args.metrics_out.as_deref()).await?;

    let root_digest = outputs
        .get(LOCKFILE_NAME)
        .and_then(|bytes| Lockfile::parse(bytes).ok())
        .map(|lock| lock.root_digest)
        .unwrap_or_default();
    let reports = &outcome.reports;
    let run_summary = RunSummary {
        status: "success".to_string(),
        seed: pipeline.config().seed,
        candidates: summary.loaded,
        excluded: summary.excluded_status + summary.excluded_unbanded,
        dropped: reports.dedup.as_ref().map_or(0, |r| r.drops.len()),
        trimmed: reports.dedup.as_ref().map_or(0, |r| r.surplus.len()),
        dedup_ratio: reports.dedup.as_ref().map_or(0.0, |r| r.dedup_ratio()),
        retention_ratio: reports.dedup.as_ref().map_or(1.0, |r| r.retention_ratio()),
        topped_up: reports.top_up.as_ref().map_or(0, |t| t.added()),
        items: outcome.items().len(),
        diversity_pass: reports.diversity.as_ref().is_some_and(|r| r.pass),
        band_pass: reports.bands.as_ref().is_some_and(|r| r.pass),
        root_digest,
        output: args.out.display().to_string(),
    };
    println!("{}", serde_json::to_string_pretty(&run_summary)?);
    Ok(())
}

async fn write_metrics(path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        write_bytes(path, export_metrics().as_bytes()).await?;
        info!(path = %path.display(), "Metrics written");
    }
    Ok(())
}

// ============================================================================
// Single stages
// ============================================================================

async fn run_dedup_command(config_path: Option<&Path>, args: DedupArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, false)?;
    let store = load_records(&args.input, &config, Admission::Candidates).await?;
    let pipeline = CurationPipeline::new(config)?;

    let outcome = pipeline.dedup(store.records());
    let reports = StageReports {
        dedup: Some(outcome.report),
        deduped: Some(outcome.kept),
        ..StageReports::default()
    };
    write_outputs(&args.out, &reports.render()?).await?;
    Ok(())
}

async fn run_top_up_command(config_path: Option<&Path>, args: TopUpArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, false)?;
    let kept = load_records(&args.kept, &config, Admission::Curated).await?;
    let pool = load_records(&args.pool, &config, Admission::Candidates).await?;
    let reserve = load_optional(args.reserve.as_deref(), &config).await?;
    let pipeline = CurationPipeline::new(config)?;

    match pipeline.top_up(kept.records(), pool.records(), &reserve) {
        Ok(done) => {
            let reports = StageReports {
                top_up: Some(done.trace),
                topped: Some(done.records),
                ..StageReports::default()
            };
            write_outputs(&args.out, &reports.render()?).await?;
            Ok(())
        }
        Err(failure) => {
            let reports = StageReports {
                top_up: Some(failure.trace),
                ..StageReports::default()
            };
            invalidate_release(&args.out).await?;
            write_outputs(&args.out, &reports.render()?).await?;
            Err(failure.error.into())
        }
    }
}

async fn run_diversity_command(config_path: Option<&Path>, args: CheckArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, args.enforce)?;
    let items = load_records(&args.input, &config, Admission::Curated).await?;
    let pipeline = CurationPipeline::new(config)?;

    let (report, check) = pipeline.diversity(items.records());
    let reports = StageReports {
        diversity: Some(report),
        ..StageReports::default()
    };
    if check.is_err() {
        invalidate_release(&args.out).await?;
    }
    write_outputs(&args.out, &reports.render()?).await?;
    check?;
    Ok(())
}

async fn run_bands_command(config_path: Option<&Path>, args: CheckArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, args.enforce)?;
    let items = load_records(&args.input, &config, Admission::Curated).await?;
    let pipeline = CurationPipeline::new(config)?;

    let (report, check) = pipeline.bands(items.records());
    let reports = StageReports {
        bands: Some(report),
        ..StageReports::default()
    };
    if check.is_err() {
        invalidate_release(&args.out).await?;
    }
    write_outputs(&args.out, &reports.render()?).await?;
    check?;
    Ok(())
}

async fn run_split_command(config_path: Option<&Path>, args: SplitArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, args.seed, false)?;
    let items = load_records(&args.input, &config, Admission::Curated).await?;
    let pipeline = CurationPipeline::new(config)?;

    let splits = pipeline.split(items.records())?;
    write_bytes(args.out.join(SPLITS_FILE), &to_canonical_json(&splits)?).await?;
    Ok(())
}

async fn run_package_command(
    config_path: Option<&Path>,
    args: PackageArgs,
) -> anyhow::Result<()> {
    let config = resolve_config(config_path, None, false)?;
    let items = load_records(&args.input, &config, Admission::Curated).await?;
    let splits: Splits = read_json(&args.splits).await?;

    let package = Package::build(items.records(), &splits)?;
    let mut outputs = package.render()?;
    outputs.insert(SPLITS_FILE.to_string(), to_canonical_json(&splits)?);
    write_outputs(&args.out, &outputs).await?;
    Ok(())
}

// ============================================================================
// Integrity
// ============================================================================

async fn run_lock_command(args: OutArgs) -> anyhow::Result<()> {
    let files = collect_locked_files(&args.out).await?;
    if files.is_empty() {
        return Err(anyhow::anyhow!(
            "No reports, splits or artifacts found under {}",
            args.out.display()
        ));
    }
    let lockfile = Lockfile::lock(&files);
    write_bytes(args.out.join(LOCKFILE_NAME), &to_canonical_json(&lockfile)?).await?;
    println!("{}", lockfile.root_digest);
    Ok(())
}

async fn run_verify_command(config_path: Option<&Path>, args: OutArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, None, false)?;
    let files = collect_locked_files(&args.out).await?;

    let mut issues = match tokio::fs::read(args.out.join(LOCKFILE_NAME)).await {
        Ok(bytes) => lock_issues(&bytes, &files),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![LockIssue::Missing {
            name: LOCKFILE_NAME.to_string(),
        }],
        Err(e) => return Err(e.into()),
    };
    issues.extend(ReleaseChecker::new(config.replication, config.strata()).check(&files));

    if !issues.is_empty() {
        for issue in &issues {
            warn!(%issue, "Verification issue");
        }
        return Err(CurationError::Lock { issues }.into());
    }

    info!(files = files.len(), "Lockfile and release verified");
    println!("OK");
    Ok(())
}

fn lock_issues(lock_bytes: &[u8], files: &BTreeMap<String, Vec<u8>>) -> Vec<LockIssue> {
    match Lockfile::parse(lock_bytes) {
        Ok(lockfile) => lockfile.verify(files),
        Err(issue) => vec![issue],
    }
}
