//! # noesis-seed
//!
//! CLI entrypoint: seeds a local concept index from `--filesdir` and,
//! optionally, serves the resulting tool surface over HTTP.
//!
//! ## Modules
//!
//! - [`noesis_core::config`] — TOML configuration parsing and validation
//! - [`noesis_core::seed`] — seeding pipeline orchestration
//! - [`noesis_core::server`] — JSON HTTP tool surface (Axum)
//! - [`noesis_core::migrate`] — database schema migrations

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use noesis_core::config;
use noesis_core::progress::ProgressMode;
use noesis_core::seed::{self, SeedOptions};

#[derive(Parser)]
#[command(
    name = "noesis-seed",
    about = "Seed a local concept index from a folder of text files",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./config/noesis.toml")]
    config: PathBuf,

    /// Root directory to scan for documents.
    #[arg(long)]
    filesdir: PathBuf,

    /// Override `[db].path` from the config file.
    #[arg(long)]
    dbpath: Option<PathBuf>,

    /// Reprocess every document regardless of stored content hash.
    #[arg(long)]
    overwrite: bool,

    /// Rebuild the full concept index even if no document changed.
    #[arg(long)]
    rebuild_concepts: bool,

    /// Reprocess a document automatically when its content hash changes.
    #[arg(long)]
    auto_reseed: bool,

    /// Resume from the on-disk checkpoint, skipping already-processed hashes.
    #[arg(long)]
    resume: bool,

    /// Discard the checkpoint before starting.
    #[arg(long)]
    clean_checkpoint: bool,

    /// With `--resume`, also re-attempt documents recorded as failed.
    #[arg(long)]
    retry_failed: bool,

    /// Process at most this many documents this run.
    #[arg(long)]
    max_docs: Option<usize>,

    /// Concurrent extraction workers (1-20), overriding `[enrichment].worker_concurrency`.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=20))]
    parallel: Option<u64>,

    /// Enable WordNet-backed synonym/hypernym expansion, overriding `[enrichment].with_wordnet`.
    #[arg(long)]
    with_wordnet: bool,

    /// After seeding, start the HTTP tool surface and serve indefinitely.
    #[arg(long)]
    serve: bool,

    /// Disable progress output on stderr.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            ExitCode::from(4)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut cfg = config::load_config(&cli.config)?;

    if let Some(dbpath) = cli.dbpath {
        cfg.db.path = dbpath;
    }
    if let Some(parallel) = cli.parallel {
        cfg.enrichment.worker_concurrency = parallel as usize;
    }
    if cli.with_wordnet {
        cfg.enrichment.with_wordnet = true;
    }

    init_tracing(&cfg.log_level);

    let progress_mode = if cli.quiet {
        ProgressMode::Off
    } else {
        ProgressMode::default_for_tty()
    };
    let progress = progress_mode.reporter();

    let opts = SeedOptions {
        filesdir: cli.filesdir,
        overwrite: cli.overwrite,
        rebuild_concepts: cli.rebuild_concepts,
        auto_reseed: cli.auto_reseed,
        resume: cli.resume,
        clean_checkpoint: cli.clean_checkpoint,
        retry_failed: cli.retry_failed,
        max_docs: cli.max_docs,
    };

    let report = seed::run_seed(cfg.clone(), &opts, progress.as_ref()).await?;

    println!(
        "seeded {}/{} documents ({} skipped, {} failed), {} concepts indexed, {} categories created",
        report.documents_processed,
        report.documents_seen,
        report.documents_skipped,
        report.documents_failed,
        report.concepts_indexed,
        report.categories_created,
    );
    for (source, error) in &report.failed {
        eprintln!("  failed: {source}: {error}");
    }

    if cli.serve {
        noesis_core::server::run_server(&cfg).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if report.has_partial_failure() {
        return Ok(ExitCode::from(3));
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
