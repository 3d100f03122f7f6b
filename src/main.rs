use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genre_resolver::collaborator::{CachedCatalog, CatalogSource, CrowdTagSource};
use genre_resolver::config::ResolverSettings;
use genre_resolver::fixture::{load_fixtures, FixtureCatalog, FixtureCrowd};
use genre_resolver::pipeline::{Pipeline, RunMode, TrackReport};
use genre_resolver::progress::{create_progress_bar, create_spinner, format_duration, log_progress, set_log_only};
use genre_resolver::safety::validate_output_path;
use genre_resolver::stats::ResolutionStats;

#[derive(Parser)]
#[command(name = "genre-resolver")]
#[command(about = "Resolve genres for a batch of tracks and print the tag writes as JSON lines")]
struct Args {
    /// JSON Lines file of tracks with their analysis and recorded source replies
    input: PathBuf,

    /// Re-tag tracks already stamped with the current version
    #[arg(long)]
    force: bool,

    /// Only rebuild comment fields from stored energy/valence
    #[arg(long, conflicts_with = "force")]
    refresh_comments: bool,

    /// Skip the catalog tier
    #[arg(long)]
    no_catalog: bool,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and print periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this file (name must contain "stats")
    #[arg(long)]
    stats_out: Option<PathBuf>,

    /// JSON settings file; missing keys keep their defaults
    #[arg(long, env = "GENRE_RESOLVER_SETTINGS")]
    settings: Option<PathBuf>,

    /// Override the version stamp written to tagged tracks
    #[arg(long, env = "GENRE_RESOLVER_VERSION")]
    version_stamp: Option<String>,
}

const PROGRESS_INTERVAL: u64 = 500;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genre_resolver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(args: &Args) -> Result<ResolverSettings> {
    let mut settings = match &args.settings {
        Some(path) => ResolverSettings::from_file(path)?,
        None => ResolverSettings::default(),
    };
    if args.no_catalog {
        settings.catalog_enabled = false;
    }
    if let Some(stamp) = &args.version_stamp {
        settings.version_stamp = stamp.clone();
    }
    Ok(settings)
}

fn write_reports(reports: &[TrackReport]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for report in reports {
        serde_json::to_writer(&mut out, report).context("Failed to serialize track report")?;
        writeln!(out).context("Failed to write to stdout")?;
    }
    out.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    set_log_only(args.log_only);

    if let Some(stats_out) = &args.stats_out {
        validate_output_path(stats_out, "stats", &[args.input.as_path()])?;
    }

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();
    let settings = load_settings(&args)?;

    let spinner = create_spinner("Loading tracks");
    let fixtures = load_fixtures(&args.input)?;
    spinner.finish_with_message(format!("Loaded {} tracks", fixtures.len()));
    info!(
        tracks = fixtures.len(),
        version = %settings.version_stamp,
        catalog = settings.catalog_enabled,
        "starting run"
    );

    let catalog: Arc<dyn CatalogSource> = Arc::new(CachedCatalog::new(Arc::new(
        FixtureCatalog::from_fixtures(&fixtures, &settings),
    )));
    let crowd: Arc<dyn CrowdTagSource> = Arc::new(FixtureCrowd::from_fixtures(&fixtures, &settings));
    let mode = if args.refresh_comments {
        RunMode::RefreshComments
    } else {
        RunMode::Tag { force: args.force }
    };
    let pipeline = Pipeline::new(catalog, crowd, settings, mode);

    let total = fixtures.len() as u64;
    let pb = create_progress_bar(total, "Resolving genres");
    let done = AtomicU64::new(0);
    let reports: Vec<TrackReport> = fixtures
        .par_iter()
        .map(|fixture| {
            let report = pipeline.process(&fixture.request);
            pb.inc(1);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            log_progress("resolve", current, total, PROGRESS_INTERVAL);
            report
        })
        .collect();
    pb.finish_with_message(format!("Resolved {} tracks", reports.len()));

    write_reports(&reports)?;

    let mut stats = ResolutionStats::from_reports(&reports);
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("final");
    if let Some(stats_out) = &args.stats_out {
        stats
            .write_to_file(stats_out)
            .with_context(|| format!("Failed to write stats to {}", stats_out.display()))?;
    }

    info!(
        tagged = stats.tagged,
        up_to_date = stats.up_to_date,
        resolution_rate = %format!("{:.1}%", stats.resolution_rate()),
        elapsed = %format_duration(start.elapsed()),
        "run complete"
    );

    Ok(())
}
