use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chart_sync::catalog::{CatalogSearch, PayloadChart};
use chart_sync::config::{CollectionConfig, SyncConfig};
use chart_sync::error::SyncError;
use chart_sync::progress::{create_progress_bar, format_duration, log_progress, set_log_only};
use chart_sync::reconcile::{reconcile_all, BatchOutcome, CollectionInput};
use chart_sync::services::ChartSource;
use chart_sync::sqlite::SqliteStorage;
use chart_sync::storage::{MemoryStorage, Storage};

#[derive(Parser)]
#[command(name = "chart-sync")]
#[command(about = "Keep streaming service playlists in sync with music charts")]
struct Args {
    /// Collection configuration (TOML)
    #[arg(long)]
    config: PathBuf,

    /// State database (SQLite)
    #[arg(long, required_unless_present = "dry_run")]
    database: Option<PathBuf>,

    /// Directory holding downloaded chart, playlist and catalog payloads (JSON)
    #[arg(long)]
    data_dir: PathBuf,

    /// Write reconciliation reports to this file (JSON)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Reconcile against an empty in-memory store; nothing is persisted
    #[arg(long)]
    dry_run: bool,

    /// Hide progress bars (for tail-friendly logs)
    #[arg(long)]
    log_only: bool,
}

/// Payload files hold either a JSON array or an object with an `items` array.
fn read_items(path: &Path) -> chart_sync::error::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::Decode {
        service: "payload".to_string(),
        message: format!("{}: {}", path.display(), e),
    })?;
    let value: Value = serde_json::from_str(&content)?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(SyncError::Decode {
                service: "payload".to_string(),
                message: format!("{}: no items array", path.display()),
            }),
        },
        _ => Err(SyncError::Decode {
            service: "payload".to_string(),
            message: format!("{}: expected an array of items", path.display()),
        }),
    }
}

fn load_collection(
    data_dir: &Path,
    chart_limit: usize,
    collection: &CollectionConfig,
) -> chart_sync::error::Result<CollectionInput> {
    let source_kind = collection.source_kind()?;
    let target_kind = collection.target_kind()?;

    let chart_path = data_dir.join(format!("{}.json", collection.source_name()));
    let chart = PayloadChart::new(source_kind)
        .with_collection(&collection.source_collection, read_items(&chart_path)?);
    let source_tracks = chart.get_collection_tracks(&collection.source_collection, chart_limit)?;

    let playlist_path = data_dir.join(format!(
        "{}_playlist_{}.json",
        collection.target_code, collection.target_playlist_id
    ));
    let playlist_items = read_items(&playlist_path)?;

    let catalog_path = data_dir.join(format!("{}_catalog.json", collection.target_code));
    let catalog_items = if catalog_path.exists() {
        read_items(&catalog_path)?
    } else {
        warn!(path = %catalog_path.display(), "No search catalog, unmatched tracks stay unresolved");
        Vec::new()
    };

    let search = CatalogSearch::new(target_kind, &collection.target_playlist_id)
        .with_playlist(&collection.target_playlist_id, &playlist_items)?
        .with_catalog(&catalog_items);

    info!(
        playlist = %collection.source_name(),
        chart_tracks = source_tracks.len(),
        playlist_tracks = playlist_items.len(),
        catalog_tracks = search.len(),
        "Loaded payloads"
    );

    Ok(CollectionInput {
        source_tracks,
        search: Box::new(search),
    })
}

fn run_batch<S: Storage>(
    storage: &mut S,
    config: &SyncConfig,
    data_dir: &Path,
) -> Result<Vec<BatchOutcome>> {
    let total = config.collections.len() as u64;
    let pb = create_progress_bar(total, "Reconciling");
    let mut done = 0u64;

    let outcomes = reconcile_all(storage, config, |collection| {
        pb.set_message(collection.source_name());
        log_progress("Reconciling", done, total);
        done += 1;
        pb.inc(1);
        load_collection(data_dir, config.chart_limit, collection)
    })
    .context("Reconciliation stopped")?;

    pb.finish_with_message("Reconciled");
    log_progress("Reconciling", done, total);
    Ok(outcomes)
}

fn outcome_json(outcome: &BatchOutcome) -> Value {
    match &outcome.result {
        Ok(report) => json!({
            "source_name": outcome.source_name,
            "target": outcome.target_code,
            "report": report,
        }),
        Err(e) => json!({
            "source_name": outcome.source_name,
            "target": outcome.target_code,
            "error": e.to_string(),
        }),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialise logging")?;

    let start = Instant::now();

    let config = SyncConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {:?}", args.config))?;
    info!(collections = config.collections.len(), "Loaded configuration");

    let outcomes = match (&args.database, args.dry_run) {
        (Some(path), false) => {
            let mut storage = SqliteStorage::open(path)
                .with_context(|| format!("Failed to open database: {:?}", path))?;
            run_batch(&mut storage, &config, &args.data_dir)?
        }
        _ => {
            info!("Dry run, using in-memory storage");
            run_batch(&mut MemoryStorage::new(), &config, &args.data_dir)?
        }
    };

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    println!("\n{:=<60}", "");
    println!("Reconciliation complete!");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "  {} -> {}: {} created, {} updated, {} unresolved, {} duplicates, {} not in chart",
                outcome.source_name,
                outcome.target_code,
                report.created,
                report.updated,
                report.unresolved_source.len(),
                report.skipped_duplicates.len(),
                report.unmatched_service.len()
            ),
            Err(e) => println!("  {} -> {}: FAILED ({})", outcome.source_name, outcome.target_code, e),
        }
    }
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if let Some(path) = &args.report {
        let reports: Vec<Value> = outcomes.iter().map(outcome_json).collect();
        let content = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report: {:?}", path))?;
        info!(path = %path.display(), "Wrote report");
    }

    if failed > 0 {
        anyhow::bail!("{} of {} playlists failed", failed, outcomes.len());
    }
    Ok(())
}
