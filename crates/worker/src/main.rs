use std::io::Write;
use std::path::Path;

use accesslog_core::import_status::RunStatus;
use accesslog_core::preview::{detect_delimiter, preview};
use accesslog_db::models::import_run::ImportRunFilter;
use accesslog_db::DbPool;
use accesslog_pipeline::config::{parse_delimiter, parse_lookback};
use accesslog_pipeline::export::export_duplicates;
use accesslog_pipeline::history::{list_runs, run_detail};
use accesslog_pipeline::memory::MemoryStore;
use accesslog_pipeline::pg_store::PgEventStore;
use accesslog_pipeline::{
    EventStore, ImportOutcome, ImportPipeline, ImportRequest, PipelineConfig, PipelineError,
};
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Command, HistoryArgs, ImportArgs, PreviewArgs};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accesslog_worker=info,accesslog_pipeline=info".into()),
        )
        .with(cli.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json).then(tracing_subscriber::fmt::layer))
        .init();

    let database_url = cli.database_url.as_deref();
    match cli.command {
        Command::Import(args) => import(database_url, args).await,
        Command::Preview(args) => preview_file(args).await,
        Command::History(args) => history(database_url, args).await,
        Command::Show { run_id } => {
            let pool = connect(database_url).await?;
            let detail = run_detail(&pool, run_id)
                .await
                .context("Failed to load import run")?;
            match detail {
                Some(detail) => print_json(&detail),
                None => bail!("Import run {run_id} not found"),
            }
        }
        Command::ExportDuplicates { run_id, output } => {
            let pool = connect(database_url).await?;
            let csv = export_duplicates(&pool, run_id).await?;
            match output {
                Some(path) => tokio::fs::write(&path, &csv)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout()
                    .lock()
                    .write_all(&csv)
                    .context("Failed to write to stdout")?,
            }
            tracing::info!(run_id, bytes = csv.len(), "Duplicates exported");
            Ok(())
        }
    }
}

async fn connect(database_url: Option<&str>) -> Result<DbPool> {
    let url = database_url.context("DATABASE_URL must be set")?;

    let pool = accesslog_db::create_pool(url)
        .await
        .context("Failed to connect to database")?;
    accesslog_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    accesslog_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::debug!("Database ready");

    Ok(pool)
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// `auto` sniffs the separator from the first line; `None` keeps `fallback`.
fn resolve_delimiter(flag: Option<&str>, bytes: &[u8], fallback: char) -> Result<char> {
    match flag {
        Some("auto") => Ok(detect_delimiter(bytes)),
        Some(value) => Ok(parse_delimiter(value)?),
        None => Ok(fallback),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

async fn import(database_url: Option<&str>, args: ImportArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env().context("Invalid import configuration")?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(lookback) = args.lookback.as_deref() {
        config.dedup_lookback_days = parse_lookback(lookback)?;
    }
    config.validate().context("Invalid import configuration")?;

    let bytes = read_file(&args.file).await?;
    let file_name = args
        .file
        .file_name()
        .map_or_else(|| args.file.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut request = ImportRequest::new(bytes, file_name);
    request.delimiter = resolve_delimiter(args.delimiter.as_deref(), &request.bytes, config.delimiter)?;
    request.has_header = !args.no_header;
    request.validate_before_import = args.validate;
    if let Some(initiator) = args.initiator {
        request.initiator = initiator;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling import");
            on_interrupt.cancel();
        }
    });

    let outcome = if args.dry_run {
        let pipeline = ImportPipeline::new(MemoryStore::new(), config);
        run_pipeline(pipeline, args.run_date, request, &cancel).await?
    } else {
        let pool = connect(database_url).await?;
        let store = PgEventStore::new(pool).serialize_runs(config.serialize_runs);
        run_pipeline(ImportPipeline::new(store, config), args.run_date, request, &cancel).await?
    };

    let summary = &outcome.summary;
    match summary.status {
        RunStatus::Completed => Ok(()),
        status => bail!(
            "Import {status}: {}",
            summary.failure_reason.as_deref().unwrap_or("no reason recorded")
        ),
    }
}

async fn run_pipeline<S: EventStore>(
    pipeline: ImportPipeline<S>,
    run_date: Option<NaiveDate>,
    request: ImportRequest,
    cancel: &CancellationToken,
) -> Result<ImportOutcome> {
    let pipeline = match run_date {
        Some(date) => pipeline.with_run_date(date),
        None => pipeline,
    };

    match pipeline.run(request, cancel).await {
        Ok(outcome) => {
            print_report(&outcome)?;
            Ok(outcome)
        }
        Err(PipelineError::Audit { source, outcome }) => {
            print_report(&outcome)?;
            Err(source).context("Import finished but its run summary was not recorded")
        }
    }
}

fn print_report(outcome: &ImportOutcome) -> Result<()> {
    print_json(&json!({
        "summary": outcome.summary,
        "duplicates": outcome.duplicates,
        "errors": outcome.errors,
        "corrections": outcome.corrections,
        "validation": outcome.validation,
        "orphan_lines": outcome.orphan_lines,
    }))
}

// ---------------------------------------------------------------------------
// preview / history
// ---------------------------------------------------------------------------

async fn preview_file(args: PreviewArgs) -> Result<()> {
    let bytes = read_file(&args.file).await?;
    let delimiter = resolve_delimiter(args.delimiter.as_deref(), &bytes, detect_delimiter(&bytes))?;
    let preview = preview(&bytes, delimiter, !args.no_header, args.rows)
        .with_context(|| format!("Cannot read {}", args.file.display()))?;
    print_json(&json!({
        "delimiter": delimiter.to_string(),
        "preview": preview,
    }))
}

async fn history(database_url: Option<&str>, args: HistoryArgs) -> Result<()> {
    let pool = connect(database_url).await?;
    let filter = ImportRunFilter {
        started_from: args.from.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
        started_to: args
            .to
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
            .map(|t| t.and_utc()),
        limit: args.limit,
        offset: args.offset,
    };
    let page = list_runs(&pool, &filter)
        .await
        .context("Failed to list import runs")?;
    print_json(&page)
}
