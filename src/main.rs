// ABOUTME: CLI entrypoint - loads config, runs the comparison across all configured tables

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Semaphore;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use db_sentinel::config::Config;
use db_sentinel::error::EngineError;
use db_sentinel::orchestrator::{write_final_report, TableRunner};
use db_sentinel::postgres::ConnectionPool;

/// Batched, hash-based reconciliation engine for comparing two PostgreSQL tables.
#[derive(Parser, Debug)]
#[command(name = "db-sentinel", version, about)]
struct Cli {
    /// Path to config.yaml describing the source/target connections and tables to compare.
    #[arg(long, env = "DB_SENTINEL_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug-level logging. Ignored if RUST_LOG is set.
    #[arg(long)]
    log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let _audit_log_guard = init_logging(cli.log, &config.paths.audit_log)?;

    let job_id = uuid::Uuid::new_v4();
    tracing::info!(job_id = %job_id, "starting comparison run");

    let source_password = config.source_db.resolve_password("SOURCE_DB_PASSWORD")?;
    let target_password = config.target_db.resolve_password("TARGET_DB_PASSWORD")?;
    let source_conn = config.source_db.connection_string(&source_password);
    let target_conn = config.target_db.connection_string(&target_password);

    let source_pool = Arc::new(
        ConnectionPool::connect(&source_conn, config.max_threads)
            .await
            .map_err(|e| EngineError::Connect { role: "source", source: e })?,
    );
    let target_pool = Arc::new(
        ConnectionPool::connect(&target_conn, config.max_threads)
            .await
            .map_err(|e| EngineError::Connect { role: "target", source: e })?,
    );
    let paths = Arc::new(config.paths.clone());
    let flags = Arc::new(config.flags.clone());

    let semaphore = Arc::new(Semaphore::new(config.max_threads));
    let mut handles = Vec::with_capacity(config.table_config.len());

    for spec in config.table_config.clone() {
        let semaphore = semaphore.clone();
        let runner = TableRunner {
            job_id,
            source_pool: source_pool.clone(),
            target_pool: target_pool.clone(),
            paths: paths.clone(),
            flags: flags.clone(),
        };
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            runner.run(&spec).await
        }));
    }

    let mut summaries = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await.context("table comparison task panicked")? {
            Ok(summary) => summaries.push(summary),
            Err(e) => tracing::error!(error = %e, "table comparison failed"),
        }
    }

    write_final_report(&paths, &summaries).context("failed to write comparison report")?;
    tracing::info!(tables = summaries.len(), "comparison run complete");

    Ok(())
}

/// Every run logs to stdout and to `audit_log`, matching `setup_logging`'s
/// `basicConfig(filename=...)` + `StreamHandler(sys.stdout)` pair. The
/// returned guard must be kept alive for the process lifetime or the file
/// writer's background flush thread is torn down immediately.
fn init_logging(debug_flag: bool, audit_log: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let audit_path = PathBuf::from(audit_log);
    if let Some(parent) = audit_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    let file_appender = tracing_appender::rolling::never(
        audit_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new(".")),
        audit_path.file_name().context("audit_log path has no file name")?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
