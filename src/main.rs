//! CLI entry point for the static feed importer.
//!
//! Acquires a GTFS feed, replaces the canonical schedule tables with it in a
//! single transaction, and optionally appends the outcome to a CSV history.

use std::ffi::OsStr;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_static_loader::{
    config::ImportConfig,
    output::{append_record, print_json, print_pretty},
    report::ImportRecord,
    runner::ImportRunner,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_static_loader.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_static_loader.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let config = ImportConfig::parse();
    let history = config.history.clone();
    let json = config.json;

    let runner = ImportRunner::new(config);
    let service_date = runner.service_date();
    let outcome = runner.run(service_date).await;

    if let Some(path) = &history {
        let record = ImportRecord::from_outcome(&outcome, service_date);
        if let Err(e) = append_record(path, &record) {
            error!(error = %e, "Failed to append import record");
        }
    }

    match outcome {
        Ok(report) => {
            print_pretty(&report);
            if json {
                print_json(&report)?;
            }
            info!(
                service_date = %report.service_date,
                elapsed_ms = report.elapsed_ms,
                "Import finished"
            );
            Ok(())
        }
        Err(err) => {
            error!(stage = %err.stage, error = %err.kind, "Import failed");
            Err(err.into())
        }
    }
}
