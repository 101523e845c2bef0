//! Harvest metrics
//!
//! Each stage records through its own small struct so metric names stay in
//! one place. A Prometheus recorder is installed once per process; short
//! runs can write the rendered exposition text to disk when they finish.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global recorder. Idempotent.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Writes the current exposition text to `path`, if a recorder is installed.
pub fn write_snapshot(path: &Path) -> std::io::Result<()> {
    if let Some(text) = render() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        info!("Wrote metrics snapshot to {}", path.display());
    }
    Ok(())
}

pub struct RequestMetrics;

impl RequestMetrics {
    pub fn record_response(stage: &'static str, status: u16) {
        ::metrics::counter!("harvest_responses_total", "stage" => stage, "status" => status.to_string())
            .increment(1);
    }

    pub fn record_retryable_failure() {
        ::metrics::counter!("harvest_request_retryable_failures_total").increment(1);
    }

    pub fn record_exhausted() {
        ::metrics::counter!("harvest_request_exhausted_total").increment(1);
    }
}

pub struct FetchMetrics;

impl FetchMetrics {
    pub fn record_page(records: usize) {
        ::metrics::counter!("harvest_fetch_pages_total").increment(1);
        ::metrics::histogram!("harvest_fetch_page_records").record(records as f64);
    }

    pub fn record_unit(outcome: &'static str) {
        ::metrics::counter!("harvest_fetch_units_total", "outcome" => outcome).increment(1);
    }
}

pub struct ExportMetrics;

impl ExportMetrics {
    pub fn record_chunk(rows: usize) {
        ::metrics::counter!("harvest_export_chunks_total").increment(1);
        ::metrics::counter!("harvest_export_rows_total").increment(rows as u64);
    }

    pub fn record_skipped_file() {
        ::metrics::counter!("harvest_export_skipped_files_total").increment(1);
    }
}

pub struct ImportMetrics;

impl ImportMetrics {
    pub fn record_rows(rows: usize) {
        ::metrics::counter!("harvest_import_rows_total").increment(rows as u64);
    }
}
