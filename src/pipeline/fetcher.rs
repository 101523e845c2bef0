//! Paginated account-API fetcher.
//!
//! For each identifier, pages are requested from 1 upward until a page comes
//! back empty. Results are concatenated in page order and persisted as one
//! [`StoredResult`] per identifier.

use crate::app::ports::{HttpClientPort, HttpGetResult, SleeperPort};
use crate::config::ApiConfig;
use crate::error::{HarvestError, Result};
use crate::metrics::{FetchMetrics, RequestMetrics};
use crate::retry::{try_request, RetryPolicy};
use crate::types::{
    EntityIdentifier, Envelope, FetchResult, PageRequest, Record, RequestTemplate, SortOrder,
    StoredResult,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub base_url: String,
    pub api_key: String,
    pub template: RequestTemplate,
    pub page_size: u32,
    pub sort: SortOrder,
    pub retry: RetryPolicy,
    /// Wait after every response, keeps us under the upstream request ceiling
    pub pacing: Duration,
}

impl FetchSettings {
    pub fn from_config(api: &ApiConfig, action: &str) -> Self {
        Self {
            base_url: api.base_url.clone(),
            api_key: api.api_key.clone(),
            template: RequestTemplate {
                module: api.module.clone(),
                action: action.to_string(),
                filter_key: "address".to_string(),
                start_block: api.start_block,
                end_block: api.end_block,
            },
            page_size: api.page_size,
            sort: api.sort,
            retry: RetryPolicy::fixed(
                api.max_attempts,
                api.timeout(),
                Duration::from_millis(api.cooldown_ms),
            ),
            pacing: Duration::from_millis(api.pacing_ms),
        }
    }
}

/// What happened to one identifier
#[derive(Debug)]
pub enum FetchOutcome {
    /// Paged to an empty page
    Complete(FetchResult),
    /// A later page failed; records before it are kept
    Partial { result: FetchResult, failed_page: u32 },
    /// First page had no records
    Empty,
    /// First page failed
    Abandoned { reason: String },
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub written: Vec<PathBuf>,
    pub partial: Vec<EntityIdentifier>,
    pub empty: Vec<EntityIdentifier>,
    pub abandoned: Vec<EntityIdentifier>,
}

enum PageOutcome {
    Records { status: String, message: String, records: Vec<Record> },
    Failed(String),
}

pub struct PaginatedFetcher<'a> {
    http: &'a dyn HttpClientPort,
    sleeper: &'a dyn SleeperPort,
    settings: FetchSettings,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(http: &'a dyn HttpClientPort, sleeper: &'a dyn SleeperPort, settings: FetchSettings) -> Self {
        Self { http, sleeper, settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn request_page(&self, identifier: &EntityIdentifier, page: u32) -> Result<Option<HttpGetResult>> {
        let req = PageRequest {
            identifier,
            page_number: page,
            page_size: self.settings.page_size,
            ordering: self.settings.sort,
        };
        let query = req.query(&self.settings.template, &self.settings.api_key);
        let unit = format!("{identifier} page {page}");

        let resp = try_request(&self.settings.retry, self.sleeper, &unit, |timeout| {
            self.http.get(&self.settings.base_url, &query, timeout)
        })
        .await
        .map_err(|e| HarvestError::Transport(e.to_string()))?;

        if let Some(ref r) = resp {
            RequestMetrics::record_response("fetch", r.status);
            self.sleeper.sleep(self.settings.pacing).await;
        }
        Ok(resp)
    }

    async fn fetch_page(&self, identifier: &EntityIdentifier, page: u32) -> PageOutcome {
        let resp = match self.request_page(identifier, page).await {
            Ok(Some(resp)) => resp,
            Ok(None) => return PageOutcome::Failed("time out, reached request limit".to_string()),
            Err(e) => return PageOutcome::Failed(e.to_string()),
        };
        if !resp.is_ok() {
            return PageOutcome::Failed(format!("status code {}", resp.status));
        }
        let envelope: Envelope = match serde_json::from_slice(&resp.bytes) {
            Ok(env) => env,
            Err(e) => return PageOutcome::Failed(format!("malformed envelope: {e}")),
        };
        let status = envelope.status.clone();
        let message = envelope.message.clone();
        match envelope.into_records() {
            Ok(records) => {
                FetchMetrics::record_page(records.len());
                PageOutcome::Records { status, message, records }
            }
            Err(e) => PageOutcome::Failed(e.to_string()),
        }
    }

    /// Collects every page of `identifier` until an empty page.
    #[instrument(skip_all, fields(identifier = %identifier))]
    pub async fn fetch_identifier(&self, identifier: &EntityIdentifier) -> FetchOutcome {
        let mut page = 1;
        let mut result = match self.fetch_page(identifier, page).await {
            PageOutcome::Failed(reason) => {
                warn!("Contract at {} failed on page 1: {}, passed", identifier, reason);
                return FetchOutcome::Abandoned { reason };
            }
            PageOutcome::Records { records, .. } if records.is_empty() => {
                info!("No transaction at {}, passed", identifier);
                return FetchOutcome::Empty;
            }
            PageOutcome::Records { status, message, records } => FetchResult {
                identifier: identifier.clone(),
                status,
                message,
                records,
            },
        };

        loop {
            page += 1;
            match self.fetch_page(identifier, page).await {
                PageOutcome::Records { records, .. } if records.is_empty() => break,
                PageOutcome::Records { records, .. } => {
                    debug!(page, "Appending {} records", records.len());
                    result.records.extend(records);
                }
                PageOutcome::Failed(reason) => {
                    warn!("Contract at {} page {} failed: {}, keeping {} records", identifier, page, reason, result.records.len());
                    return FetchOutcome::Partial { result, failed_page: page };
                }
            }
        }
        FetchOutcome::Complete(result)
    }

    /// Fetches every identifier in order, writing `<prefix><identifier>.json`
    /// into `output_dir` for each one that has data. One identifier failing
    /// never stops the run.
    #[instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    pub async fn run(
        &self,
        identifiers: &[EntityIdentifier],
        output_dir: &Path,
        prefix: &str,
    ) -> Result<FetchReport> {
        fs::create_dir_all(output_dir)?;
        let mut report = FetchReport::default();
        let action = self.settings.template.action.clone();

        for (i, identifier) in identifiers.iter().enumerate() {
            if !identifier.is_file_safe() {
                warn!("Identifier '{}' cannot name an output file, passed", identifier);
                FetchMetrics::record_unit("abandoned");
                report.abandoned.push(identifier.clone());
                continue;
            }
            let (stored, label) = match self.fetch_identifier(identifier).await {
                FetchOutcome::Complete(result) => (StoredResult::from_fetch(result, &action, true), "complete"),
                FetchOutcome::Partial { result, .. } => {
                    report.partial.push(identifier.clone());
                    (StoredResult::from_fetch(result, &action, false), "partial")
                }
                FetchOutcome::Empty => {
                    FetchMetrics::record_unit("empty");
                    report.empty.push(identifier.clone());
                    continue;
                }
                FetchOutcome::Abandoned { .. } => {
                    FetchMetrics::record_unit("abandoned");
                    report.abandoned.push(identifier.clone());
                    continue;
                }
            };
            FetchMetrics::record_unit(label);

            let path = output_dir.join(format!("{prefix}{identifier}.json"));
            write_stored(&path, &stored)?;
            info!("[{}/{}] {} records for {}", i + 1, identifiers.len(), stored.result.len(), identifier);
            report.written.push(path);
        }

        info!(
            "Fetch done: {} written ({} partial), {} empty, {} abandoned",
            report.written.len(),
            report.partial.len(),
            report.empty.len(),
            report.abandoned.len()
        );
        Ok(report)
    }
}

fn write_stored(path: &Path, stored: &StoredResult) -> Result<()> {
    let mut writer = std::io::BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(&mut writer, stored)?;
    writer.flush()?;
    Ok(())
}

pub fn read_stored(path: &Path) -> Result<StoredResult> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}
