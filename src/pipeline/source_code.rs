use crate::app::ports::{HttpClientPort, SleeperPort};
use crate::config::SourceConfig;
use crate::error::Result;
use crate::metrics::RequestMetrics;
use crate::parser::{PageExtractor, SourceCodeExtractor};
use crate::retry::{try_request, RetryPolicy};
use crate::types::EntityIdentifier;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub pacing: Duration,
    /// Every this many identifiers (by absolute index) wait `long_pause` instead
    pub long_pause_every: usize,
    pub long_pause: Duration,
    pub output_dir: PathBuf,
}

impl From<&SourceConfig> for SourceSettings {
    fn from(cfg: &SourceConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            retry: RetryPolicy::backoff(
                cfg.max_attempts,
                Duration::from_millis(cfg.initial_timeout_ms),
                cfg.backoff_factor,
                Duration::from_millis(cfg.max_timeout_ms),
                Duration::from_millis(cfg.cooldown_ms),
            ),
            pacing: Duration::from_millis(cfg.pacing_ms),
            long_pause_every: cfg.long_pause_every,
            long_pause: Duration::from_millis(cfg.long_pause_ms),
            output_dir: cfg.output_dir.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceReport {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<EntityIdentifier>,
}

/// Downloads the verified source of each contract from its address page.
pub struct SourceFetcher<'a> {
    http: &'a dyn HttpClientPort,
    sleeper: &'a dyn SleeperPort,
    extractor: SourceCodeExtractor,
    settings: SourceSettings,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(http: &'a dyn HttpClientPort, sleeper: &'a dyn SleeperPort, settings: SourceSettings) -> Self {
        Self { http, sleeper, extractor: SourceCodeExtractor::default(), settings }
    }

    async fn fetch_one(&self, identifier: &EntityIdentifier) -> Result<Option<String>> {
        let url = format!("{}{}#code", self.settings.base_url, identifier);
        let unit = identifier.to_string();
        let resp = match try_request(&self.settings.retry, self.sleeper, &unit, |timeout| {
            self.http.get(&url, &[], timeout)
        })
        .await
        {
            Ok(Some(resp)) => resp,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Contract at {} failed: {}", identifier, e);
                return Ok(None);
            }
        };
        RequestMetrics::record_response("source", resp.status);
        if !resp.is_ok() {
            warn!("Contract at {} failed with status {}, skipped", identifier, resp.status);
            return Ok(None);
        }
        let source = self.extractor.extract(&resp.text())?;
        if source.is_none() {
            warn!("Contract at {} failed, no source block on page", identifier);
        }
        Ok(source)
    }

    /// `first_index` is the absolute list index of `identifiers[0]`; it keeps
    /// the long-pause cadence stable when a run is restarted mid-list.
    #[instrument(skip(self, identifiers), fields(count = identifiers.len()))]
    pub async fn run(&self, identifiers: &[EntityIdentifier], first_index: usize) -> Result<SourceReport> {
        fs::create_dir_all(&self.settings.output_dir)?;
        let mut report = SourceReport::default();

        for (offset, identifier) in identifiers.iter().enumerate() {
            let index = first_index + offset;
            if !identifier.is_file_safe() {
                warn!("Identifier '{}' cannot name an output file, skipped", identifier);
                report.failed.push(identifier.clone());
                continue;
            }
            match self.fetch_one(identifier).await? {
                Some(source) => {
                    let path = self.settings.output_dir.join(format!("{identifier}.sol"));
                    fs::write(&path, source)?;
                    info!(index, "Saved source of {}", identifier);
                    report.saved.push(path);
                }
                None => report.failed.push(identifier.clone()),
            }

            let long_pause = self.settings.long_pause_every > 0 && index % self.settings.long_pause_every == 0;
            let wait = if long_pause { self.settings.long_pause } else { self.settings.pacing };
            self.sleeper.sleep(wait).await;
        }

        info!("Source done: {} saved, {} failed", report.saved.len(), report.failed.len());
        Ok(report)
    }
}
