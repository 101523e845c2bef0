use crate::app::ports::{HttpClientPort, SleeperPort};
use crate::config::ListingConfig;
use crate::error::Result;
use crate::metrics::RequestMetrics;
use crate::parser::{ListingTableExtractor, PageExtractor};
use crate::constants::LISTING_COLUMNS;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ListSettings {
    pub base_url: String,
    pub timeout: Duration,
    /// Wait between successive listing pages
    pub delay: Duration,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl From<&ListingConfig> for ListSettings {
    fn from(cfg: &ListingConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            delay: Duration::from_millis(cfg.delay_ms),
            output_dir: cfg.output_dir.clone(),
            file_prefix: cfg.file_prefix.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ListReport {
    pub saved: Vec<PathBuf>,
    pub skipped_pages: Vec<u32>,
}

/// Saves listing pages verbatim, one file per page number.
pub struct Lister<'a> {
    http: &'a dyn HttpClientPort,
    sleeper: &'a dyn SleeperPort,
    settings: ListSettings,
}

impl<'a> Lister<'a> {
    pub fn new(http: &'a dyn HttpClientPort, sleeper: &'a dyn SleeperPort, settings: ListSettings) -> Self {
        Self { http, sleeper, settings }
    }

    fn page_path(&self, page: u32) -> PathBuf {
        self.settings
            .output_dir
            .join(format!("{}{}.html", self.settings.file_prefix, page))
    }

    /// Fetches pages `start..=end` once each. Failed pages are skipped.
    #[instrument(skip(self))]
    pub async fn run(&self, start: u32, end: u32) -> Result<ListReport> {
        fs::create_dir_all(&self.settings.output_dir)?;
        let mut report = ListReport::default();

        for page in start..=end {
            let url = format!("{}{}", self.settings.base_url, page);
            match self.http.get(&url, &[], self.settings.timeout).await {
                Ok(resp) => {
                    RequestMetrics::record_response("list", resp.status);
                    info!(page, status = resp.status, "Fetched listing page");
                    if resp.is_ok() {
                        let path = self.page_path(page);
                        fs::write(&path, &resp.bytes)?;
                        report.saved.push(path);
                    } else {
                        warn!(page, status = resp.status, "Listing page {} failed, skipped", page);
                        report.skipped_pages.push(page);
                    }
                }
                Err(e) => {
                    warn!(page, "Listing page {} failed: {}, skipped", page, e);
                    report.skipped_pages.push(page);
                }
            }

            if page < end {
                self.sleeper.sleep(self.settings.delay).await;
            }
        }

        info!(
            "Listing done: {} saved, {} skipped",
            report.saved.len(),
            report.skipped_pages.len()
        );
        Ok(report)
    }
}

/// Parses every saved listing page in `dir` into one identifier CSV.
///
/// Only files named `<prefix>*.html` are read, in file-name order. Duplicate
/// rows (the listing shifts while it is being paged) keep their first
/// occurrence. Returns the number of rows written.
#[instrument(skip(extractor))]
pub fn parse_listing_dir(
    dir: &Path,
    prefix: &str,
    output: &Path,
    extractor: &ListingTableExtractor,
) -> Result<usize> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(prefix) && n.ends_with(".html"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut seen = HashSet::new();
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(output)?;
    writer.write_record(LISTING_COLUMNS)?;

    let mut written = 0;
    for path in &files {
        let html = fs::read_to_string(path)?;
        let rows = extractor.extract(&html)?;
        for row in rows {
            if row.len() != LISTING_COLUMNS.len() {
                warn!(file = %path.display(), "Listing row has {} cells, expected {}", row.len(), LISTING_COLUMNS.len());
            }
            if seen.insert(row.clone()) {
                writer.write_record(&row)?;
                written += 1;
            }
        }
    }
    writer.flush()?;
    info!("Parsed {} listing files into {} rows", files.len(), written);
    Ok(written)
}
