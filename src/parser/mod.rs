//! Extractors for the two Etherscan page layouts the harvester reads.
//!
//! Each extractor knows one selector and returns plain strings. Selectors
//! are fields so a layout change is a config edit.

use crate::error::{HarvestError, Result};
use scraper::{Html, Selector};

/// Pulls structured output out of a rendered page.
pub trait PageExtractor {
    type Output;

    fn extract(&self, html: &str) -> Result<Self::Output>;
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Config(format!("bad selector '{css}': {e:?}")))
}

/// Rows of the verified-contracts listing table, one `Vec` of cell texts per
/// `<tr>`. Cell text is trimmed and empty cells are dropped.
pub struct ListingTableExtractor {
    pub row_selector: String,
}

impl Default for ListingTableExtractor {
    fn default() -> Self {
        Self { row_selector: "table.table-hover tbody tr".to_string() }
    }
}

impl PageExtractor for ListingTableExtractor {
    type Output = Vec<Vec<String>>;

    fn extract(&self, html: &str) -> Result<Self::Output> {
        let document = Html::parse_document(html);
        let rows = selector(&self.row_selector)?;
        let cells = selector("td")?;

        let out = document
            .select(&rows)
            .map(|row| {
                row.select(&cells)
                    .map(|td| td.text().collect::<String>().trim().to_string())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();
        Ok(out)
    }
}

/// Contract source block of an address page, `None` when the page has none
/// (unverified contract or a changed layout).
pub struct SourceCodeExtractor {
    pub block_selector: String,
}

impl Default for SourceCodeExtractor {
    fn default() -> Self {
        Self { block_selector: "pre.js-sourcecopyarea".to_string() }
    }
}

impl PageExtractor for SourceCodeExtractor {
    type Output = Option<String>;

    fn extract(&self, html: &str) -> Result<Self::Output> {
        let document = Html::parse_document(html);
        let block = selector(&self.block_selector)?;
        Ok(document.select(&block).next().map(|el| el.text().collect::<String>()))
    }
}
