use crate::constants::{
    INTERNAL_TXN_ACTION, INTERNAL_TXN_PREFIX, NORMAL_TXN_ACTION, NORMAL_TXN_PREFIX,
};
use crate::error::{HarvestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Schema-free record as returned inside an API envelope
pub type Record = serde_json::Map<String, Value>;

/// Opaque key (a contract address) driving per-entity fetches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityIdentifier(String);

impl EntityIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier can be used as part of an output file name.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains(['/', '\\', '\0'])
            && !self.0.contains("..")
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Which transaction list the account API is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TxnKind {
    Normal,
    Internal,
}

impl TxnKind {
    pub fn action(self) -> &'static str {
        match self {
            TxnKind::Normal => NORMAL_TXN_ACTION,
            TxnKind::Internal => INTERNAL_TXN_ACTION,
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            TxnKind::Normal => NORMAL_TXN_PREFIX,
            TxnKind::Internal => INTERNAL_TXN_PREFIX,
        }
    }
}

/// Fixed part of a paged account API request
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub module: String,
    pub action: String,
    pub filter_key: String,
    pub start_block: u64,
    pub end_block: u64,
}

/// One page of one identifier's result set
#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub identifier: &'a EntityIdentifier,
    pub page_number: u32,
    pub page_size: u32,
    pub ordering: SortOrder,
}

impl PageRequest<'_> {
    /// Query pairs in the order the API expects them.
    pub fn query(&self, template: &RequestTemplate, api_key: &str) -> Vec<(String, String)> {
        vec![
            ("module".into(), template.module.clone()),
            ("action".into(), template.action.clone()),
            (template.filter_key.clone(), self.identifier.to_string()),
            ("startblock".into(), template.start_block.to_string()),
            ("endblock".into(), template.end_block.to_string()),
            ("page".into(), self.page_number.to_string()),
            ("offset".into(), self.page_size.to_string()),
            ("sort".into(), self.ordering.as_str().to_string()),
            ("apikey".into(), api_key.to_string()),
        ]
    }
}

/// `{status, message, result}` wrapper returned by the account API
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: Value,
}

impl Envelope {
    /// Records of this page. A non-array `result` carries an API error text
    /// (rate limit, invalid key) rather than data; a missing one is an error too.
    pub fn into_records(self) -> Result<Vec<Record>> {
        match self.result {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(HarvestError::Api {
                        message: format!("non-object record in result: {other}"),
                    }),
                })
                .collect(),
            Value::Null => Err(HarvestError::Api {
                message: format!("{} (no result)", self.message),
            }),
            other => Err(HarvestError::Api {
                message: format!("{} ({})", self.message, other),
            }),
        }
    }
}

/// Concatenated records of one identifier, in page order
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub identifier: EntityIdentifier,
    pub status: String,
    pub message: String,
    pub records: Vec<Record>,
}

/// Persisted unit of the fetcher, read back by the exporter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub identifier: EntityIdentifier,
    pub action: String,
    pub fetched_at: DateTime<Utc>,
    /// False when paging stopped on a failed page
    pub complete: bool,
    pub status: String,
    pub message: String,
    pub result: Vec<Record>,
}

impl StoredResult {
    pub fn from_fetch(fetch: FetchResult, action: &str, complete: bool) -> Self {
        Self {
            identifier: fetch.identifier,
            action: action.to_string(),
            fetched_at: Utc::now(),
            complete,
            status: fetch.status,
            message: fetch.message,
            result: fetch.records,
        }
    }
}
