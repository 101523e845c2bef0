use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error: {message}")]
    Api { message: String },
}

pub type Result<T> = std::result::Result<T, HarvestError>;
