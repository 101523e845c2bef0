pub mod config;
pub mod constants;
pub mod error;
pub mod identifiers;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod retry;
pub mod types;

// Port traits and their production adapters
pub mod app;
pub mod infra;
