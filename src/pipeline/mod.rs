// Harvesting stages, each runnable on its own and connected only through files

pub mod exporter;
pub mod fetcher;
pub mod importer;
pub mod lister;
pub mod source_code;

pub use exporter::{BatchExporter, ExportBuffer, TableSchema};
pub use fetcher::{FetchOutcome, FetchSettings, PaginatedFetcher};
pub use importer::ChunkImporter;
pub use lister::{parse_listing_dir, ListSettings, Lister};
pub use source_code::{SourceFetcher, SourceSettings};
