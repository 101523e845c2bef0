use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Instrument};

use etherscan_harvester::config::{Config, DEFAULT_CONFIG_PATH};
use etherscan_harvester::identifiers::{load_addresses, select_range};
use etherscan_harvester::infra::http_client::ReqwestHttp;
use etherscan_harvester::infra::sleeper::TokioSleeper;
use etherscan_harvester::parser::ListingTableExtractor;
use etherscan_harvester::pipeline::{
    parse_listing_dir, BatchExporter, ChunkImporter, FetchSettings, ListSettings, Lister,
    PaginatedFetcher, SourceFetcher, SourceSettings, TableSchema,
};
use etherscan_harvester::types::TxnKind;
use etherscan_harvester::{logging, metrics};

#[derive(Parser)]
#[command(name = "etherscan_harvester")]
#[command(about = "Harvest verified contracts and their transactions from Etherscan")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save verified-contract listing pages
    List {
        #[arg(long)]
        start: Option<u32>,
        #[arg(long)]
        end: Option<u32>,
    },
    /// Turn saved listing pages into the identifier CSV
    ParseListing {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Page through the account API for each contract
    Fetch {
        /// Transaction list to fetch; both when omitted
        #[arg(long, value_enum)]
        kind: Option<TxnKind>,
        /// First identifier index (inclusive)
        #[arg(long)]
        start: Option<usize>,
        /// Last identifier index (inclusive)
        #[arg(long)]
        end: Option<usize>,
    },
    /// Download verified source code for each contract
    Source {
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        end: Option<usize>,
    },
    /// Fold fetched results into CSV chunks
    Export {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// Load CSV chunks into the SQLite table
    Import {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

async fn run_fetch(
    config: &Config,
    kinds: &[TxnKind],
    start: usize,
    end: Option<usize>,
) -> anyhow::Result<()> {
    let identifiers = load_addresses(&config.fetch.identifiers_csv)
        .with_context(|| format!("loading {}", config.fetch.identifiers_csv.display()))?;
    let selected = select_range(&identifiers, start, end);
    println!("number of contracts to be fetched: {}", selected.len());

    let http = ReqwestHttp::new()?;
    let sleeper = TokioSleeper;

    for kind in kinds {
        let output_dir = match kind {
            TxnKind::Normal => &config.fetch.normal_dir,
            TxnKind::Internal => &config.fetch.internal_dir,
        };
        let settings = FetchSettings::from_config(&config.api, kind.action());
        let fetcher = PaginatedFetcher::new(&http, &sleeper, settings);

        println!("Getting {:?} txns of smart contracts ......", kind);
        let report = fetcher
            .run(selected, output_dir, kind.file_prefix())
            .instrument(tracing::info_span!("fetch", action = kind.action()))
            .await?;
        println!(
            "   written: {}  partial: {}  empty: {}  abandoned: {}",
            report.written.len(),
            report.partial.len(),
            report.empty.len(),
            report.abandoned.len()
        );
        for id in &report.abandoned {
            println!("   - failed: {}", id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::List { start, end } => {
            let start = start.unwrap_or(config.listing.start_page);
            let end = end.unwrap_or(config.listing.end_page);
            let http = ReqwestHttp::new()?;
            let sleeper = TokioSleeper;
            let lister = Lister::new(&http, &sleeper, ListSettings::from(&config.listing));
            let report = lister.run(start, end).await?;
            println!("saved {} pages, skipped {:?}", report.saved.len(), report.skipped_pages);
        }
        Commands::ParseListing { dir, output } => {
            let dir = dir.unwrap_or_else(|| config.listing.output_dir.clone());
            let output = output.unwrap_or_else(|| config.listing.csv_path.clone());
            let rows = parse_listing_dir(
                &dir,
                &config.listing.file_prefix,
                &output,
                &ListingTableExtractor::default(),
            )?;
            println!("wrote {} contracts to {}", rows, output.display());
        }
        Commands::Fetch { kind, start, end } => {
            let kinds = match kind {
                Some(kind) => vec![kind],
                None => vec![TxnKind::Normal, TxnKind::Internal],
            };
            let start = start.unwrap_or(config.fetch.start_index);
            let end = end.or(config.fetch.end_index);
            run_fetch(&config, &kinds, start, end).await?;
        }
        Commands::Source { start, end } => {
            let identifiers = load_addresses(&config.fetch.identifiers_csv)?;
            let start = start.unwrap_or(config.fetch.start_index);
            let selected = select_range(&identifiers, start, end.or(config.fetch.end_index));
            println!("number of contracts to be downloaded: {}", selected.len());

            let http = ReqwestHttp::with_user_agent(&config.source.user_agent)?;
            let sleeper = TokioSleeper;
            let fetcher = SourceFetcher::new(&http, &sleeper, SourceSettings::from(&config.source));
            let report = fetcher.run(selected, start).await?;
            println!("saved {} sources, {} failed", report.saved.len(), report.failed.len());
        }
        Commands::Export { input, output, max_rows } => {
            let input = input.unwrap_or_else(|| config.export.input_dir.clone());
            let output = output.unwrap_or_else(|| config.export.output_dir.clone());
            let max_rows = max_rows.unwrap_or(config.export.max_rows);
            println!("concatenate data to csv...");
            let exporter = BatchExporter::new(TableSchema::default(), max_rows);
            let report = exporter.run(&input, &output)?;
            println!("done. {} rows in {} chunks", report.total_rows, report.chunks.len());
            if !report.skipped_files.is_empty() {
                warn!("{} result files could not be read", report.skipped_files.len());
            }
        }
        Commands::Import { input, database } => {
            let input = input.unwrap_or_else(|| config.export.output_dir.clone());
            let database = database.unwrap_or_else(|| config.import.database.clone());
            let mut importer = ChunkImporter::open(&database, &config.import.table, TableSchema::default())?;
            let rows = importer.import_dir(&input)?;
            info!("Table {} now holds {} rows", config.import.table, importer.row_count()?);
            println!("imported {} rows into {}", rows, database.display());
        }
    }

    if let Some(path) = &config.metrics.snapshot_path {
        metrics::write_snapshot(path)?;
    }
    Ok(())
}
