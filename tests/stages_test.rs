mod common;

use common::{ok_body, status, txn, RecordingSleeper, ScriptedHttp};
use etherscan_harvester::app::ports::FetchError;
use etherscan_harvester::identifiers::load_addresses;
use etherscan_harvester::parser::ListingTableExtractor;
use etherscan_harvester::pipeline::{
    parse_listing_dir, BatchExporter, ChunkImporter, ListSettings, Lister, SourceFetcher,
    SourceSettings, TableSchema,
};
use etherscan_harvester::retry::RetryPolicy;
use etherscan_harvester::types::{EntityIdentifier, StoredResult};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

const ADDR_A: &str = "0x1111111111111111111111111111111111111111";
const ADDR_B: &str = "0x2222222222222222222222222222222222222222";

fn listing_page(rows: &[(&str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(addr, name)| {
            format!("<tr><td>{addr}</td><td>{name}</td><td>v0.4.19</td><td>0 Ether</td><td>12</td><td>2/20/2018</td></tr>")
        })
        .collect();
    format!(r#"<html><body><table class="table table-hover "><tbody>{body}</tbody></table></body></html>"#)
}

#[tokio::test]
async fn test_lister_saves_pages_and_skips_failures() {
    let dir = tempdir().unwrap();
    let http = ScriptedHttp::new(|url, _, _| {
        if url.ends_with("/3") {
            status(503)
        } else if url.ends_with("/4") {
            Err(FetchError::Timeout(Duration::from_secs(1)))
        } else {
            ok_body(format!("<html>{url}</html>"))
        }
    });
    let sleeper = RecordingSleeper::default();
    let settings = ListSettings {
        base_url: "https://listing.test/contractsVerified/".into(),
        timeout: Duration::from_secs(1),
        delay: Duration::from_secs(5),
        output_dir: dir.path().to_path_buf(),
        file_prefix: "verified_contracts_".into(),
    };
    let lister = Lister::new(&http, &sleeper, settings);

    let report = lister.run(2, 5).await.unwrap();

    assert_eq!(report.saved.len(), 2);
    assert_eq!(report.skipped_pages, vec![3, 4]);
    // single attempt per page, no retry
    assert_eq!(http.calls().len(), 4);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 3]);
    let saved = fs::read_to_string(dir.path().join("verified_contracts_5.html")).unwrap();
    assert_eq!(saved, "<html>https://listing.test/contractsVerified/5</html>");
    assert!(!dir.path().join("verified_contracts_3.html").exists());
}

#[test]
fn test_parse_listing_feeds_identifier_source() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("verified_contracts_1.html"),
        listing_page(&[(ADDR_A, "TokenA"), (ADDR_B, "TokenB")]),
    )
    .unwrap();
    // listing shifted between requests: ADDR_B shows up again
    fs::write(dir.path().join("verified_contracts_2.html"), listing_page(&[(ADDR_B, "TokenB")])).unwrap();
    fs::write(dir.path().join("notes.html"), listing_page(&[("0xignored", "Nope")])).unwrap();
    let csv_path = dir.path().join("verified_contracts.csv");

    let rows = parse_listing_dir(dir.path(), "verified_contracts", &csv_path, &ListingTableExtractor::default())
        .unwrap();

    assert_eq!(rows, 2);
    let ids = load_addresses(&csv_path).unwrap();
    assert_eq!(ids, vec![EntityIdentifier::new(ADDR_A), EntityIdentifier::new(ADDR_B)]);
}

#[tokio::test]
async fn test_source_fetcher_backs_off_and_saves() {
    let dir = tempdir().unwrap();
    let http = ScriptedHttp::new(|url, _, attempt| {
        if url.contains(ADDR_A) && attempt < 3 {
            Err(FetchError::Timeout(Duration::from_millis(500)))
        } else if url.contains(ADDR_A) {
            ok_body(r#"<pre class="js-sourcecopyarea">contract A {}</pre>"#)
        } else {
            status(404)
        }
    });
    let sleeper = RecordingSleeper::default();
    let settings = SourceSettings {
        base_url: "https://etherscan.test/address/".into(),
        retry: RetryPolicy::backoff(
            4,
            Duration::from_millis(500),
            2,
            Duration::from_secs(6),
            Duration::from_secs(5),
        ),
        pacing: Duration::from_secs(3),
        long_pause_every: 500,
        long_pause: Duration::from_secs(100),
        output_dir: dir.path().to_path_buf(),
    };
    let fetcher = SourceFetcher::new(&http, &sleeper, settings);
    let ids = vec![EntityIdentifier::new(ADDR_A), EntityIdentifier::new(ADDR_B)];

    let report = fetcher.run(&ids, 499).await.unwrap();

    assert_eq!(report.failed, vec![EntityIdentifier::new(ADDR_B)]);
    let saved = fs::read_to_string(dir.path().join(format!("{ADDR_A}.sol"))).unwrap();
    assert_eq!(saved, "contract A {}");

    let timeouts: Vec<Duration> = http
        .calls()
        .iter()
        .filter(|c| c.url.contains(ADDR_A))
        .map(|c| c.timeout)
        .collect();
    assert_eq!(
        timeouts,
        vec![Duration::from_millis(500), Duration::from_secs(1), Duration::from_secs(2)]
    );
    // two cooldowns, pacing after index 499, long pause after index 500
    assert_eq!(
        sleeper.sleeps(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(5),
            Duration::from_secs(3),
            Duration::from_secs(100),
        ]
    );
}

fn write_result(dir: &Path, name: &str, identifier: &str, count: usize) {
    let stored = StoredResult {
        identifier: EntityIdentifier::new(identifier),
        action: "txlist".into(),
        fetched_at: chrono::Utc::now(),
        complete: true,
        status: "1".into(),
        message: "OK".into(),
        result: (0..count)
            .map(|i| match txn(1, i) {
                Value::Object(map) => map,
                _ => unreachable!(),
            })
            .collect(),
    };
    fs::write(dir.join(name), serde_json::to_vec(&stored).unwrap()).unwrap();
}

#[test]
fn test_export_chunks_then_import() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_result(input.path(), "nor_txn_a.json", ADDR_A, 4);
    write_result(input.path(), "nor_txn_b.json", ADDR_B, 5);
    write_result(input.path(), "nor_txn_c.json", "0xccc", 3);
    write_result(input.path(), "nor_txn_d.json", "0xddd", 12);
    fs::write(input.path().join("nor_txn_e.json"), b"{ truncated").unwrap();
    fs::write(input.path().join("readme.txt"), b"not a result").unwrap();

    let exporter = BatchExporter::new(TableSchema::default(), 10);
    let report = exporter.run(input.path(), output.path()).unwrap();

    // a=4, b=5 buffered (9); c=3 would pass 10 -> flush 9; d=12 oversized -> own chunk; c flushed at end
    let sizes: Vec<usize> = report.chunks.iter().map(|c| c.rows).collect();
    assert_eq!(sizes, vec![9, 12, 3]);
    assert_eq!(report.total_rows, 24);
    assert_eq!(report.files_read, 4);
    assert_eq!(report.skipped_files.len(), 1);

    let mut reader = csv::Reader::from_path(output.path().join("chunk_0.csv")).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, TableSchema::default().header());
    let first = reader.records().next().unwrap().unwrap();
    assert_eq!(&first[0], "0xp1i0");
    assert_eq!(&first[1], ADDR_A);

    let db = output.path().join("ethereum.db");
    let mut importer = ChunkImporter::open(&db, "transactions", TableSchema::default()).unwrap();
    let imported = importer.import_dir(output.path()).unwrap();
    assert_eq!(imported, 24);
    assert_eq!(importer.row_count().unwrap(), 24);

    let (block, value): (i64, f64) = importer
        .connection()
        .query_row(
            "SELECT blockNumber, value FROM transactions WHERE add_contract = ?1 ORDER BY rowid LIMIT 1",
            [ADDR_B],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(block, 11_000);
    assert_eq!(value, 1e21);
}

#[test]
fn test_reexport_replaces_previous_chunks() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    write_result(input.path(), "nor_txn_a.json", ADDR_A, 6);
    write_result(input.path(), "nor_txn_b.json", ADDR_B, 6);
    write_result(input.path(), "nor_txn_c.json", "0xccc", 6);
    let exporter = BatchExporter::new(TableSchema::default(), 10);

    let first = exporter.run(input.path(), output.path()).unwrap();
    assert_eq!(first.chunks.len(), 3);

    fs::remove_file(input.path().join("nor_txn_c.json")).unwrap();
    let second = exporter.run(input.path(), output.path()).unwrap();
    assert_eq!(second.chunks.len(), 2);
    assert_eq!(second.total_rows, 12);
    assert!(!output.path().join("chunk_2.csv").exists());

    let db = output.path().join("ethereum.db");
    let mut importer = ChunkImporter::open(&db, "transactions", TableSchema::default()).unwrap();
    assert_eq!(importer.import_dir(output.path()).unwrap(), 12);
}
