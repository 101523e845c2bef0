//! Endpoint and naming constants shared by the harvesting stages.
//! Defaults in `config` are built from these.

// Etherscan endpoints
pub const ETHERSCAN_API_URL: &str = "http://api.etherscan.io/api";
pub const VERIFIED_LISTING_URL: &str = "https://etherscan.io/contractsVerified/";
pub const CONTRACT_PAGE_URL: &str = "https://etherscan.io/address/";

// Account API actions
pub const ACCOUNT_MODULE: &str = "account";
pub const NORMAL_TXN_ACTION: &str = "txlist";
pub const INTERNAL_TXN_ACTION: &str = "txlistinternal";

// Output unit prefixes
pub const NORMAL_TXN_PREFIX: &str = "nor_txn_";
pub const INTERNAL_TXN_PREFIX: &str = "int_txn_";
pub const LISTING_PAGE_PREFIX: &str = "verified_contracts_";
pub const CHUNK_PREFIX: &str = "chunk_";

/// Width of an address token (`0x` plus 40 hex digits)
pub const ADDRESS_WIDTH: usize = 42;

/// Column of the identifier CSV holding contract addresses
pub const ADDRESS_COLUMN: &str = "Address";

/// Columns written by the listing parser, in listing-table order
pub const LISTING_COLUMNS: [&str; 6] = [
    "Address",
    "ContractName",
    "Compiler",
    "Balance",
    "TxCount",
    "DateVerified",
];

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/64.0.3282.140 Safari/537.36";
