use crate::constants::{ADDRESS_COLUMN, ADDRESS_WIDTH};
use crate::error::{HarvestError, Result};
use crate::types::EntityIdentifier;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{info, warn};

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());

/// Loads the ordered identifier list from a CSV file.
///
/// Each cell of `column` is cut to `ADDRESS_WIDTH` characters; listing rows
/// sometimes carry trailing text after the address. Cells that still do not
/// look like an address are kept (identifiers are opaque) but logged; cells
/// that cannot be part of a file name are skipped.
pub fn load_identifiers(path: &Path, column: &str) -> Result<Vec<EntityIdentifier>> {
    let mut reader = csv::Reader::from_path(path)?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| {
            HarvestError::MissingField(format!("column '{}' in {}", column, path.display()))
        })?;

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let Some(cell) = record.get(idx) else { continue };
        let token: String = cell.trim().chars().take(ADDRESS_WIDTH).collect();
        if token.is_empty() {
            continue;
        }
        let id = EntityIdentifier::new(token);
        if !id.is_file_safe() {
            warn!(row = line + 1, "Identifier '{}' cannot name an output file, skipped", id);
            continue;
        }
        if !ADDRESS_RE.is_match(id.as_str()) {
            warn!(row = line + 1, "Identifier '{}' does not look like an address", id);
        }
        out.push(id);
    }
    info!("Loaded {} identifiers from {}", out.len(), path.display());
    Ok(out)
}

pub fn load_addresses(path: &Path) -> Result<Vec<EntityIdentifier>> {
    load_identifiers(path, ADDRESS_COLUMN)
}

/// Inclusive `[start, end]` slice of the identifier list, clamped to its length.
pub fn select_range(ids: &[EntityIdentifier], start: usize, end: Option<usize>) -> &[EntityIdentifier] {
    if ids.is_empty() || start >= ids.len() {
        return &[];
    }
    let last = end.unwrap_or(ids.len() - 1).min(ids.len() - 1);
    if last < start {
        return &[];
    }
    &ids[start..=last]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_truncates_to_address_width() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("verified_contracts.csv");
        let addr = "0x0123456789abcdef0123456789abcdef01234567";
        fs::write(
            &path,
            format!("Address,ContractName\n{addr}  (proxy),Token\n,Empty\n0xdead,Short\n"),
        )
        .unwrap();

        let ids = load_addresses(&path).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].as_str(), addr);
        assert_eq!(ids[1].as_str(), "0xdead");
    }

    #[test]
    fn test_load_skips_path_like_tokens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "Address\n../../escape\n0xabc/def\n0xok\n").unwrap();

        let ids = load_addresses(&path).unwrap();
        assert_eq!(ids, vec![EntityIdentifier::new("0xok")]);
    }

    #[test]
    fn test_missing_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        fs::write(&path, "Name\nfoo\n").unwrap();

        assert!(matches!(load_addresses(&path), Err(HarvestError::MissingField(_))));
    }

    #[test]
    fn test_select_range_is_inclusive_and_clamped() {
        let ids: Vec<_> = (0..5).map(|i| EntityIdentifier::new(format!("id{i}"))).collect();

        assert_eq!(select_range(&ids, 1, Some(3)).len(), 3);
        assert_eq!(select_range(&ids, 3, Some(99)).len(), 2);
        assert_eq!(select_range(&ids, 0, None).len(), 5);
        assert!(select_range(&ids, 5, None).is_empty());
        assert!(select_range(&ids, 3, Some(2)).is_empty());
    }
}
