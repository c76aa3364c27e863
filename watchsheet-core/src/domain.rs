//! Domain types shared by every stage of the export: symbols, watchlist entries,
//! fundamentals records, output rows and the final table handed to publishers.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

/// Sentinel written wherever a value could not be resolved.
pub const NOT_AVAILABLE: &str = "N/A";

/// Output column order. Part of the published contract.
pub const COLUMNS: [&str; 5] = [
    "Name",
    "Symbol",
    "Price",
    "Marketcap Value",
    "Marketcap Unit",
];

/// A ticker symbol. Never empty; surrounding whitespace is stripped on parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Parse a raw provider string into a symbol. Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One instrument of the watchlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistEntry {
    pub symbol: Symbol,
    pub name: Option<String>,
}

/// Fundamentals for one symbol as returned by the provider.
///
/// Only the fields the export uses are kept; everything else in the provider
/// payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundamentalRecord {
    pub symbol: Option<Symbol>,
    pub name: Option<String>,
    /// Raw market capitalization, unparsed.
    pub market_cap: Option<String>,
}

/// Final denormalized record, one per fundamentals entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Marketcap Value")]
    pub marketcap_value: String,
    #[serde(rename = "Marketcap Unit")]
    pub marketcap_unit: String,
}

impl OutputRow {
    /// Cells in [`COLUMNS`] order.
    pub fn cells(&self) -> [&str; 5] {
        [
            &self.name,
            &self.symbol,
            &self.price,
            &self.marketcap_value,
            &self.marketcap_unit,
        ]
    }
}

/// BLAKE3 digest of a table's header and cells, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TableFingerprint(String);

impl TableFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The table handed to publishers: fixed columns plus ordered rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    rows: Vec<OutputRow>,
}

impl Table {
    pub fn new(rows: Vec<OutputRow>) -> Self {
        Self { rows }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &COLUMNS
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header row followed by every data row, as owned strings.
    pub fn values(&self) -> Vec<Vec<String>> {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(COLUMNS.iter().map(|c| c.to_string()).collect());
        for row in &self.rows {
            values.push(row.cells().iter().map(|c| c.to_string()).collect());
        }
        values
    }

    /// Deterministic content hash. Cells are joined with the ASCII unit
    /// separator and rows with the record separator so that no cell boundary
    /// can be shifted without changing the digest.
    pub fn fingerprint(&self) -> TableFingerprint {
        let mut hasher = blake3::Hasher::new();
        for record in self.values() {
            for cell in &record {
                hasher.update(cell.as_bytes());
                hasher.update(b"\x1f");
            }
            hasher.update(b"\x1e");
        }
        TableFingerprint(hasher.finalize().to_hex().to_string())
    }
}

impl From<Vec<OutputRow>> for Table {
    fn from(rows: Vec<OutputRow>) -> Self {
        Self::new(rows)
    }
}
