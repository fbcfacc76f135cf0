// 📒 Historical Ledger - heterogeneous budget history rows
// Four collections, each with its own column names; rows are kept as text maps
//
// Every accessor documents its default:
//   funding source → "Unknown" when absent or blank
//   amounts        → 0.0 when absent or unparseable
//   year           → DataCoercion error (caller skips the row)

use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// COLUMN NAMES
// ============================================================================

/// Free-text columns concatenated for program matching
pub const TEXT_FIELDS: [&str; 5] = [
    "Program/ Project/ Activity Description",
    "ISSUES AND CONCERN",
    "POLICIES, PROGRAMS, PROJECTS AND ACTIVITIES",
    "Object of Expenditure",
    "Particulars",
];

pub const FUNDING_SOURCE: &str = "Funding Source";
pub const YEAR: &str = "Year";
pub const PS: &str = "Personal Services (PS)";
pub const MOOE: &str = "Maintenance and Other Operating Expenses (MOOE)";
pub const CO: &str = "Capital Outlay";
pub const CO_ALT: &str = "Capital Outlay (CO)";

pub const UNKNOWN_FUNDING_SOURCE: &str = "Unknown";

// ============================================================================
// LEDGER COLLECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCollection {
    /// Annual investment program
    Api,
    BudgetAndSources,
    Expenditures,
    IssuesAndConcerns,
}

impl LedgerCollection {
    pub const ALL: [LedgerCollection; 4] = [
        LedgerCollection::Api,
        LedgerCollection::BudgetAndSources,
        LedgerCollection::Expenditures,
        LedgerCollection::IssuesAndConcerns,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LedgerCollection::Api => "api",
            LedgerCollection::BudgetAndSources => "budget_and_sources",
            LedgerCollection::Expenditures => "expenditures",
            LedgerCollection::IssuesAndConcerns => "issues_and_concerns",
        }
    }

    /// Route an uploaded file to its collection by filename keywords
    pub fn detect_from_filename(file_path: &Path) -> Result<Self> {
        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        let filename_lower = filename.to_lowercase();

        if filename_lower.contains("api") {
            return Ok(LedgerCollection::Api);
        }

        if filename_lower.contains("expenditure") {
            return Ok(LedgerCollection::Expenditures);
        }

        if filename_lower.contains("budget") && filename_lower.contains("sources") {
            return Ok(LedgerCollection::BudgetAndSources);
        }

        if filename_lower.contains("issues") {
            return Ok(LedgerCollection::IssuesAndConcerns);
        }

        Err(PlannerError::NoData(format!(
            "file name does not match any budget collection: {}",
            filename
        )))
    }
}

impl fmt::Display for LedgerCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LedgerCollection {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        LedgerCollection::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| PlannerError::NoData(format!("unknown ledger collection: {}", s)))
    }
}

// ============================================================================
// AMOUNTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetAmounts {
    pub ps: f64,
    pub mooe: f64,
    pub co: f64,
}

impl BudgetAmounts {
    pub fn total(&self) -> f64 {
        self.ps + self.mooe + self.co
    }
}

/// Drop thousands separators, the peso sign and whitespace
pub fn strip_currency(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ',' && *c != '₱' && !c.is_whitespace())
        .collect()
}

/// Parse a currency string such as "1,250,000.50" or "₱ 3,000". Unparseable → 0.0
pub fn parse_amount(raw: &str) -> f64 {
    strip_currency(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// ============================================================================
// LEDGER ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub collection: LedgerCollection,
    pub fields: BTreeMap<String, String>,
}

impl LedgerRow {
    pub fn new(collection: LedgerCollection) -> Self {
        LedgerRow {
            collection,
            fields: BTreeMap::new(),
        }
    }

    /// Builder: set a column
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// All free-text columns joined with spaces (absent columns contribute "")
    pub fn match_text(&self) -> String {
        TEXT_FIELDS
            .iter()
            .map(|f| self.get(f).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn funding_source(&self) -> String {
        match self.get(FUNDING_SOURCE).map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => UNKNOWN_FUNDING_SOURCE.to_string(),
        }
    }

    /// Year as an integer; anything else is a row-level coercion error
    pub fn year(&self) -> Result<i32> {
        let raw = self.get(YEAR);
        raw.and_then(|y| y.trim().parse::<i32>().ok())
            .ok_or_else(|| PlannerError::DataCoercion {
                collection: self.collection.name().to_string(),
                field: YEAR.to_string(),
                value: raw.unwrap_or("<missing>").to_string(),
            })
    }

    pub fn amounts(&self) -> BudgetAmounts {
        let amount = |key: &str| self.get(key).map(parse_amount).unwrap_or(0.0);

        let co = match self.get(CO).filter(|v| !v.trim().is_empty()) {
            Some(v) => parse_amount(v),
            None => amount(CO_ALT),
        };

        BudgetAmounts {
            ps: amount(PS),
            mooe: amount(MOOE),
            co,
        }
    }

    /// SHA-256 over collection + sorted fields, for idempotent imports
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.collection.name());
        for (k, v) in &self.fields {
            hasher.update([0u8]);
            hasher.update(k);
            hasher.update([0u8]);
            hasher.update(v);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Read a headered CSV into rows of one collection. Empty cells are kept as "".
pub fn load_ledger_csv(csv_path: &Path, collection: LedgerCollection) -> Result<Vec<LedgerRow>> {
    let rows = read_rows(csv::Reader::from_path(csv_path)?, collection)?;

    tracing::info!(
        collection = collection.name(),
        rows = rows.len(),
        path = %csv_path.display(),
        "loaded ledger CSV"
    );

    Ok(rows)
}

/// Same as `load_ledger_csv` for an uploaded CSV body
pub fn parse_ledger_csv(text: &str, collection: LedgerCollection) -> Result<Vec<LedgerRow>> {
    read_rows(csv::Reader::from_reader(text.as_bytes()), collection)
}

fn read_rows<R: Read>(mut rdr: csv::Reader<R>, collection: LedgerCollection) -> Result<Vec<LedgerRow>> {
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.trim().to_string(), v.to_string()))
            .collect();
        rows.push(LedgerRow { collection, fields });
    }

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
