// 🏠 Household Record - sparse survey answers
// Columns are externally supplied; every accessor has an explicit default

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// SURVEY COLUMNS
// ============================================================================

pub const TOILET: &str = "TOILET";
pub const MRF_SEGREGATED: &str = "MRF SEGREGATED";
pub const GARDEN: &str = "GARDEN";
pub const FOUR_PS: &str = "4P'S";
pub const INDIGENOUS: &str = "IP'S";
pub const SMOKER: &str = "SMOKER";
pub const FAMILY_PLANNING: &str = "FAMILY PLANNING";
pub const AGE: &str = "AGE";
pub const SEX: &str = "SEX";
pub const CIVIL_STATUS: &str = "CIVIL STATUS";
pub const EDUCATION: &str = "EDUCATIONAL ATTAINMENT";
pub const OCCUPATION: &str = "OCCUPATION";

// ============================================================================
// HOUSEHOLD RECORD
// ============================================================================

/// One household's survey answers, kept as the raw JSON object.
///
/// No schema is enforced: unknown columns pass through untouched and
/// missing columns read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseholdRecord {
    fields: Map<String, Value>,
}

impl HouseholdRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a column
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Yes/no column: `"Y"` (any case, trimmed) or JSON `true`. Anything else is no.
    pub fn flag(&self, key: &str) -> bool {
        match self.fields.get(key) {
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("y"),
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Presence of any truthy value: non-null, non-false, non-zero, non-empty.
    pub fn truthy(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// JSON integers only. Numeric strings and floats do not count.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// String column, `None` when absent or not a string
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for HouseholdRecord {
    fn from(fields: Map<String, Value>) -> Self {
        HouseholdRecord { fields }
    }
}

/// Parse an uploaded survey CSV. Every cell is kept as a string, blank ones included.
pub fn parse_households_csv(text: &str) -> Result<Vec<HouseholdRecord>> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let mut households = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.trim().to_string(), Value::String(v.to_string())))
            .collect();
        households.push(HouseholdRecord::from(fields));
    }

    Ok(households)
}

// ============================================================================
// TESTS
// ============================================================================
