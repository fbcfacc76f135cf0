// 🗄️ Planner Storage - SQLite persistence
//
// Tables:
//   households              survey records, one JSON object per row
//   ledger_rows             historical budget rows (idempotent by content hash)
//   total_budget            authoritative total per year (amount kept as supplied)
//   recommendation_records  the "latest" recommendation list, one row per scope
//   events                  audit trail (every change is an event)

use crate::budget::{merge_into_record, BudgetAllocation};
use crate::error::{PlannerError, Result};
use crate::household::HouseholdRecord;
use crate::ledger::{strip_currency, LedgerCollection, LedgerRow};
use crate::ranking::{AggregatedRecommendation, RecommendationRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Households (sparse survey answers kept as a JSON object)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS households (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Ledger Rows (heterogeneous columns kept as a JSON object)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            row_hash TEXT UNIQUE NOT NULL,
            collection TEXT NOT NULL,
            fields TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Total Budget (one record per year)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS total_budget (
            year INTEGER PRIMARY KEY,
            amount TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Recommendation Records (replaced wholesale; budgets merged in place)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recommendation_records (
            scope TEXT PRIMARY KEY,
            generated_at TEXT NOT NULL,
            total_households INTEGER NOT NULL,
            recommendations TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_collection ON ledger_rows(collection)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// HOUSEHOLDS
// ============================================================================

/// Append survey records as given. Returns rows inserted.
pub fn insert_households(conn: &Connection, households: &[HouseholdRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    for household in households {
        tx.execute(
            "INSERT INTO households (record) VALUES (?1)",
            [serde_json::to_string(household)?],
        )?;
    }

    if !households.is_empty() {
        let event = Event::new(
            "households_imported",
            "households",
            "survey",
            serde_json::json!({ "inserted": households.len() }),
            "household_importer",
        );
        insert_event(&tx, &event)?;
    }

    tx.commit()?;

    tracing::info!(inserted = households.len(), "stored households");

    Ok(households.len())
}

/// All stored households in insertion order
pub fn get_households(conn: &Connection) -> Result<Vec<HouseholdRecord>> {
    let mut stmt = conn.prepare("SELECT record FROM households ORDER BY id")?;

    let raw = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.iter()
        .map(|r| serde_json::from_str(r).map_err(PlannerError::from))
        .collect()
}

pub fn count_households(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM households", [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

// ============================================================================
// LEDGER
// ============================================================================

/// Insert rows, skipping any already stored (same content hash). Returns rows inserted.
pub fn insert_ledger_rows(conn: &Connection, rows: &[LedgerRow]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for row in rows {
        let hash = row.content_hash();
        let fields_json = serde_json::to_string(&row.fields)?;

        let result = conn.execute(
            "INSERT INTO ledger_rows (row_hash, collection, fields) VALUES (?1, ?2, ?3)",
            params![hash, row.collection.name(), fields_json],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(first) = rows.first() {
        let event = Event::new(
            "ledger_imported",
            "ledger",
            first.collection.name(),
            serde_json::json!({ "inserted": inserted, "duplicates": duplicates }),
            "ledger_importer",
        );
        insert_event(conn, &event)?;
    }

    tracing::info!(inserted, duplicates, "imported ledger rows");

    Ok(inserted)
}

fn ledger_row_from_sql(collection: &str, fields_json: &str) -> Result<LedgerRow> {
    Ok(LedgerRow {
        collection: collection.parse()?,
        fields: serde_json::from_str(fields_json)?,
    })
}

/// Rows of one collection in import order
pub fn get_ledger_rows(conn: &Connection, collection: LedgerCollection) -> Result<Vec<LedgerRow>> {
    let mut stmt = conn.prepare(
        "SELECT collection, fields FROM ledger_rows WHERE collection = ?1 ORDER BY id",
    )?;

    let raw = stmt
        .query_map([collection.name()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.iter()
        .map(|(c, f)| ledger_row_from_sql(c, f))
        .collect()
}

/// Rows of every collection, collections in fixed order
pub fn get_all_ledger_rows(conn: &Connection) -> Result<Vec<LedgerRow>> {
    let mut all = Vec::new();
    for collection in LedgerCollection::ALL {
        all.extend(get_ledger_rows(conn, collection)?);
    }
    Ok(all)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub collection: LedgerCollection,
    pub rows: usize,
    pub ps: f64,
    pub mooe: f64,
    pub co: f64,
}

impl LedgerSummary {
    pub fn total(&self) -> f64 {
        self.ps + self.mooe + self.co
    }
}

/// Per-collection row count and PS/MOOE/CO sums
pub fn ledger_summary(conn: &Connection) -> Result<Vec<LedgerSummary>> {
    let mut summaries = Vec::new();

    for collection in LedgerCollection::ALL {
        let rows = get_ledger_rows(conn, collection)?;
        let mut summary = LedgerSummary {
            collection,
            rows: rows.len(),
            ps: 0.0,
            mooe: 0.0,
            co: 0.0,
        };
        for row in &rows {
            let amounts = row.amounts();
            summary.ps += amounts.ps;
            summary.mooe += amounts.mooe;
            summary.co += amounts.co;
        }
        summaries.push(summary);
    }

    Ok(summaries)
}

// ============================================================================
// TOTAL BUDGET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalBudgetRecord {
    pub year: i32,
    /// As supplied, e.g. "1,250,000"
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfficialTotal {
    pub requested_year: i32,
    /// Year of the record actually used (latest known when the requested one is absent)
    pub year: i32,
    pub amount: f64,
}

pub fn upsert_total_budget(conn: &Connection, year: i32, amount: &str) -> Result<()> {
    parse_total_amount(amount)?;

    conn.execute(
        "INSERT INTO total_budget (year, amount, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(year) DO UPDATE SET amount = excluded.amount, updated_at = excluded.updated_at",
        params![year, amount, Utc::now().to_rfc3339()],
    )?;

    let event = Event::new(
        "total_budget_set",
        "total_budget",
        &year.to_string(),
        serde_json::json!({ "amount": amount }),
        "planner",
    );
    insert_event(conn, &event)?;

    Ok(())
}

pub fn list_total_budgets(conn: &Connection) -> Result<Vec<TotalBudgetRecord>> {
    let mut stmt = conn.prepare("SELECT year, amount FROM total_budget ORDER BY year DESC")?;

    let records = stmt
        .query_map([], |row| {
            Ok(TotalBudgetRecord {
                year: row.get(0)?,
                amount: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Exact year, else the latest year on record, else NoData
pub fn get_official_total(conn: &Connection, year: i32) -> Result<OfficialTotal> {
    let exact: Option<(i32, String)> = conn
        .query_row(
            "SELECT year, amount FROM total_budget WHERE year = ?1",
            [year],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let found = match exact {
        Some(record) => Some(record),
        None => conn
            .query_row(
                "SELECT year, amount FROM total_budget ORDER BY year DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
    };

    let (found_year, amount) = found.ok_or_else(|| {
        PlannerError::NoData("no total budget record exists for any year".to_string())
    })?;

    if found_year != year {
        tracing::warn!(requested = year, using = found_year, "total budget year not found; using latest");
    }

    Ok(OfficialTotal {
        requested_year: year,
        year: found_year,
        amount: parse_total_amount(&amount)?,
    })
}

fn parse_total_amount(raw: &str) -> Result<f64> {
    strip_currency(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PlannerError::DataCoercion {
            collection: "total_budget".to_string(),
            field: "amount".to_string(),
            value: raw.to_string(),
        })
}

// ============================================================================
// RECOMMENDATION RECORDS
// ============================================================================

/// Replace the record for its scope wholesale
pub fn save_recommendation_record(conn: &Connection, record: &RecommendationRecord) -> Result<()> {
    let recommendations_json = serde_json::to_string(&record.recommendations)?;

    conn.execute(
        "INSERT INTO recommendation_records (scope, generated_at, total_households, recommendations)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(scope) DO UPDATE SET
            generated_at = excluded.generated_at,
            total_households = excluded.total_households,
            recommendations = excluded.recommendations",
        params![
            record.scope,
            record.generated_at.to_rfc3339(),
            record.total_households as i64,
            recommendations_json,
        ],
    )?;

    Ok(())
}

pub fn load_recommendation_record(conn: &Connection, scope: &str) -> Result<RecommendationRecord> {
    let raw: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT generated_at, total_households, recommendations
             FROM recommendation_records WHERE scope = ?1",
            [scope],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let (generated_at, total_households, recommendations_json) = raw.ok_or_else(|| {
        PlannerError::NoData(format!("no stored recommendations for scope {}", scope))
    })?;

    let generated_at = DateTime::parse_from_rfc3339(&generated_at)
        .map_err(|_| PlannerError::DataCoercion {
            collection: "recommendation_records".to_string(),
            field: "generated_at".to_string(),
            value: generated_at.clone(),
        })?
        .with_timezone(&Utc);

    let recommendations: Vec<AggregatedRecommendation> =
        serde_json::from_str(&recommendations_json)?;

    Ok(RecommendationRecord {
        scope: scope.to_string(),
        generated_at,
        total_households: total_households.max(0) as usize,
        recommendations,
    })
}

/// Read-merge-write of the stored record in one SQLite transaction.
/// Returns how many recommendations received a budget.
pub fn apply_budget_allocation(
    conn: &mut Connection,
    scope: &str,
    year: i32,
    allocation: &BudgetAllocation,
) -> Result<usize> {
    let tx = conn.transaction()?;

    let mut record = load_recommendation_record(&tx, scope)?;
    let merged = merge_into_record(&mut record, allocation);
    save_recommendation_record(&tx, &record)?;

    let event = Event::new(
        "budget_applied",
        "recommendation_record",
        scope,
        serde_json::json!({
            "year": year,
            "official_total": allocation.official_total,
            "computed_total": allocation.computed_total,
            "merged": merged,
        }),
        "reconciliation_engine",
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    Ok(merged)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}
