// 🏛️ Planner - wires the ranking and budgeting pipelines to storage
//
// Pipeline A (per request):   households (inline or stored) → ranking → stored record (replaced)
// Pipeline B (per year):      stored record → context → regressor → reconcile → merge
//
// The connection mutex is the single writer on the recommendation record:
// budgeting holds it from read to commit.

use crate::budget::{BudgetReport, ReconciliationEngine};
use crate::catalog::ProgramCatalog;
use crate::config::PlannerConfig;
use crate::db::{self, Event, LedgerSummary, OfficialTotal, TotalBudgetRecord};
use crate::error::{PlannerError, Result};
use crate::household::{parse_households_csv, HouseholdRecord};
use crate::ledger::{load_ledger_csv, parse_ledger_csv, LedgerCollection, LedgerRow};
use crate::matcher::ContextMatcher;
use crate::ranking::{RankingEngine, RecommendationRecord, LATEST_SCOPE};
use crate::regressor::BudgetModel;
use crate::scorer::{AffinityScorer, SequenceScorer};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Budget summary per program category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub category: String,
    pub programs: usize,
    pub ps: f64,
    pub mooe: f64,
    pub co: f64,
    pub total: f64,
}

pub struct Planner {
    catalog: Arc<ProgramCatalog>,
    scorer: Box<dyn SequenceScorer>,
    budget_model: BudgetModel,
    ranking: RankingEngine,
    matcher: ContextMatcher,
    reconciliation: ReconciliationEngine,
    db: Mutex<Connection>,
}

impl Planner {
    pub fn new(
        catalog: Arc<ProgramCatalog>,
        scorer: Box<dyn SequenceScorer>,
        budget_model: BudgetModel,
        conn: Connection,
    ) -> Self {
        Planner {
            catalog,
            scorer,
            budget_model,
            ranking: RankingEngine::new(),
            matcher: ContextMatcher::new(),
            reconciliation: ReconciliationEngine::new(),
            db: Mutex::new(conn),
        }
    }

    pub fn with_ranking(mut self, ranking: RankingEngine) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_matcher(mut self, matcher: ContextMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Load every artifact up front; any missing one is a Configuration error
    pub fn from_config(config: &PlannerConfig) -> Result<Self> {
        config.validate()?;

        let catalog = match &config.catalog_path {
            Some(path) => ProgramCatalog::from_file(path)?,
            None => ProgramCatalog::builtin(),
        };

        let scorer = match &config.scorer_path {
            Some(path) => AffinityScorer::from_file(path, &catalog)?,
            None => AffinityScorer::builtin(&catalog),
        };

        let budget_model = BudgetModel::from_file(&config.budget_model_path)?
            .with_floor_ratio(config.prior_floor_ratio);

        let conn = db::open_database(&config.database_path)?;

        tracing::info!(
            programs = catalog.len(),
            database = %config.database_path.display(),
            "planner ready"
        );

        Ok(Planner::new(Arc::new(catalog), Box::new(scorer), budget_model, conn)
            .with_ranking(RankingEngine::with_top_k(config.top_k))
            .with_matcher(ContextMatcher::with_threshold(config.match_threshold)))
    }

    pub fn catalog(&self) -> &Arc<ProgramCatalog> {
        &self.catalog
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| PlannerError::LockPoisoned)
    }

    // ========================================================================
    // PIPELINE A - RANKING
    // ========================================================================

    /// Rank the batch and replace the stored record wholesale
    pub fn generate_recommendations(
        &self,
        households: &[HouseholdRecord],
    ) -> Result<RecommendationRecord> {
        let recommendations =
            self.ranking
                .recommend(&self.catalog, self.scorer.as_ref(), households)?;
        let record = RecommendationRecord::latest(households.len(), recommendations);

        let conn = self.conn()?;
        db::save_recommendation_record(&conn, &record)?;
        db::insert_event(
            &conn,
            &Event::new(
                "recommendations_generated",
                "recommendation_record",
                &record.scope,
                serde_json::json!({
                    "total_households": record.total_households,
                    "programs": record.recommendations.len(),
                }),
                "ranking_engine",
            ),
        )?;

        Ok(record)
    }

    /// Rank every stored household; NoData when none are stored
    pub fn generate_from_stored(&self) -> Result<RecommendationRecord> {
        let households = {
            let conn = self.conn()?;
            db::get_households(&conn)?
        };

        if households.is_empty() {
            return Err(PlannerError::NoData(
                "no household data available".to_string(),
            ));
        }

        self.generate_recommendations(&households)
    }

    pub fn latest_record(&self) -> Result<RecommendationRecord> {
        let conn = self.conn()?;
        db::load_recommendation_record(&conn, LATEST_SCOPE)
    }

    // ========================================================================
    // HOUSEHOLDS
    // ========================================================================

    /// Store every row of an uploaded survey CSV; an empty CSV is rejected
    pub fn import_households_csv(&self, text: &str) -> Result<usize> {
        let households = parse_households_csv(text)?;
        if households.is_empty() {
            return Err(PlannerError::NoData("CSV file is empty".to_string()));
        }

        let conn = self.conn()?;
        db::insert_households(&conn, &households)
    }

    pub fn add_household(&self, household: HouseholdRecord) -> Result<()> {
        let conn = self.conn()?;
        db::insert_households(&conn, &[household])?;
        Ok(())
    }

    pub fn households(&self) -> Result<Vec<HouseholdRecord>> {
        let conn = self.conn()?;
        db::get_households(&conn)
    }

    // ========================================================================
    // PIPELINE B - BUDGETING
    // ========================================================================

    /// Predict, reconcile to the official total and persist in one transaction
    pub fn predict_budget(&self, year: i32) -> Result<BudgetReport> {
        let mut conn = self.conn()?;

        let record = db::load_recommendation_record(&conn, LATEST_SCOPE)?;
        let official = db::get_official_total(&conn, year)?;
        let rows = db::get_all_ledger_rows(&conn)?;

        let predictions: Vec<_> = record
            .titles()
            .iter()
            .map(|title| {
                let context = self.matcher.match_context(title, year, &rows);
                self.budget_model.predict_raw(title, &context)
            })
            .collect();

        let allocation = self.reconciliation.reconcile(&predictions, official.amount);
        let merged = db::apply_budget_allocation(&mut conn, LATEST_SCOPE, year, &allocation)?;

        tracing::info!(
            year,
            total_year = official.year,
            programs = allocation.budgets.len(),
            merged,
            "budget reconciled"
        );

        Ok(BudgetReport {
            year,
            official_total: allocation.official_total,
            computed_total: allocation.computed_total,
            budgets: allocation.budgets,
            persisted: true,
            merged,
        })
    }

    /// PS/MOOE/CO totals per category over budgeted recommendations, largest first
    pub fn category_breakdown(&self) -> Result<Vec<CategoryBudget>> {
        let record = self.latest_record()?;
        let mut categories: Vec<CategoryBudget> = Vec::new();

        for rec in &record.recommendations {
            let budget = match &rec.budget {
                Some(b) => b,
                None => continue,
            };

            let idx = match categories.iter().position(|c| c.category == rec.category) {
                Some(i) => i,
                None => {
                    categories.push(CategoryBudget {
                        category: rec.category.clone(),
                        programs: 0,
                        ps: 0.0,
                        mooe: 0.0,
                        co: 0.0,
                        total: 0.0,
                    });
                    categories.len() - 1
                }
            };

            let entry = &mut categories[idx];
            entry.programs += 1;
            entry.ps += budget.ps;
            entry.mooe += budget.mooe;
            entry.co += budget.co;
            entry.total += budget.total;
        }

        categories.sort_by(|a, b| b.total.total_cmp(&a.total));
        Ok(categories)
    }

    // ========================================================================
    // LEDGER & TOTALS
    // ========================================================================

    /// Import a CSV; the collection is detected from the file name when not given
    pub fn import_ledger(&self, path: &Path, collection: Option<LedgerCollection>) -> Result<usize> {
        let collection = match collection {
            Some(c) => c,
            None => LedgerCollection::detect_from_filename(path)?,
        };
        let rows = load_ledger_csv(path, collection)?;
        self.store_ledger_rows(&rows)
    }

    /// Import an uploaded CSV body, routed by its original file name
    pub fn import_ledger_csv(&self, filename: &str, text: &str) -> Result<usize> {
        let collection = LedgerCollection::detect_from_filename(Path::new(filename))?;
        let rows = parse_ledger_csv(text, collection)?;
        self.store_ledger_rows(&rows)
    }

    fn store_ledger_rows(&self, rows: &[LedgerRow]) -> Result<usize> {
        if rows.is_empty() {
            return Err(PlannerError::NoData("CSV is empty".to_string()));
        }
        let conn = self.conn()?;
        db::insert_ledger_rows(&conn, rows)
    }

    pub fn set_total_budget(&self, year: i32, amount: &str) -> Result<()> {
        let conn = self.conn()?;
        db::upsert_total_budget(&conn, year, amount)
    }

    pub fn official_total(&self, year: i32) -> Result<OfficialTotal> {
        let conn = self.conn()?;
        db::get_official_total(&conn, year)
    }

    pub fn total_budgets(&self) -> Result<Vec<TotalBudgetRecord>> {
        let conn = self.conn()?;
        db::list_total_budgets(&conn)
    }

    pub fn ledger_summary(&self) -> Result<Vec<LedgerSummary>> {
        let conn = self.conn()?;
        db::ledger_summary(&conn)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProgramTemplate;
    use crate::events::{EventTag, EventVocabulary};
    use crate::ledger::{LedgerRow, FUNDING_SOURCE, YEAR};
    use crate::regressor::{
        BudgetPriors, BudgetRegressor, CategoricalEncoder, LookupEntry, LookupRegressor,
        LookupTable,
    };
    use std::collections::HashMap;

    struct FixedScorer {
        vocabulary: EventVocabulary,
        probs: HashMap<String, f64>,
    }

    impl SequenceScorer for FixedScorer {
        fn vocabulary(&self) -> &EventVocabulary {
            &self.vocabulary
        }

        fn score(&self, _sequence: &[EventTag]) -> Result<HashMap<String, f64>> {
            Ok(self.probs.clone())
        }
    }

    /// Entries are (program class, funding source class, value)
    fn lookup(values: &[(usize, usize, f64)]) -> Box<dyn BudgetRegressor> {
        Box::new(LookupRegressor::new(LookupTable {
            entries: values
                .iter()
                .map(|(program, funding_source, value)| LookupEntry {
                    program: *program,
                    funding_source: *funding_source,
                    year: None,
                    value: *value,
                })
                .collect(),
            fallback: 0.0,
        }))
    }

    /// Two programs; with "Unknown" funding the regressor predicts PS/MOOE of
    /// 1000/500 and 3000/1500. Clinic rows funded by "20% Development Fund"
    /// predict PS 5000.
    fn test_planner() -> Planner {
        let catalog = ProgramCatalog::from_programs(vec![
            ProgramTemplate::new("CLINIC", "Barangay Clinic Program", "Social Services", ""),
            ProgramTemplate::new("ROADS", "Road Concreting Program", "Infrastructure Services", ""),
            ProgramTemplate::new("UNUSED", "Unused Program", "Other Services", ""),
        ])
        .unwrap();

        let scorer = FixedScorer {
            vocabulary: EventVocabulary::full(),
            probs: [("CLINIC", 0.5), ("ROADS", 0.4), ("UNUSED", 0.1)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        };

        // Funding classes sort as ["20% Development Fund", "Unknown"]
        let model = BudgetModel::new(
            CategoricalEncoder::fit(vec!["barangay clinic program", "road concreting program"])
                .unwrap(),
            CategoricalEncoder::fit(vec!["Unknown", "20% Development Fund"]).unwrap(),
            [
                lookup(&[(0, 1, 1000.0), (1, 1, 3000.0), (0, 0, 5000.0)]),
                lookup(&[(0, 1, 500.0), (1, 1, 1500.0)]),
                lookup(&[]),
            ],
            BudgetPriors::default(),
        );

        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        Planner::new(Arc::new(catalog), Box::new(scorer), model, conn)
            .with_ranking(RankingEngine::with_top_k(2))
    }

    #[test]
    fn test_generate_recommendations_persists_record() {
        let planner = test_planner();
        let households = vec![HouseholdRecord::new(), HouseholdRecord::new()];

        let record = planner.generate_recommendations(&households).unwrap();

        assert_eq!(record.scope, LATEST_SCOPE);
        assert_eq!(record.total_households, 2);
        assert_eq!(
            record.titles(),
            vec!["Barangay Clinic Program", "Road Concreting Program"]
        );
        let stored = planner.latest_record().unwrap();
        assert_eq!(stored.titles(), record.titles());
        assert_eq!(stored.generated_at, record.generated_at);
    }

    #[test]
    fn test_predict_budget_end_to_end() {
        let planner = test_planner();
        planner
            .generate_recommendations(&[HouseholdRecord::new()])
            .unwrap();
        planner.set_total_budget(2025, "9,000").unwrap();

        let report = planner.predict_budget(2025).unwrap();

        assert_eq!(report.year, 2025);
        assert_eq!(report.official_total, 9000.0);
        assert_eq!(report.computed_total, 9000.0);
        assert!(report.persisted);
        assert_eq!(report.merged, 2);
        assert_eq!(report.budgets[0].total, 2250.0);
        assert_eq!(report.budgets[1].total, 6750.0);

        let stored = planner.latest_record().unwrap();
        assert_eq!(stored.recommendations[0].budget.as_ref().unwrap().ps, 1500.0);

        let categories = planner.category_breakdown().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category, "Infrastructure Services");
        assert_eq!(categories[0].total, 6750.0);

        println!("✅ Budget pipeline test passed: {} programs", report.budgets.len());
    }

    #[test]
    fn test_predict_budget_uses_latest_total_when_year_missing() {
        let planner = test_planner();
        planner
            .generate_recommendations(&[HouseholdRecord::new()])
            .unwrap();
        planner.set_total_budget(2023, "12000").unwrap();

        let report = planner.predict_budget(2026).unwrap();
        assert_eq!(report.official_total, 12000.0);
        assert_eq!(report.year, 2026);
    }

    #[test]
    fn test_predict_budget_without_data() {
        let planner = test_planner();

        // No stored recommendations
        planner.set_total_budget(2025, "1000").unwrap();
        assert!(matches!(
            planner.predict_budget(2025),
            Err(PlannerError::NoData(_))
        ));

        // Stored recommendations but no total for any year
        let fresh = test_planner();
        fresh.generate_recommendations(&[HouseholdRecord::new()]).unwrap();
        let err = fresh.predict_budget(2025).unwrap_err();
        assert!(err.is_client_error());
        assert!(fresh.latest_record().unwrap().recommendations.iter().all(|r| r.budget.is_none()));
    }

    #[test]
    fn test_reranking_replaces_budgets() {
        let planner = test_planner();
        planner
            .generate_recommendations(&[HouseholdRecord::new()])
            .unwrap();
        planner.set_total_budget(2025, "9000").unwrap();
        planner.predict_budget(2025).unwrap();
        assert!(planner.latest_record().unwrap().has_budgets());

        planner
            .generate_recommendations(&[HouseholdRecord::new()])
            .unwrap();
        assert!(!planner.latest_record().unwrap().has_budgets());
        assert!(planner.category_breakdown().unwrap().is_empty());
    }

    #[test]
    fn test_matched_ledger_rows_feed_context() {
        let planner = test_planner();
        planner
            .generate_recommendations(&[HouseholdRecord::new()])
            .unwrap();
        planner.set_total_budget(2025, "9000").unwrap();

        let baseline = planner.predict_budget(2025).unwrap();
        assert_eq!(baseline.budgets[0].total, 2250.0);

        // Only the clinic matches this row; its funding source moves the clinic PS
        // prediction from 1000 to 5000, so raw totals become 5500 and 4500
        let rows = vec![LedgerRow::new(LedgerCollection::Api)
            .with("Particulars", "Barangay clinic program supplies")
            .with(FUNDING_SOURCE, "20% Development Fund")
            .with(YEAR, "2022")];
        {
            let conn = planner.conn().unwrap();
            db::insert_ledger_rows(&conn, &rows).unwrap();
        }

        let report = planner.predict_budget(2025).unwrap();
        assert_eq!(report.budgets[0].program, "Barangay Clinic Program");
        assert_eq!(report.budgets[0].ps, 4500.0);
        assert_eq!(report.budgets[0].mooe, 450.0);
        assert_eq!(report.budgets[0].total, 4950.0);
        assert_eq!(report.budgets[1].total, 4050.0);
        assert_eq!(report.computed_total, 9000.0);
        assert_ne!(report.budgets[0].total, baseline.budgets[0].total);
    }

    #[test]
    fn test_generate_from_stored_households() {
        let planner = test_planner();

        assert!(matches!(
            planner.generate_from_stored(),
            Err(PlannerError::NoData(_))
        ));

        let inserted = planner
            .import_households_csv("TOILET,SEX,OCCUPATION\nY,F,\n,M,NURSE\n")
            .unwrap();
        assert_eq!(inserted, 2);
        planner
            .add_household(HouseholdRecord::new().with("AGE", 70))
            .unwrap();
        assert_eq!(planner.households().unwrap().len(), 3);

        let record = planner.generate_from_stored().unwrap();
        assert_eq!(record.total_households, 3);
        assert_eq!(
            planner.latest_record().unwrap().titles(),
            vec!["Barangay Clinic Program", "Road Concreting Program"]
        );

        assert!(matches!(
            planner.import_households_csv("TOILET,SEX\n"),
            Err(PlannerError::NoData(_))
        ));
        assert_eq!(planner.households().unwrap().len(), 3);
    }

    #[test]
    fn test_import_ledger_csv_body() {
        let planner = test_planner();
        let body = "Particulars,Year,Personal Services (PS)\nHealth center,2023,\"1,500\"\n";

        assert_eq!(planner.import_ledger_csv("2023 API Report.csv", body).unwrap(), 1);
        let summary = planner.ledger_summary().unwrap();
        let api = summary
            .iter()
            .find(|s| s.collection == LedgerCollection::Api)
            .unwrap();
        assert_eq!(api.ps, 1500.0);

        let err = planner.import_ledger_csv("API.csv", "Particulars,Year\n").unwrap_err();
        assert!(matches!(err, PlannerError::NoData(_)));
        assert!(err.is_client_error());

        let err = planner.import_ledger_csv("residents.csv", body).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_bad_total_amount_is_client_error() {
        let planner = test_planner();
        let err = planner.set_total_budget(2025, "lots").unwrap_err();
        assert!(matches!(err, PlannerError::DataCoercion { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_from_config_requires_budget_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlannerConfig {
            database_path: dir.path().join("planner.db"),
            budget_model_path: dir.path().join("missing.json"),
            ..PlannerConfig::default()
        };

        assert!(matches!(
            Planner::from_config(&config),
            Err(PlannerError::Configuration(_))
        ));
    }

    #[test]
    fn test_import_ledger_detects_collection() {
        use std::io::Write;

        let planner = test_planner();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Expenditures 2022.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Object of Expenditure,Year").unwrap();
        writeln!(file, "Office supplies,2022").unwrap();

        assert_eq!(planner.import_ledger(&path, None).unwrap(), 1);
        assert_eq!(planner.import_ledger(&path, None).unwrap(), 0);

        let summary = planner.ledger_summary().unwrap();
        let expenditures = summary
            .iter()
            .find(|s| s.collection == LedgerCollection::Expenditures)
            .unwrap();
        assert_eq!(expenditures.rows, 1);

        let bad = dir.path().join("households.csv");
        std::fs::write(&bad, "a,b\n1,2\n").unwrap();
        assert!(matches!(
            planner.import_ledger(&bad, None),
            Err(PlannerError::NoData(_))
        ));
    }
}
