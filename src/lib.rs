// Barangay Planner - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod telemetry;
pub mod config;
pub mod household;  // Household survey records
pub mod events;     // Event Extractor
pub mod catalog;    // Program Catalog
pub mod scorer;     // Sequence Scorer
pub mod ranking;    // Ranking & Aggregation Engine
pub mod ledger;     // Historical Ledger
pub mod matcher;    // Context Matcher
pub mod regressor;  // Budget Regressor
pub mod budget;     // Budget Reconciliation Engine
pub mod db;
pub mod pipeline;

// Re-export commonly used types
pub use error::{PlannerError, Result};
pub use config::PlannerConfig;
pub use household::{parse_households_csv, HouseholdRecord};
pub use events::{extract_events, EventTag, EventVocabulary};
pub use catalog::{ProgramCatalog, ProgramTemplate};
pub use scorer::{AffinityArtifact, AffinityScorer, SequenceScorer};
pub use ranking::{
    AggregatedRecommendation, PriorityTier, RankingEngine, RecommendationRecord, ScoredProgram,
    LATEST_SCOPE,
};
pub use ledger::{
    load_ledger_csv, parse_amount, parse_ledger_csv, strip_currency, BudgetAmounts,
    LedgerCollection, LedgerRow,
};
pub use matcher::{jaccard_similarity, BudgetContextRow, ContextMatcher};
pub use regressor::{
    BudgetModel, BudgetModelArtifact, BudgetPriors, BudgetRegressor, CategoricalEncoder,
    EncodedFeatures, LookupRegressor,
};
pub use budget::{
    merge_into_record, BudgetAllocation, BudgetPrediction, BudgetReport, ReconciledBudget,
    ReconciliationEngine,
};
pub use db::{
    Event, LedgerSummary, OfficialTotal, TotalBudgetRecord,
    open_database, setup_database, insert_households, get_households, count_households,
    insert_ledger_rows, get_ledger_rows, get_all_ledger_rows,
    upsert_total_budget, get_official_total, list_total_budgets,
    save_recommendation_record, load_recommendation_record, apply_budget_allocation,
    ledger_summary, insert_event, get_events_for_entity,
};
pub use pipeline::{CategoryBudget, Planner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
