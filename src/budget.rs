// ⚖️ Budget Reconciliation Engine - scale raw predictions to the official total
//
// Following the formula:
//   raw_total = Σ (ps + mooe + co)
//   scale     = official_total / raw_total      (1 when raw_total == 0)
//   component = round₂(raw_component × scale)
//   total     = ps + mooe + co                   (sum of the rounded parts)
//
// Each program keeps its own PS/MOOE/CO split; only the magnitude moves.

use crate::ranking::RecommendationRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// PREDICTIONS
// ============================================================================

/// Raw regressor output for one program, floored but not yet scaled.
/// `program` is the recommendation title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPrediction {
    pub program: String,
    pub ps: f64,
    pub mooe: f64,
    pub co: f64,
}

impl BudgetPrediction {
    pub fn total(&self) -> f64 {
        self.ps + self.mooe + self.co
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledBudget {
    pub program: String,
    pub ps: f64,
    pub mooe: f64,
    pub co: f64,
    pub total: f64,
}

/// Round to currency precision
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// BUDGET ALLOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub official_total: f64,
    pub raw_total: f64,
    pub scale: f64,

    /// Σ of rounded totals; may drift from `official_total` by a cent per program
    pub computed_total: f64,
    pub budgets: Vec<ReconciledBudget>,
}

impl BudgetAllocation {
    pub fn drift(&self) -> f64 {
        (self.computed_total - self.official_total).abs()
    }

    /// Rounding drift within one cent per program
    pub fn is_balanced(&self) -> bool {
        self.drift() <= 0.01 * self.budgets.len() as f64 + 1e-9
    }

    pub fn summary(&self) -> String {
        format!(
            "Allocation: {} programs, raw ₱{:.2}, scale {:.4}, computed ₱{:.2}, official ₱{:.2}, drift ₱{:.2}",
            self.budgets.len(),
            self.raw_total,
            self.scale,
            self.computed_total,
            self.official_total,
            self.drift()
        )
    }
}

/// Response shape of one budgeting request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetReport {
    pub year: i32,
    pub official_total: f64,
    pub computed_total: f64,
    pub budgets: Vec<ReconciledBudget>,

    /// True once the allocation is committed to the stored record
    pub persisted: bool,

    /// Recommendations that received a budget in the stored record
    pub merged: usize,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Allowed drift per program (default: ₱0.01)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.01 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine { tolerance }
    }

    /// official / raw, or exactly 1 when there is nothing to scale
    pub fn scale_factor(&self, raw_total: f64, official_total: f64) -> f64 {
        if raw_total == 0.0 {
            1.0
        } else {
            official_total / raw_total
        }
    }

    /// Rescale all predictions to the official total.
    ///
    /// Example:
    /// ```
    /// use barangay_planner::budget::{BudgetPrediction, ReconciliationEngine};
    ///
    /// let engine = ReconciliationEngine::new();
    /// let predictions = vec![
    ///     BudgetPrediction { program: "A".into(), ps: 1000.0, mooe: 500.0, co: 0.0 },
    ///     BudgetPrediction { program: "B".into(), ps: 3000.0, mooe: 1500.0, co: 0.0 },
    /// ];
    ///
    /// let allocation = engine.reconcile(&predictions, 9000.0);
    /// assert_eq!(allocation.scale, 1.5);
    /// assert_eq!(allocation.computed_total, 9000.0);
    /// ```
    pub fn reconcile(&self, predictions: &[BudgetPrediction], official_total: f64) -> BudgetAllocation {
        let raw_total: f64 = predictions.iter().map(BudgetPrediction::total).sum();
        let scale = self.scale_factor(raw_total, official_total);

        let budgets: Vec<ReconciledBudget> = predictions
            .iter()
            .map(|p| {
                let ps = round_currency(p.ps * scale);
                let mooe = round_currency(p.mooe * scale);
                let co = round_currency(p.co * scale);
                ReconciledBudget {
                    program: p.program.clone(),
                    ps,
                    mooe,
                    co,
                    total: round_currency(ps + mooe + co),
                }
            })
            .collect();

        let computed_total = round_currency(budgets.iter().map(|b| b.total).sum());

        let allocation = BudgetAllocation {
            official_total,
            raw_total,
            scale,
            computed_total,
            budgets,
        };

        if raw_total == 0.0 {
            tracing::warn!("raw budget total is zero; predictions left unscaled");
        } else if !self.is_within_tolerance(&allocation) {
            tracing::warn!(drift = allocation.drift(), "allocation drift exceeds tolerance");
        }
        tracing::info!("{}", allocation.summary());

        allocation
    }

    pub fn is_within_tolerance(&self, allocation: &BudgetAllocation) -> bool {
        allocation.drift() <= self.tolerance * allocation.budgets.len() as f64 + 1e-9
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Attach budgets to recommendations by exact title. Recommendations without
/// a budget in this allocation are cleared, never left from a previous run.
/// When titles repeat, the first budget with that title is used.
/// Returns how many recommendations received a budget.
pub fn merge_into_record(record: &mut RecommendationRecord, allocation: &BudgetAllocation) -> usize {
    let mut by_title: HashMap<&str, &ReconciledBudget> = HashMap::new();
    for budget in &allocation.budgets {
        by_title.entry(budget.program.as_str()).or_insert(budget);
    }

    let mut merged = 0;
    for rec in record.recommendations.iter_mut() {
        rec.budget = by_title.get(rec.title.as_str()).map(|b| (*b).clone());
        if rec.budget.is_some() {
            merged += 1;
        }
    }
    merged
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{AggregatedRecommendation, PriorityTier};
    use chrono::Utc;

    fn prediction(program: &str, ps: f64, mooe: f64, co: f64) -> BudgetPrediction {
        BudgetPrediction {
            program: program.to_string(),
            ps,
            mooe,
            co,
        }
    }

    fn recommendation(title: &str) -> AggregatedRecommendation {
        AggregatedRecommendation {
            id: uuid::Uuid::new_v4().to_string(),
            program_id: title.to_uppercase().replace(' ', "_"),
            title: title.to_string(),
            description: String::new(),
            category: "Test".to_string(),
            priority: PriorityTier::High,
            beneficiary_count: 1,
            average_score: 1.0,
            coverage_ratio: 1.0,
            need_score: 1.0,
            generated_at: Utc::now(),
            budget: None,
        }
    }

    #[test]
    fn test_reconcile_two_programs_to_official_total() {
        let engine = ReconciliationEngine::new();
        let predictions = vec![
            prediction("Program A", 1000.0, 500.0, 0.0),
            prediction("Program B", 3000.0, 1500.0, 0.0),
        ];

        let allocation = engine.reconcile(&predictions, 9000.0);

        assert_eq!(allocation.raw_total, 6000.0);
        assert_eq!(allocation.scale, 1.5);
        assert_eq!(allocation.budgets[0].total, 2250.0);
        assert_eq!(allocation.budgets[1].total, 6750.0);
        assert_eq!(allocation.budgets[0].ps, 1500.0);
        assert_eq!(allocation.budgets[0].mooe, 750.0);
        assert_eq!(allocation.computed_total, 9000.0);
        assert!(allocation.is_balanced());

        println!("✅ Test passed: {}", allocation.summary());
    }

    #[test]
    fn test_zero_raw_total_is_identity() {
        let engine = ReconciliationEngine::new();
        let predictions = vec![prediction("Program A", 0.0, 0.0, 0.0)];

        let allocation = engine.reconcile(&predictions, 5000.0);

        assert_eq!(allocation.scale, 1.0);
        assert_eq!(allocation.budgets[0].total, 0.0);
        assert_eq!(allocation.computed_total, 0.0);
    }

    #[test]
    fn test_split_ratio_preserved() {
        let engine = ReconciliationEngine::new();
        let predictions = vec![prediction("Program A", 200.0, 300.0, 500.0)];

        let allocation = engine.reconcile(&predictions, 10_000.0);
        let b = &allocation.budgets[0];

        assert_eq!((b.ps, b.mooe, b.co), (2000.0, 3000.0, 5000.0));
    }

    #[test]
    fn test_rounding_drift_within_a_cent_per_program() {
        let engine = ReconciliationEngine::new();
        let predictions = vec![
            prediction("A", 333.333, 111.111, 7.777),
            prediction("B", 1.0, 2.0, 3.0),
            prediction("C", 999.999, 0.001, 0.0),
        ];

        let allocation = engine.reconcile(&predictions, 1_000_000.0);

        assert!(allocation.is_balanced(), "{}", allocation.summary());
        assert!(engine.is_within_tolerance(&allocation));
        for b in &allocation.budgets {
            assert_eq!(b.ps, round_currency(b.ps));
            assert!((b.total - (b.ps + b.mooe + b.co)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scale_factor() {
        let engine = ReconciliationEngine::default();
        assert_eq!(engine.scale_factor(0.0, 1234.0), 1.0);
        assert_eq!(engine.scale_factor(2000.0, 1000.0), 0.5);
    }

    #[test]
    fn test_merge_by_title_clears_stale_budgets() {
        let mut record = RecommendationRecord::latest(
            3,
            vec![
                recommendation("Program A"),
                recommendation("Program B"),
                recommendation("Program C"),
            ],
        );
        // Stale budget from a previous run
        record.recommendations[2].budget = Some(ReconciledBudget {
            program: "Program C".to_string(),
            ps: 1.0,
            mooe: 1.0,
            co: 1.0,
            total: 3.0,
        });

        let engine = ReconciliationEngine::new();
        let allocation = engine.reconcile(
            &[
                prediction("Program A", 100.0, 0.0, 0.0),
                prediction("Program B", 300.0, 0.0, 0.0),
                prediction("program c", 100.0, 0.0, 0.0),
            ],
            1000.0,
        );

        let merged = merge_into_record(&mut record, &allocation);

        assert_eq!(merged, 2);
        assert_eq!(record.recommendations[0].budget.as_ref().unwrap().total, 200.0);
        assert_eq!(record.recommendations[1].budget.as_ref().unwrap().total, 600.0);
        // Title match is exact: "program c" does not match "Program C"
        assert!(record.recommendations[2].budget.is_none());
    }

    #[test]
    fn test_merge_duplicate_titles_takes_first_budget() {
        let mut record = RecommendationRecord::latest(1, vec![recommendation("Program A")]);

        let allocation = ReconciliationEngine::new().reconcile(
            &[
                prediction("Program A", 100.0, 0.0, 0.0),
                prediction("Program A", 300.0, 0.0, 0.0),
            ],
            400.0,
        );

        assert_eq!(merge_into_record(&mut record, &allocation), 1);
        assert_eq!(record.recommendations[0].budget.as_ref().unwrap().total, 100.0);
    }

    #[test]
    fn test_budget_report_persisted_is_boolean() {
        let report = BudgetReport {
            year: 2025,
            official_total: 100.0,
            computed_total: 100.0,
            budgets: vec![],
            persisted: true,
            merged: 0,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["persisted"], serde_json::json!(true));
        assert_eq!(value["merged"], serde_json::json!(0));
    }
}
