// 📊 Ranking & Aggregation Engine - per-household top-K → population priorities
//
// Per household:   weighted_score = (probability / top1_probability) / rank
// Per program:     need = average_score × beneficiary_count
// Tiers:           by position in the need-sorted list (thirds, real division)

use crate::budget::ReconciledBudget;
use crate::catalog::ProgramCatalog;
use crate::error::Result;
use crate::events::extract_events;
use crate::household::HouseholdRecord;
use crate::scorer::SequenceScorer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const LATEST_SCOPE: &str = "LATEST";

// ============================================================================
// PRIORITY TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// Tier of the item at `index` in a list of `len` items.
    ///
    /// High iff index < len/3, Medium iff index < 2·len/3, else Low.
    /// Real-number division: for len = 4 the cuts sit at 1.33 and 2.67.
    pub fn for_position(index: usize, len: usize) -> Self {
        let i = index as f64;
        let n = len as f64;
        if i < n / 3.0 {
            PriorityTier::High
        } else if i < 2.0 * n / 3.0 {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::High => "High",
            PriorityTier::Medium => "Medium",
            PriorityTier::Low => "Low",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SCORED PROGRAM (per household)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProgram {
    pub program_id: String,

    /// 1-based rank within this household's top-K
    pub rank: usize,

    pub probability: f64,

    /// In (0, 1]; 1.0 for the household's top program
    pub weighted_score: f64,
}

// ============================================================================
// AGGREGATED RECOMMENDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecommendation {
    /// Generated per run (not stable across runs)
    pub id: String,
    pub program_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: PriorityTier,

    /// Households that had this program in their top-K
    pub beneficiary_count: usize,
    pub average_score: f64,
    pub coverage_ratio: f64,
    pub need_score: f64,

    pub generated_at: DateTime<Utc>,

    /// Attached by budget reconciliation; None until then
    #[serde(default)]
    pub budget: Option<ReconciledBudget>,
}

/// The persisted "latest" recommendation list. Replaced wholesale by ranking;
/// budgets are merged into it in place by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub scope: String,
    pub generated_at: DateTime<Utc>,
    pub total_households: usize,
    pub recommendations: Vec<AggregatedRecommendation>,
}

impl RecommendationRecord {
    pub fn latest(total_households: usize, recommendations: Vec<AggregatedRecommendation>) -> Self {
        RecommendationRecord {
            scope: LATEST_SCOPE.to_string(),
            generated_at: Utc::now(),
            total_households,
            recommendations,
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.recommendations.iter().map(|r| r.title.clone()).collect()
    }

    pub fn has_budgets(&self) -> bool {
        self.recommendations.iter().any(|r| r.budget.is_some())
    }
}

// ============================================================================
// RANKING ENGINE
// ============================================================================

pub struct RankingEngine {
    /// Programs kept per household (clipped to catalog size)
    pub top_k: usize,

    /// Guard for a zero top-1 probability
    pub epsilon: f64,
}

impl RankingEngine {
    pub fn new() -> Self {
        RankingEngine {
            top_k: 8,
            epsilon: 1e-6,
        }
    }

    pub fn with_top_k(top_k: usize) -> Self {
        RankingEngine {
            top_k,
            ..Self::new()
        }
    }

    /// Rank a batch of households into a prioritized program list.
    ///
    /// Any scorer failure aborts the whole batch; no partial list is returned.
    pub fn recommend(
        &self,
        catalog: &ProgramCatalog,
        scorer: &dyn SequenceScorer,
        households: &[HouseholdRecord],
    ) -> Result<Vec<AggregatedRecommendation>> {
        // Score lists indexed by catalog position
        let mut hits: Vec<Vec<f64>> = vec![Vec::new(); catalog.len()];

        for household in households {
            for scored in self.rank_household(catalog, scorer, household)? {
                if let Some(pos) = catalog.position(&scored.program_id) {
                    hits[pos].push(scored.weighted_score);
                }
            }
        }

        let recommendations = self.aggregate(catalog, households.len(), &hits);

        tracing::info!(
            households = households.len(),
            programs = recommendations.len(),
            "ranked recommendations"
        );

        Ok(recommendations)
    }

    /// Extract → filter to vocabulary → score → top-K weighted scores
    pub fn rank_household(
        &self,
        catalog: &ProgramCatalog,
        scorer: &dyn SequenceScorer,
        household: &HouseholdRecord,
    ) -> Result<Vec<ScoredProgram>> {
        let events = extract_events(household);
        let sequence = scorer.vocabulary().filter_known(&events);
        let probabilities = scorer.score(&sequence)?;

        tracing::debug!(events = ?sequence, "scored household");

        Ok(self.select_top_k(catalog, &probabilities))
    }

    /// Highest-probability programs, ties kept in catalog order
    pub fn select_top_k(
        &self,
        catalog: &ProgramCatalog,
        probabilities: &HashMap<String, f64>,
    ) -> Vec<ScoredProgram> {
        let mut ranked: Vec<(&str, f64)> = catalog
            .ids()
            .map(|id| (id, probabilities.get(id).copied().unwrap_or(0.0)))
            .collect();

        // Stable: equal probabilities keep catalog order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.top_k.min(catalog.len()));

        let top = ranked.first().map(|(_, p)| *p).unwrap_or(0.0);
        let max_prob = if top > 0.0 { top } else { self.epsilon };

        ranked
            .into_iter()
            .enumerate()
            .map(|(i, (id, probability))| {
                let rank = i + 1;
                ScoredProgram {
                    program_id: id.to_string(),
                    rank,
                    probability,
                    weighted_score: (probability / max_prob) / rank as f64,
                }
            })
            .collect()
    }

    /// Population statistics, need-sorted and tiered. Programs with no hits are omitted.
    pub fn aggregate(
        &self,
        catalog: &ProgramCatalog,
        total_households: usize,
        hits: &[Vec<f64>],
    ) -> Vec<AggregatedRecommendation> {
        let now = Utc::now();

        let mut results: Vec<AggregatedRecommendation> = catalog
            .programs()
            .iter()
            .zip(hits)
            .filter(|(_, scores)| !scores.is_empty())
            .map(|(template, scores)| {
                let beneficiary_count = scores.len();
                let average_score = scores.iter().sum::<f64>() / beneficiary_count as f64;
                let coverage_ratio = if total_households == 0 {
                    0.0
                } else {
                    beneficiary_count as f64 / total_households as f64
                };

                AggregatedRecommendation {
                    id: uuid::Uuid::new_v4().to_string(),
                    program_id: template.id.clone(),
                    title: template.title.clone(),
                    description: template.description.clone(),
                    category: template.category.clone(),
                    priority: PriorityTier::Low,
                    beneficiary_count,
                    average_score,
                    coverage_ratio,
                    need_score: average_score * beneficiary_count as f64,
                    generated_at: now,
                    budget: None,
                }
            })
            .collect();

        // Stable sort: ties stay in catalog order
        results.sort_by(|a, b| b.need_score.total_cmp(&a.need_score));

        let n = results.len();
        for (i, rec) in results.iter_mut().enumerate() {
            rec.priority = PriorityTier::for_position(i, n);
        }

        results
    }
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
