// 🔍 Context Matcher - fuzzy program ↔ ledger row matching
// Jaccard similarity over lowercase alphabetic word sets
//
// Deliberately loose: near-duplicates are expected and not deduplicated here.

use crate::ledger::{LedgerRow, UNKNOWN_FUNDING_SOURCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Feature context for one matched ledger row.
/// `program_label` is the program's own (lower-cased) title, never the ledger text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetContextRow {
    pub program_label: String,
    pub funding_source: String,
    pub year: i32,
}

/// Lowercase alphabetic words; everything else separates words
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_lowercase())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// |A ∩ B| / |A ∪ B|, or None when either side has no words
pub fn jaccard_similarity(a: &str, b: &str) -> Option<f64> {
    let a_set = tokenize(a);
    let b_set = tokenize(b);

    if a_set.is_empty() || b_set.is_empty() {
        return None;
    }

    let intersection = a_set.intersection(&b_set).count();
    let union = a_set.union(&b_set).count();

    Some(intersection as f64 / union as f64)
}

// ============================================================================
// CONTEXT MATCHER
// ============================================================================

pub struct ContextMatcher {
    /// Minimum similarity for a match (default: 0.20)
    pub threshold: f64,
}

impl ContextMatcher {
    pub fn new() -> Self {
        ContextMatcher { threshold: 0.20 }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        ContextMatcher { threshold }
    }

    /// Symmetric; empty word sets never match
    pub fn is_match(&self, a: &str, b: &str) -> bool {
        jaccard_similarity(a, b)
            .map(|s| s >= self.threshold)
            .unwrap_or(false)
    }

    /// Build the regressor context for one program.
    ///
    /// Rows with a non-integer year are skipped with a warning.
    /// With zero matches a single synthetic row (requested year, "Unknown"
    /// funding) is returned, so the result is never empty.
    pub fn match_context<'a, I>(&self, program: &str, year: i32, rows: I) -> Vec<BudgetContextRow>
    where
        I: IntoIterator<Item = &'a LedgerRow>,
    {
        let label = program.to_lowercase();
        let mut context = Vec::new();
        let mut skipped = 0usize;

        for row in rows {
            if !self.is_match(program, &row.match_text()) {
                continue;
            }

            match row.year() {
                Ok(row_year) => context.push(BudgetContextRow {
                    program_label: label.clone(),
                    funding_source: row.funding_source(),
                    year: row_year,
                }),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(program, error = %e, "skipping ledger row");
                }
            }
        }

        tracing::debug!(
            program,
            matched = context.len(),
            skipped,
            "matched ledger context"
        );

        if context.is_empty() {
            context.push(BudgetContextRow {
                program_label: label,
                funding_source: UNKNOWN_FUNDING_SOURCE.to_string(),
                year,
            });
        }

        context
    }
}

impl Default for ContextMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerCollection, FUNDING_SOURCE, YEAR};

    fn row(text: &str, year: &str) -> LedgerRow {
        LedgerRow::new(LedgerCollection::Api)
            .with("Program/ Project/ Activity Description", text)
            .with(YEAR, year)
    }

    #[test]
    fn test_tokenize() {
        let words = tokenize("Counterpart for Construction of Health Center / Facilities (2023)");
        assert!(words.contains("health"));
        assert!(words.contains("facilities"));
        assert!(!words.iter().any(|w| w.chars().any(|c| c.is_ascii_digit())));
        assert_eq!(tokenize("Multi-purpose"), tokenize("multi purpose"));
    }

    #[test]
    fn test_jaccard_identity_and_symmetry() {
        let a = "Solid Waste Management Program";
        let b = "Waste segregation and collection program";

        assert_eq!(jaccard_similarity(a, a), Some(1.0));
        assert_eq!(jaccard_similarity(a, b), jaccard_similarity(b, a));

        let matcher = ContextMatcher::new();
        assert!(matcher.is_match(a, a));
        assert_eq!(matcher.is_match(a, b), matcher.is_match(b, a));
    }

    #[test]
    fn test_empty_sets_never_match() {
        let matcher = ContextMatcher::new();
        assert_eq!(jaccard_similarity("", "anything"), None);
        assert!(!matcher.is_match("123 456", "123 456"));
        assert!(!matcher.is_match("", ""));
    }

    #[test]
    fn test_threshold_boundary() {
        // {a b c d e} vs {a} → 1/5 = 0.20 exactly
        let matcher = ContextMatcher::new();
        assert!(matcher.is_match("alpha beta gamma delta epsilon", "alpha"));
        // {a b c d e f} vs {a} → 1/6 < 0.20
        assert!(!matcher.is_match("alpha beta gamma delta epsilon zeta", "alpha"));
    }

    #[test]
    fn test_match_context_uses_program_label() {
        let matcher = ContextMatcher::new();
        let rows = vec![
            row("Urban gardening program for households", "2022")
                .with(FUNDING_SOURCE, "20% Development Fund"),
            row("Road concreting", "2022"),
        ];

        let context = matcher.match_context("Urban Gardening Program", 2025, &rows);

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].program_label, "urban gardening program");
        assert_eq!(context[0].funding_source, "20% Development Fund");
        assert_eq!(context[0].year, 2022);
    }

    #[test]
    fn test_match_context_skips_bad_years() {
        let matcher = ContextMatcher::new();
        let rows = vec![
            row("Tree Growing and Greening Program", "n/a"),
            row("Tree Growing and Greening Program", "2021"),
        ];

        let context = matcher.match_context("Tree Growing and Greening Program", 2025, &rows);

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].year, 2021);
        assert_eq!(context[0].funding_source, "Unknown");
    }

    #[test]
    fn test_match_context_synthetic_row() {
        let matcher = ContextMatcher::new();
        let rows = vec![row("Road concreting", "2022")];

        let context = matcher.match_context("Senior Citizen Welfare Program", 2025, &rows);

        assert_eq!(
            context,
            vec![BudgetContextRow {
                program_label: "senior citizen welfare program".to_string(),
                funding_source: "Unknown".to_string(),
                year: 2025,
            }]
        );
    }
}
