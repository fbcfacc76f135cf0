// 📈 Budget Regressor - context rows → raw PS / MOOE / CO predictions
//
// Three independent regressors share one feature encoding:
//   (program label, funding source) → fixed class indexes, year as-is.
// Unseen categorical values fall back to class 0 instead of erroring.

use crate::budget::BudgetPrediction;
use crate::error::{PlannerError, Result};
use crate::matcher::BudgetContextRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// CATEGORICAL ENCODER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoricalEncoder {
    classes: Vec<String>,
}

impl CategoricalEncoder {
    /// Fixed class ordering. At least one class is required (the fallback).
    pub fn new(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            return Err(PlannerError::Configuration(
                "categorical encoder has no classes".to_string(),
            ));
        }
        Ok(CategoricalEncoder { classes })
    }

    /// Sorted unique classes from observed values
    pub fn fit<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = values.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self::new(classes)
    }

    /// Class index; unseen values map to class 0
    pub fn encode(&self, value: &str) -> usize {
        self.classes.iter().position(|c| c == value).unwrap_or(0)
    }

    pub fn is_known(&self, value: &str) -> bool {
        self.classes.iter().any(|c| c == value)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedFeatures {
    pub program: usize,
    pub funding_source: usize,
    pub year: i32,
}

/// One budget component predictor. Output is non-negative.
pub trait BudgetRegressor: Send + Sync {
    fn predict(&self, features: &EncodedFeatures) -> f64;
}

// ============================================================================
// LOOKUP REGRESSOR
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEntry {
    pub program: usize,
    pub funding_source: usize,
    #[serde(default)]
    pub year: Option<i32>,
    pub value: f64,
}

/// On-disk form of a lookup regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupTable {
    pub entries: Vec<LookupEntry>,
    #[serde(default)]
    pub fallback: f64,
}

/// Most specific match wins:
/// (program, source, year) → mean over (program, source) → mean over program → fallback
pub struct LookupRegressor {
    exact: HashMap<(usize, usize, i32), f64>,
    by_source: HashMap<(usize, usize), f64>,
    by_program: HashMap<usize, f64>,
    fallback: f64,
}

impl LookupRegressor {
    pub fn new(table: LookupTable) -> Self {
        let mut exact = HashMap::new();
        let mut source_sums: HashMap<(usize, usize), (f64, usize)> = HashMap::new();
        let mut program_sums: HashMap<usize, (f64, usize)> = HashMap::new();

        for entry in &table.entries {
            if let Some(year) = entry.year {
                exact.insert((entry.program, entry.funding_source, year), entry.value);
            }
            let s = source_sums
                .entry((entry.program, entry.funding_source))
                .or_insert((0.0, 0));
            s.0 += entry.value;
            s.1 += 1;
            let p = program_sums.entry(entry.program).or_insert((0.0, 0));
            p.0 += entry.value;
            p.1 += 1;
        }

        let mean = |(sum, n): (f64, usize)| sum / n as f64;

        LookupRegressor {
            exact,
            by_source: source_sums.into_iter().map(|(k, v)| (k, mean(v))).collect(),
            by_program: program_sums.into_iter().map(|(k, v)| (k, mean(v))).collect(),
            fallback: table.fallback,
        }
    }
}

impl BudgetRegressor for LookupRegressor {
    fn predict(&self, f: &EncodedFeatures) -> f64 {
        let value = self
            .exact
            .get(&(f.program, f.funding_source, f.year))
            .or_else(|| self.by_source.get(&(f.program, f.funding_source)))
            .or_else(|| self.by_program.get(&f.program))
            .copied()
            .unwrap_or(self.fallback);
        value.max(0.0)
    }
}

// ============================================================================
// PRIORS
// ============================================================================

/// Historical population means per component
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetPriors {
    pub ps_mean: f64,
    pub mooe_mean: f64,
    pub co_mean: f64,
}

// ============================================================================
// BUDGET MODEL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetModelArtifact {
    pub program_classes: Vec<String>,
    pub funding_classes: Vec<String>,
    pub priors: BudgetPriors,
    pub ps: LookupTable,
    pub mooe: LookupTable,
    pub co: LookupTable,
}

pub struct BudgetModel {
    program_encoder: CategoricalEncoder,
    funding_encoder: CategoricalEncoder,
    ps: Box<dyn BudgetRegressor>,
    mooe: Box<dyn BudgetRegressor>,
    co: Box<dyn BudgetRegressor>,
    priors: BudgetPriors,

    /// Raw predictions are floored at this fraction of the prior mean
    floor_ratio: f64,
}

impl BudgetModel {
    pub fn new(
        program_encoder: CategoricalEncoder,
        funding_encoder: CategoricalEncoder,
        regressors: [Box<dyn BudgetRegressor>; 3],
        priors: BudgetPriors,
    ) -> Self {
        let [ps, mooe, co] = regressors;
        BudgetModel {
            program_encoder,
            funding_encoder,
            ps,
            mooe,
            co,
            priors,
            floor_ratio: 0.25,
        }
    }

    pub fn with_floor_ratio(mut self, floor_ratio: f64) -> Self {
        self.floor_ratio = floor_ratio;
        self
    }

    pub fn from_artifact(artifact: BudgetModelArtifact) -> Result<Self> {
        Ok(BudgetModel::new(
            CategoricalEncoder::new(artifact.program_classes)?,
            CategoricalEncoder::new(artifact.funding_classes)?,
            [
                Box::new(LookupRegressor::new(artifact.ps)),
                Box::new(LookupRegressor::new(artifact.mooe)),
                Box::new(LookupRegressor::new(artifact.co)),
            ],
            artifact.priors,
        ))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::Configuration(format!(
                "cannot read budget model {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let artifact: BudgetModelArtifact = serde_json::from_str(&content).map_err(|e| {
            PlannerError::Configuration(format!("invalid budget model artifact: {}", e))
        })?;
        Self::from_artifact(artifact)
    }

    pub fn encode(&self, row: &BudgetContextRow) -> EncodedFeatures {
        EncodedFeatures {
            program: self.program_encoder.encode(&row.program_label),
            funding_source: self.funding_encoder.encode(&row.funding_source),
            year: row.year,
        }
    }

    pub fn priors(&self) -> BudgetPriors {
        self.priors
    }

    /// Mean prediction over the context rows, per component, floored at
    /// `floor_ratio` × the component's prior mean.
    pub fn predict_raw(&self, program: &str, context: &[BudgetContextRow]) -> BudgetPrediction {
        let features: Vec<EncodedFeatures> = context.iter().map(|r| self.encode(r)).collect();

        let mean_of = |model: &dyn BudgetRegressor| -> f64 {
            if features.is_empty() {
                return 0.0;
            }
            features.iter().map(|f| model.predict(f)).sum::<f64>() / features.len() as f64
        };

        BudgetPrediction {
            program: program.to_string(),
            ps: mean_of(self.ps.as_ref()).max(self.priors.ps_mean * self.floor_ratio),
            mooe: mean_of(self.mooe.as_ref()).max(self.priors.mooe_mean * self.floor_ratio),
            co: mean_of(self.co.as_ref()).max(self.priors.co_mean * self.floor_ratio),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
