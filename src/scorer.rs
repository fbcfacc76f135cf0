// 🎯 Sequence Scorer - event sequence → probability per catalog program
// The trait is the contract; AffinityScorer is a table-driven model behind it

use crate::catalog::ProgramCatalog;
use crate::error::{PlannerError, Result};
use crate::events::{EventTag, EventVocabulary};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Opaque scoring function over the fixed program catalog.
///
/// `score` receives a non-empty sequence of tags from `vocabulary()` and
/// returns a probability per program id; probabilities sum to 1.
pub trait SequenceScorer: Send + Sync {
    fn vocabulary(&self) -> &EventVocabulary;

    fn score(&self, sequence: &[EventTag]) -> Result<HashMap<String, f64>>;
}

// ============================================================================
// ARTIFACT FORMAT
// ============================================================================

/// On-disk affinity table: `{ "vocabulary": [...], "affinities": { TAG: { PROGRAM_ID: weight } } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityArtifact {
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub affinities: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
}

fn default_recency_weight() -> f64 {
    2.0
}

// ============================================================================
// AFFINITY SCORER
// ============================================================================

/// Additive tag→program logits followed by a softmax over the catalog.
///
/// The last tag in the sequence is weighted by `recency_weight`, so the
/// final event carries more signal than earlier ones.
pub struct AffinityScorer {
    vocabulary: EventVocabulary,
    program_ids: Vec<String>,
    /// Logits per tag, indexed by catalog position
    logits: HashMap<EventTag, Vec<f64>>,
    recency_weight: f64,
}

impl AffinityScorer {
    /// Validate an artifact against the catalog; unknown tags or programs are configuration errors
    pub fn from_artifact(artifact: AffinityArtifact, catalog: &ProgramCatalog) -> Result<Self> {
        let vocabulary = EventVocabulary::from_names(&artifact.vocabulary)?;
        // All-unknown households fall back to NO_SIGNAL
        if !vocabulary.contains(EventTag::NoSignal) {
            return Err(PlannerError::Configuration(format!(
                "scorer vocabulary must contain {}",
                EventTag::NoSignal
            )));
        }
        let mut logits = HashMap::new();

        for (tag_name, weights) in &artifact.affinities {
            let tag: EventTag = tag_name.parse()?;
            if !vocabulary.contains(tag) {
                return Err(PlannerError::Configuration(format!(
                    "affinity tag {} is not in the scorer vocabulary",
                    tag
                )));
            }

            let mut row = vec![0.0; catalog.len()];
            for (program_id, weight) in weights {
                let pos = catalog.position(program_id).ok_or_else(|| {
                    PlannerError::Configuration(format!(
                        "affinity for unknown program: {}",
                        program_id
                    ))
                })?;
                row[pos] = *weight;
            }
            logits.insert(tag, row);
        }

        Ok(AffinityScorer {
            vocabulary,
            program_ids: catalog.ids().map(str::to_string).collect(),
            logits,
            recency_weight: artifact.recency_weight,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, catalog: &ProgramCatalog) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::Configuration(format!(
                "cannot read scorer artifact {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let artifact: AffinityArtifact = serde_json::from_str(&content).map_err(|e| {
            PlannerError::Configuration(format!("invalid scorer artifact: {}", e))
        })?;
        Self::from_artifact(artifact, catalog)
    }

    /// Default table over the full vocabulary. Programs missing from the catalog are skipped.
    pub fn builtin(catalog: &ProgramCatalog) -> Self {
        let mut logits = HashMap::new();

        for (tag, weights) in BUILTIN_AFFINITIES {
            let mut row = vec![0.0; catalog.len()];
            for (program_id, weight) in *weights {
                if let Some(pos) = catalog.position(program_id) {
                    row[pos] = *weight;
                }
            }
            logits.insert(*tag, row);
        }

        AffinityScorer {
            vocabulary: EventVocabulary::full(),
            program_ids: catalog.ids().map(str::to_string).collect(),
            logits,
            recency_weight: default_recency_weight(),
        }
    }
}

impl SequenceScorer for AffinityScorer {
    fn vocabulary(&self) -> &EventVocabulary {
        &self.vocabulary
    }

    fn score(&self, sequence: &[EventTag]) -> Result<HashMap<String, f64>> {
        if sequence.is_empty() {
            return Err(PlannerError::ModelUnavailable(
                "sequence scorer received an empty sequence".to_string(),
            ));
        }

        let mut logits = vec![0.0; self.program_ids.len()];
        let last = sequence.len() - 1;

        for (i, tag) in sequence.iter().enumerate() {
            if !self.vocabulary.contains(*tag) {
                return Err(PlannerError::ModelUnavailable(format!(
                    "tag {} is outside the scorer vocabulary",
                    tag
                )));
            }
            let weight = if i == last { self.recency_weight } else { 1.0 };
            if let Some(row) = self.logits.get(tag) {
                for (acc, v) in logits.iter_mut().zip(row) {
                    *acc += weight * v;
                }
            }
        }

        let probs = softmax(&logits);

        Ok(self
            .program_ids
            .iter()
            .cloned()
            .zip(probs)
            .collect())
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

// ============================================================================
// BUILT-IN AFFINITY TABLE
// ============================================================================

const BUILTIN_AFFINITIES: &[(EventTag, &[(&str, f64)])] = &[
    (EventTag::HasToilet, &[
        ("HEALTH_AND_NUTRITION", 0.5),
        ("WATER_SUPPLY_IMPROVEMENT", 0.5),
        ("GENERAL_ADMINISTRATION", 0.3),
    ]),
    (EventTag::NoToilet, &[
        ("WATER_SUPPLY_IMPROVEMENT", 2.0),
        ("GAD_BASIC_SERVICES", 1.5),
        ("HEALTH_CENTER_COUNTERPART", 1.0),
        ("SOLID_WASTE_MANAGEMENT", 1.0),
    ]),
    (EventTag::HasMrf, &[
        ("SOLID_WASTE_MANAGEMENT", 2.0),
        ("TREE_PLANTING", 0.8),
    ]),
    (EventTag::HasGarden, &[
        ("URBAN_GARDENING", 2.0),
        ("AGRICULTURE_PROGRAMS", 1.5),
        ("TREE_PLANTING", 0.8),
    ]),
    (EventTag::Is4ps, &[
        ("LIVELIHOOD_TRAINING", 1.5),
        ("HEALTH_AND_NUTRITION", 1.2),
        ("GAD_BASIC_SERVICES", 1.0),
        ("MICRO_ENTERPRISE_SUPPORT", 0.8),
    ]),
    (EventTag::IsIp, &[
        ("COMMUNITY_ORGANIZING", 1.5),
        ("GAD_BASIC_SERVICES", 1.0),
        ("INFORMATION_CAMPAIGN", 0.8),
    ]),
    (EventTag::Smoker, &[
        ("INFORMATION_CAMPAIGN", 1.5),
        ("HEALTH_AND_NUTRITION", 1.0),
        ("MEDICAL_EQUIPMENT", 0.8),
    ]),
    (EventTag::FamilyPlanningUser, &[
        ("FAMILY_PLANNING", 2.0),
        ("WOMEN_EMPOWERMENT", 0.8),
    ]),
    (EventTag::AgeUnder18, &[
        ("YOUTH_DEVELOPMENT", 2.0),
        ("SK_APPROPRIATION", 1.5),
        ("BCPC_PROGRAM", 1.5),
    ]),
    (EventTag::Age18To59, &[
        ("LIVELIHOOD_TRAINING", 1.0),
        ("MICRO_ENTERPRISE_SUPPORT", 0.8),
        ("LOCAL_ROADS", 0.6),
    ]),
    (EventTag::Age60Above, &[
        ("SENIOR_CITIZEN_SUPPORT", 2.0),
        ("HEALTH_CENTER_COUNTERPART", 1.0),
        ("MEDICAL_EQUIPMENT", 1.0),
    ]),
    (EventTag::SexFemale, &[
        ("WOMEN_EMPOWERMENT", 1.5),
        ("FAMILY_PLANNING", 0.8),
        ("GAD_BASIC_SERVICES", 0.8),
    ]),
    (EventTag::SexMale, &[
        ("LIVELIHOOD_TRAINING", 0.6),
        ("LOCAL_ROADS", 0.5),
    ]),
    (EventTag::CivilMarried, &[
        ("FAMILY_PLANNING", 1.0),
        ("HEALTH_AND_NUTRITION", 0.6),
    ]),
    (EventTag::CivilSingle, &[
        ("YOUTH_DEVELOPMENT", 0.4),
        ("COMMUNITY_ORGANIZING", 0.3),
    ]),
    (EventTag::EduNoSchool, &[
        ("INFORMATION_CAMPAIGN", 1.2),
        ("LIVELIHOOD_TRAINING", 1.0),
    ]),
    (EventTag::EduElementary, &[
        ("LIVELIHOOD_TRAINING", 0.8),
        ("INFORMATION_CAMPAIGN", 0.6),
    ]),
    (EventTag::EduHighSchool, &[
        ("MICRO_ENTERPRISE_SUPPORT", 0.6),
        ("YOUTH_DEVELOPMENT", 0.5),
    ]),
    (EventTag::EduCollege, &[
        ("BARANGAY_DATA_SYSTEM", 1.0),
        ("MICRO_ENTERPRISE_SUPPORT", 0.6),
    ]),
    (EventTag::OccupationHealthWorker, &[
        ("HEALTH_CENTER_COUNTERPART", 1.5),
        ("MEDICAL_EQUIPMENT", 1.5),
        ("HEALTH_AND_NUTRITION", 1.0),
    ]),
    (EventTag::OccupationUnemployed, &[
        ("LIVELIHOOD_TRAINING", 1.8),
        ("MICRO_ENTERPRISE_SUPPORT", 1.0),
    ]),
    (EventTag::OccupationOther, &[
        ("STREETLIGHTS", 0.5),
        ("LOCAL_ROADS", 0.5),
    ]),
    (EventTag::NoSignal, &[
        ("GENERAL_ADMINISTRATION", 1.0),
        ("BARANGAY_DATA_SYSTEM", 1.0),
        ("CLIMATE_ADAPTATION", 0.5),
        ("BDRRM_APPROPRIATION", 0.5),
    ]),
];

// ============================================================================
// TESTS
// ============================================================================
