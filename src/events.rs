// 🏷️ Event Extractor - household answers → categorical event tags
// Rules are evaluated per category, in a fixed order, with no short-circuiting

use crate::error::{PlannerError, Result};
use crate::household::{self, HouseholdRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// EVENT TAG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTag {
    // Sanitation & environment
    HasToilet,
    NoToilet,
    HasMrf,
    HasGarden,

    // Social protection
    #[serde(rename = "IS_4PS")]
    Is4ps,
    IsIp,

    // Health
    Smoker,
    FamilyPlanningUser,

    // Age brackets
    #[serde(rename = "AGE_UNDER_18")]
    AgeUnder18,
    #[serde(rename = "AGE_18_59")]
    Age18To59,
    #[serde(rename = "AGE_60_ABOVE")]
    Age60Above,

    // Sex
    SexFemale,
    SexMale,

    // Civil status
    CivilMarried,
    CivilSingle,

    // Education
    EduNoSchool,
    EduElementary,
    EduHighSchool,
    EduCollege,

    // Occupation
    OccupationHealthWorker,
    OccupationUnemployed,
    OccupationOther,

    // Fallback
    NoSignal,
}

impl EventTag {
    /// Every tag, in vocabulary order
    pub const ALL: [EventTag; 23] = [
        EventTag::HasToilet,
        EventTag::NoToilet,
        EventTag::HasMrf,
        EventTag::HasGarden,
        EventTag::Is4ps,
        EventTag::IsIp,
        EventTag::Smoker,
        EventTag::FamilyPlanningUser,
        EventTag::AgeUnder18,
        EventTag::Age18To59,
        EventTag::Age60Above,
        EventTag::SexFemale,
        EventTag::SexMale,
        EventTag::CivilMarried,
        EventTag::CivilSingle,
        EventTag::EduNoSchool,
        EventTag::EduElementary,
        EventTag::EduHighSchool,
        EventTag::EduCollege,
        EventTag::OccupationHealthWorker,
        EventTag::OccupationUnemployed,
        EventTag::OccupationOther,
        EventTag::NoSignal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::HasToilet => "HAS_TOILET",
            EventTag::NoToilet => "NO_TOILET",
            EventTag::HasMrf => "HAS_MRF",
            EventTag::HasGarden => "HAS_GARDEN",
            EventTag::Is4ps => "IS_4PS",
            EventTag::IsIp => "IS_IP",
            EventTag::Smoker => "SMOKER",
            EventTag::FamilyPlanningUser => "FAMILY_PLANNING_USER",
            EventTag::AgeUnder18 => "AGE_UNDER_18",
            EventTag::Age18To59 => "AGE_18_59",
            EventTag::Age60Above => "AGE_60_ABOVE",
            EventTag::SexFemale => "SEX_FEMALE",
            EventTag::SexMale => "SEX_MALE",
            EventTag::CivilMarried => "CIVIL_MARRIED",
            EventTag::CivilSingle => "CIVIL_SINGLE",
            EventTag::EduNoSchool => "EDU_NO_SCHOOL",
            EventTag::EduElementary => "EDU_ELEMENTARY",
            EventTag::EduHighSchool => "EDU_HIGH_SCHOOL",
            EventTag::EduCollege => "EDU_COLLEGE",
            EventTag::OccupationHealthWorker => "OCCUPATION_HEALTH_WORKER",
            EventTag::OccupationUnemployed => "OCCUPATION_UNEMPLOYED",
            EventTag::OccupationOther => "OCCUPATION_OTHER",
            EventTag::NoSignal => "NO_SIGNAL",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        EventTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| PlannerError::Configuration(format!("unknown event tag: {}", s)))
    }
}

// ============================================================================
// KEYWORD RULES (first match wins)
// ============================================================================

struct KeywordRule {
    tag: EventTag,
    keywords: &'static [&'static str],
}

impl KeywordRule {
    /// `text` must already be upper-cased
    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k))
    }
}

/// Priority order matters: "NO" is checked before the named levels.
const EDUCATION_RULES: [KeywordRule; 4] = [
    KeywordRule { tag: EventTag::EduNoSchool, keywords: &["NO"] },
    KeywordRule { tag: EventTag::EduElementary, keywords: &["ELEMENTARY"] },
    KeywordRule { tag: EventTag::EduHighSchool, keywords: &["HIGH SCHOOL"] },
    KeywordRule { tag: EventTag::EduCollege, keywords: &["COLLEGE"] },
];

const HEALTH_WORKER_KEYWORDS: &[&str] = &["BHW", "HEALTH"];

fn first_match(rules: &[KeywordRule], text: &str) -> Option<EventTag> {
    rules.iter().find(|r| r.matches(text)).map(|r| r.tag)
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Derive the ordered event sequence for one household. Never empty.
pub fn extract_events(h: &HouseholdRecord) -> Vec<EventTag> {
    let mut events = Vec::new();

    // Sanitation
    events.push(if h.flag(household::TOILET) {
        EventTag::HasToilet
    } else {
        EventTag::NoToilet
    });
    if h.flag(household::MRF_SEGREGATED) {
        events.push(EventTag::HasMrf);
    }
    if h.flag(household::GARDEN) {
        events.push(EventTag::HasGarden);
    }

    // Social protection
    if h.flag(household::FOUR_PS) {
        events.push(EventTag::Is4ps);
    }
    if h.flag(household::INDIGENOUS) {
        events.push(EventTag::IsIp);
    }

    // Health
    if h.flag(household::SMOKER) {
        events.push(EventTag::Smoker);
    }
    if h.truthy(household::FAMILY_PLANNING) {
        events.push(EventTag::FamilyPlanningUser);
    }

    // Age
    if let Some(age) = h.integer(household::AGE) {
        events.push(if age < 18 {
            EventTag::AgeUnder18
        } else if age < 60 {
            EventTag::Age18To59
        } else {
            EventTag::Age60Above
        });
    }

    // Sex
    match h.text(household::SEX).map(|s| s.trim().to_uppercase()).as_deref() {
        Some("F") => events.push(EventTag::SexFemale),
        Some("M") => events.push(EventTag::SexMale),
        _ => {}
    }

    // Civil status (single unless explicitly married)
    let married = h
        .text(household::CIVIL_STATUS)
        .map(|s| s.trim().eq_ignore_ascii_case("MARRIED"))
        .unwrap_or(false);
    events.push(if married {
        EventTag::CivilMarried
    } else {
        EventTag::CivilSingle
    });

    // Education
    let education = h.text(household::EDUCATION).unwrap_or("").to_uppercase();
    if let Some(tag) = first_match(&EDUCATION_RULES, &education) {
        events.push(tag);
    }

    // Occupation (absent column → no tag; blank → unemployed)
    if let Some(raw) = h.text(household::OCCUPATION) {
        let occupation = raw.to_uppercase();
        events.push(if HEALTH_WORKER_KEYWORDS.iter().any(|k| occupation.contains(k)) {
            EventTag::OccupationHealthWorker
        } else if occupation.trim().is_empty() {
            EventTag::OccupationUnemployed
        } else {
            EventTag::OccupationOther
        });
    }

    if events.is_empty() {
        events.push(EventTag::NoSignal);
    }

    events
}

// ============================================================================
// VOCABULARY
// ============================================================================

/// The tags a sequence scorer was trained on, in encoder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventVocabulary {
    tags: Vec<EventTag>,
}

impl EventVocabulary {
    pub fn new(tags: Vec<EventTag>) -> Self {
        let mut unique = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        EventVocabulary { tags: unique }
    }

    /// Full vocabulary (every tag the extractor can emit)
    pub fn full() -> Self {
        EventVocabulary::new(EventTag::ALL.to_vec())
    }

    /// Parse a list of tag names; unknown names are a configuration error
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let tags = names
            .iter()
            .map(|n| n.as_ref().parse::<EventTag>())
            .collect::<Result<Vec<_>>>()?;
        if tags.is_empty() {
            return Err(PlannerError::Configuration(
                "event vocabulary is empty".to_string(),
            ));
        }
        Ok(EventVocabulary::new(tags))
    }

    /// Load a JSON array of tag names
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::Configuration(format!(
                "cannot read event vocabulary {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let names: Vec<String> = serde_json::from_str(&content)?;
        Self::from_names(&names)
    }

    pub fn contains(&self, tag: EventTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Index of the tag in encoder order
    pub fn position(&self, tag: EventTag) -> Option<usize> {
        self.tags.iter().position(|t| *t == tag)
    }

    /// Drop unknown tags; substitute the fallback when nothing is left
    pub fn filter_known(&self, events: &[EventTag]) -> Vec<EventTag> {
        let known: Vec<EventTag> = events.iter().copied().filter(|t| self.contains(*t)).collect();
        if known.is_empty() {
            vec![EventTag::NoSignal]
        } else {
            known
        }
    }

    pub fn tags(&self) -> &[EventTag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::*;
    use serde_json::json;

    fn household(value: serde_json::Value) -> HouseholdRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_senior_household_scenario() {
        let h = household(json!({
            "TOILET": "Y",
            "AGE": 70,
            "SEX": "F",
            "4P'S": "Y",
        }));

        let events = extract_events(&h);

        assert_eq!(
            events,
            vec![
                EventTag::HasToilet,
                EventTag::Is4ps,
                EventTag::Age60Above,
                EventTag::SexFemale,
                EventTag::CivilSingle,
            ]
        );
        assert!(!events.iter().any(|e| e.as_str().starts_with("EDU_")));
        assert!(!events.iter().any(|e| e.as_str().starts_with("OCCUPATION_")));
    }

    #[test]
    fn test_empty_household_is_never_empty() {
        let events = extract_events(&HouseholdRecord::new());
        assert!(!events.is_empty());
        assert_eq!(events, vec![EventTag::NoToilet, EventTag::CivilSingle]);
    }

    #[test]
    fn test_full_household_category_order() {
        let h = household(json!({
            "TOILET": "N",
            "MRF SEGREGATED": "Y",
            "GARDEN": "Y",
            "4P'S": "Y",
            "IP'S": "Y",
            "SMOKER": "Y",
            "FAMILY PLANNING": "PILLS",
            "AGE": 34,
            "SEX": "M",
            "CIVIL STATUS": "MARRIED",
            "EDUCATIONAL ATTAINMENT": "College Graduate",
            "OCCUPATION": "Barangay Health Worker",
        }));

        assert_eq!(
            extract_events(&h),
            vec![
                EventTag::NoToilet,
                EventTag::HasMrf,
                EventTag::HasGarden,
                EventTag::Is4ps,
                EventTag::IsIp,
                EventTag::Smoker,
                EventTag::FamilyPlanningUser,
                EventTag::Age18To59,
                EventTag::SexMale,
                EventTag::CivilMarried,
                EventTag::EduCollege,
                EventTag::OccupationHealthWorker,
            ]
        );
    }

    #[test]
    fn test_age_brackets_and_invalid_age() {
        let tag_for = |age: serde_json::Value| {
            extract_events(&household(json!({ "AGE": age })))
                .into_iter()
                .find(|t| t.as_str().starts_with("AGE_"))
        };

        assert_eq!(tag_for(json!(17)), Some(EventTag::AgeUnder18));
        assert_eq!(tag_for(json!(18)), Some(EventTag::Age18To59));
        assert_eq!(tag_for(json!(59)), Some(EventTag::Age18To59));
        assert_eq!(tag_for(json!(60)), Some(EventTag::Age60Above));
        assert_eq!(tag_for(json!("70")), None);
        assert_eq!(tag_for(json!(null)), None);
    }

    #[test]
    fn test_education_priority_order() {
        let edu = |text: &str| {
            extract_events(&HouseholdRecord::new().with(EDUCATION, text))
                .into_iter()
                .find(|t| t.as_str().starts_with("EDU_"))
        };

        assert_eq!(edu("No formal education"), Some(EventTag::EduNoSchool));
        assert_eq!(edu("elementary graduate"), Some(EventTag::EduElementary));
        assert_eq!(edu("High School Level"), Some(EventTag::EduHighSchool));
        assert_eq!(edu("college undergraduate"), Some(EventTag::EduCollege));
        assert_eq!(edu("Vocational"), None);
    }

    #[test]
    fn test_occupation_rules() {
        let occ = |h: HouseholdRecord| {
            extract_events(&h)
                .into_iter()
                .find(|t| t.as_str().starts_with("OCCUPATION_"))
        };

        assert_eq!(
            occ(HouseholdRecord::new().with(OCCUPATION, "bhw")),
            Some(EventTag::OccupationHealthWorker)
        );
        assert_eq!(
            occ(HouseholdRecord::new().with(OCCUPATION, "   ")),
            Some(EventTag::OccupationUnemployed)
        );
        assert_eq!(
            occ(HouseholdRecord::new().with(OCCUPATION, "Farmer")),
            Some(EventTag::OccupationOther)
        );
        assert_eq!(occ(HouseholdRecord::new()), None);
    }

    #[test]
    fn test_unrecognized_sex_emits_nothing() {
        let events = extract_events(&HouseholdRecord::new().with(SEX, "X"));
        assert!(!events.contains(&EventTag::SexFemale));
        assert!(!events.contains(&EventTag::SexMale));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let h = household(json!({ "GARDEN": "Y", "AGE": 5, "SEX": "F", "OCCUPATION": "" }));
        assert_eq!(extract_events(&h), extract_events(&h));
    }

    #[test]
    fn test_tag_names_round_trip() {
        for tag in EventTag::ALL {
            assert_eq!(tag.as_str().parse::<EventTag>().unwrap(), tag);
            assert_eq!(
                serde_json::to_value(tag).unwrap(),
                serde_json::Value::String(tag.as_str().to_string())
            );
        }
        assert!("NOT_A_TAG".parse::<EventTag>().is_err());
    }

    #[test]
    fn test_vocabulary_filter_falls_back() {
        let vocab = EventVocabulary::from_names(&["HAS_TOILET", "NO_SIGNAL"]).unwrap();

        assert_eq!(
            vocab.filter_known(&[EventTag::HasToilet, EventTag::SexMale]),
            vec![EventTag::HasToilet]
        );
        assert_eq!(
            vocab.filter_known(&[EventTag::SexMale]),
            vec![EventTag::NoSignal]
        );
        assert!(EventVocabulary::from_names(&["BOGUS"]).is_err());
        assert!(EventVocabulary::from_names::<&str>(&[]).is_err());
    }
}
