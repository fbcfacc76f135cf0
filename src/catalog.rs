// 📚 Program Catalog - reference data for every recommendable program
// Loaded once at startup and shared read-only (Arc<ProgramCatalog>)
//
// Catalog order is significant: it is the tie-break order for ranking.

use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// PROGRAM TEMPLATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramTemplate {
    /// Stable identifier (e.g. "SOLID_WASTE_MANAGEMENT")
    pub id: String,

    /// Display title; also the key budgets are merged on
    pub title: String,

    /// Service category (e.g. "Environmental Services")
    pub category: String,

    pub description: String,
}

impl ProgramTemplate {
    pub fn new(id: &str, title: &str, category: &str, description: &str) -> Self {
        ProgramTemplate {
            id: id.to_string(),
            title: title.to_string(),
            category: category.to_string(),
            description: description.to_string(),
        }
    }
}

// ============================================================================
// PROGRAM CATALOG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProgramCatalog {
    programs: Vec<ProgramTemplate>,
    index: HashMap<String, usize>,
}

impl ProgramCatalog {
    /// Build from an ordered list. Empty lists and duplicate ids are rejected.
    pub fn from_programs(programs: Vec<ProgramTemplate>) -> Result<Self> {
        if programs.is_empty() {
            return Err(PlannerError::Configuration(
                "program catalog is empty".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(programs.len());
        for (i, program) in programs.iter().enumerate() {
            if index.insert(program.id.clone(), i).is_some() {
                return Err(PlannerError::Configuration(format!(
                    "duplicate program id in catalog: {}",
                    program.id
                )));
            }
        }

        Ok(ProgramCatalog { programs, index })
    }

    /// Load an ordered JSON array of program templates
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::Configuration(format!(
                "cannot read program catalog {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let programs: Vec<ProgramTemplate> = serde_json::from_str(&content).map_err(|e| {
            PlannerError::Configuration(format!("invalid program catalog JSON: {}", e))
        })?;

        Self::from_programs(programs)
    }

    /// CLUP-aligned barangay programs
    ///
    /// Categories:
    /// - General Services
    /// - Social Services
    /// - Infrastructure Services
    /// - Environmental Services
    /// - Economic Services
    /// - Other Services
    pub fn builtin() -> Self {
        let programs = vec![
            // ================================================================
            // GENERAL SERVICES
            // ================================================================
            ProgramTemplate::new(
                "GENERAL_ADMINISTRATION",
                "General Administration Program",
                "General Services",
                "Support for barangay governance, administrative operations, and service delivery.",
            ),
            ProgramTemplate::new(
                "COMMUNITY_ORGANIZING",
                "Community Organizing Program",
                "General Services",
                "Strengthening community organizations and citizen participation.",
            ),
            ProgramTemplate::new(
                "INFORMATION_CAMPAIGN",
                "Information and Education Campaigns",
                "General Services",
                "Awareness campaigns on health, environment, and social programs.",
            ),
            ProgramTemplate::new(
                "BARANGAY_DATA_SYSTEM",
                "Barangay Data Management System",
                "General Services",
                "Improved data collection and information systems for barangay planning.",
            ),
            // ================================================================
            // SOCIAL SERVICES
            // ================================================================
            ProgramTemplate::new(
                "MULTI_PURPOSE_HALL",
                "Construction of Multi-purpose Hall",
                "Social Services",
                "Construction or rehabilitation of barangay multi-purpose halls for community activities.",
            ),
            ProgramTemplate::new(
                "HEALTH_CENTER_COUNTERPART",
                "Counterpart for Construction of Health Center / Facilities",
                "Social Services",
                "Barangay counterpart funding for the construction or upgrading of health centers.",
            ),
            ProgramTemplate::new(
                "MEDICAL_EQUIPMENT",
                "Purchase of Medical Equipment",
                "Social Services",
                "Procurement of essential medical equipment for barangay health services.",
            ),
            ProgramTemplate::new(
                "HEALTH_AND_NUTRITION",
                "Community Health and Nutrition Services",
                "Social Services",
                "Barangay-level health services including maternal care, child nutrition monitoring, and basic medical assistance.",
            ),
            ProgramTemplate::new(
                "FAMILY_PLANNING",
                "Family Planning and Reproductive Health Program",
                "Social Services",
                "Provision of reproductive health education, counseling, and access to family planning services.",
            ),
            ProgramTemplate::new(
                "SENIOR_CITIZEN_SUPPORT",
                "Senior Citizen Welfare Program",
                "Social Services",
                "Health monitoring, social protection, and welfare support for senior citizens.",
            ),
            ProgramTemplate::new(
                "WOMEN_EMPOWERMENT",
                "Women Empowerment and Gender Development",
                "Social Services",
                "Programs promoting women participation, livelihood support, and gender equality.",
            ),
            ProgramTemplate::new(
                "YOUTH_DEVELOPMENT",
                "Youth Development and Sports Program",
                "Social Services",
                "Youth engagement through sports, leadership training, and community activities.",
            ),
            // ================================================================
            // INFRASTRUCTURE SERVICES
            // ================================================================
            ProgramTemplate::new(
                "WATER_SUPPLY_IMPROVEMENT",
                "Development of Water System",
                "Infrastructure Services",
                "Development, expansion, and maintenance of potable water supply systems.",
            ),
            ProgramTemplate::new(
                "STREETLIGHTS",
                "Installation and Maintenance of Streetlights",
                "Infrastructure Services",
                "Installation and maintenance of street lighting to improve safety and mobility.",
            ),
            ProgramTemplate::new(
                "LOCAL_ROADS",
                "Construction and Rehabilitation of Local Roads",
                "Infrastructure Services",
                "Construction, repair, and rehabilitation of barangay roads and pathways.",
            ),
            // ================================================================
            // ENVIRONMENTAL SERVICES
            // ================================================================
            ProgramTemplate::new(
                "SOLID_WASTE_MANAGEMENT",
                "Solid Waste Management Program",
                "Environmental Services",
                "Waste segregation, collection, and Materials Recovery Facility strengthening.",
            ),
            ProgramTemplate::new(
                "URBAN_GARDENING",
                "Urban Gardening Program",
                "Environmental Services",
                "Promotion of household and community gardens for food security.",
            ),
            ProgramTemplate::new(
                "TREE_PLANTING",
                "Tree Growing and Greening Program",
                "Environmental Services",
                "Tree planting and greening initiatives to improve environmental quality.",
            ),
            ProgramTemplate::new(
                "CLIMATE_ADAPTATION",
                "Climate Change Adaptation and Disaster Preparedness",
                "Environmental Services",
                "Community-based disaster risk reduction and climate adaptation planning.",
            ),
            // ================================================================
            // ECONOMIC SERVICES
            // ================================================================
            ProgramTemplate::new(
                "AGRICULTURE_PROGRAMS",
                "Agriculture Programs",
                "Economic Services",
                "Support programs for crop production, livestock, and urban agriculture.",
            ),
            ProgramTemplate::new(
                "LIVELIHOOD_TRAINING",
                "Livelihood Skills Training",
                "Economic Services",
                "Skills development programs to support household income generation.",
            ),
            ProgramTemplate::new(
                "MICRO_ENTERPRISE_SUPPORT",
                "Micro-Enterprise Development",
                "Economic Services",
                "Support for small-scale enterprises through training and mentoring.",
            ),
            // ================================================================
            // OTHER SERVICES
            // ================================================================
            ProgramTemplate::new(
                "SK_APPROPRIATION",
                "Appropriation for Sangguniang Kabataan",
                "Other Services",
                "Budgetary support for youth programs and SK-led initiatives.",
            ),
            ProgramTemplate::new(
                "BDRRM_APPROPRIATION",
                "Appropriation for Barangay Disaster Risk Reduction and Management",
                "Other Services",
                "Funding for disaster preparedness, response, and recovery activities.",
            ),
            ProgramTemplate::new(
                "GAD_BASIC_SERVICES",
                "Basic Services and Facilities and GAD Program",
                "Other Services",
                "Gender and development initiatives and provision of basic barangay services.",
            ),
            ProgramTemplate::new(
                "BCPC_PROGRAM",
                "Barangay Council for the Protection of Children Program",
                "Other Services",
                "Programs and services protecting the rights and welfare of children.",
            ),
        ];

        // The built-in list has unique ids; from_programs cannot fail on it.
        let index = programs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        ProgramCatalog { programs, index }
    }

    pub fn get(&self, id: &str) -> Option<&ProgramTemplate> {
        self.index.get(id).map(|&i| &self.programs[i])
    }

    /// Catalog position (tie-break rank) of a program id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn find_by_title(&self, title: &str) -> Option<&ProgramTemplate> {
        self.programs.iter().find(|p| p.title == title)
    }

    pub fn programs(&self) -> &[ProgramTemplate] {
        &self.programs
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.programs.iter().map(|p| p.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Default for ProgramCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ProgramCatalog::builtin();

        assert_eq!(catalog.len(), 26);
        assert_eq!(catalog.position("GENERAL_ADMINISTRATION"), Some(0));
        assert_eq!(catalog.position("BCPC_PROGRAM"), Some(25));

        let swm = catalog.get("SOLID_WASTE_MANAGEMENT").unwrap();
        assert_eq!(swm.title, "Solid Waste Management Program");
        assert_eq!(swm.category, "Environmental Services");

        let by_title = catalog.find_by_title("Urban Gardening Program").unwrap();
        assert_eq!(by_title.id, "URBAN_GARDENING");
    }

    #[test]
    fn test_builtin_ids_unique() {
        let programs = ProgramCatalog::builtin().programs().to_vec();
        assert!(ProgramCatalog::from_programs(programs).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(matches!(
            ProgramCatalog::from_programs(vec![]),
            Err(PlannerError::Configuration(_))
        ));

        let dup = vec![
            ProgramTemplate::new("A", "A", "X", ""),
            ProgramTemplate::new("A", "B", "X", ""),
        ];
        assert!(ProgramCatalog::from_programs(dup).is_err());
    }

    #[test]
    fn test_from_file_preserves_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "ZETA", "title": "Zeta", "category": "Other", "description": ""}},
                {{"id": "ALPHA", "title": "Alpha", "category": "Other", "description": ""}}
            ]"#
        )
        .unwrap();

        let catalog = ProgramCatalog::from_file(file.path()).unwrap();
        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["ZETA", "ALPHA"]);
    }

    #[test]
    fn test_from_file_missing_is_configuration_error() {
        let result = ProgramCatalog::from_file("/nonexistent/catalog.json");
        assert!(matches!(result, Err(PlannerError::Configuration(_))));
    }
}
