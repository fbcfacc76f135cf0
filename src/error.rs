// 🚨 Error Taxonomy - one error type for every pipeline
// Startup errors, request errors, and row-level data errors

use thiserror::Error;

/// Error type shared by the ranking and budgeting pipelines.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Catalog, vocabulary or model artifact missing or unreadable.
    /// Fatal at startup: the process must not serve requests.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Nothing to work from (no total budget record, no stored recommendations).
    /// The request is rejected; the caller decides whether to retry.
    #[error("no data: {0}")]
    NoData(String),

    /// A ledger row field could not be coerced (e.g. a non-numeric year).
    /// Row-level: callers skip the row and keep scanning.
    #[error("collection '{collection}': cannot coerce {field} value '{value}'")]
    DataCoercion {
        collection: String,
        field: String,
        value: String,
    },

    /// An external scoring collaborator could not produce output.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PlannerError {
    /// True for request-fatal errors the caller can fix (reported as a rejected request):
    /// missing data, an uncoercible input value, or a malformed CSV upload.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PlannerError::NoData(_) | PlannerError::DataCoercion { .. } | PlannerError::Csv(_)
        )
    }

    pub fn is_row_level(&self) -> bool {
        matches!(self, PlannerError::DataCoercion { .. })
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let no_data = PlannerError::NoData("no total budget".to_string());
        assert!(no_data.is_client_error());
        assert!(!no_data.is_row_level());

        let coercion = PlannerError::DataCoercion {
            collection: "api".to_string(),
            field: "Year".to_string(),
            value: "FY2020".to_string(),
        };
        assert!(coercion.is_row_level());
        assert!(coercion.is_client_error());
        assert_eq!(
            coercion.to_string(),
            "collection 'api': cannot coerce Year value 'FY2020'"
        );

        let config = PlannerError::Configuration("missing scorer".to_string());
        assert!(!config.is_client_error());
        assert!(!PlannerError::LockPoisoned.is_client_error());
    }
}
