//! Error types for schema resolution, linkage and validation

use thiserror::Error;

/// Result type for validator operations
pub type Result<T> = std::result::Result<T, ValidatorError>;

/// Validator errors
///
/// Only problems with the schema or the caller's configuration are raised.
/// Problems with data content (broken links, schema violations) are reported
/// as values by the linkage and validation modules.
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Missing reference {pointer}: segment '{segment}' not found")]
    MissingReference { pointer: String, segment: String },

    #[error("Cyclic reference {pointer} (chain: {})", .chain.join(" -> "))]
    CyclicReference { pointer: String, chain: Vec<String> },

    #[error("Invalid reference pointer: {0}")]
    InvalidPointer(String),

    #[error("Dependency cycle between nodes: {}", .0.join(", "))]
    NodeCycle(Vec<String>),

    #[error("Fragment node not found: {0}")]
    MissingFragment(String),

    #[error("Could not pull schema version: {0}")]
    SchemaVersion(String),

    #[error("Invalid linkage config: {0}")]
    ConfigShape(String),

    #[error("Entity '{0}' is not present in the data map")]
    UnknownEntity(String),

    #[error("Invalid schema for '{entity}': {message}")]
    InvalidSchema { entity: String, message: String },

    #[error("Record {index} could not be validated: {message}")]
    InvalidRecord { index: usize, message: String },

    #[error("Invalid schema document: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ValidatorError {
    /// True for pointer problems found while inlining a single node.
    ///
    /// The resolution pipeline skips the offending node on these instead of
    /// aborting.
    pub fn is_structural_reference(&self) -> bool {
        matches!(
            self,
            ValidatorError::MissingReference { .. }
                | ValidatorError::CyclicReference { .. }
                | ValidatorError::InvalidPointer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_reference_family() {
        let missing = ValidatorError::MissingReference {
            pointer: "_terms.yaml#/foo".to_string(),
            segment: "foo".to_string(),
        };
        assert!(missing.is_structural_reference());
        assert!(ValidatorError::InvalidPointer("x".to_string()).is_structural_reference());
        assert!(!ValidatorError::SchemaVersion("x".to_string()).is_structural_reference());
    }

    #[test]
    fn test_cycle_message_lists_chain() {
        let err = ValidatorError::CyclicReference {
            pointer: "#/a".to_string(),
            chain: vec!["#/a".to_string(), "#/b".to_string(), "#/a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic reference #/a (chain: #/a -> #/b -> #/a)"
        );
    }
}
