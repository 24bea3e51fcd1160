//! Gen3 Data Validator
//!
//! Resolves a Gen3 data dictionary into self-contained JSON Schemas and checks
//! metadata submissions against it.
//!
//! ## Features
//!
//! - **Reference Resolution**: `$ref` pointers into `_definitions` / `_terms`
//!   are inlined, with sibling keys merged over the target
//! - **Node Ordering**: entities are ordered so parents come before children
//! - **Linkage Checks**: primary/foreign key fields are inferred and every
//!   foreign key value is checked against the submitted identifiers
//! - **Structural Validation**: each record is validated against its entity
//!   schema (JSON Schema Draft 4)
//! - **Reports**: per-entity counts, flattened rows and collapsed error summaries
//!
//! ## Pipeline
//!
//! ```text
//! dictionary.json ──► ResolvedSchema ──┬──► node order
//!                                      └──► ResolvedSchemaMap ──┐
//! data/*.json ──► DataMap ──┬──► Linkage ──► LinkReport          │
//!                           └──► StructuralValidator ◄──────────┘
//!                                       │
//!                                       ▼
//!                               ValidationResultTree ──► summary / flat / collapsed
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod linkage;
pub mod loader;
pub mod schema;
pub mod tabular;
pub mod validate;
pub mod version;

use std::collections::BTreeMap;

/// Entity name → records of that entity
pub type DataMap = BTreeMap<String, Vec<serde_json::Value>>;

pub use config::ValidatorConfig;
pub use error::{Result, ValidatorError};
pub use fingerprint::SchemaFingerprint;
pub use graph::{build_edges, order, NodeGraph, NodePair};
pub use linkage::{
    check_links, infer_config, validate_config, ConfigVerdict, Linkage, LinkageConfig, LinkReport,
};
pub use schema::{resolve, ResolvedSchema, ResolvedSchemaMap, SchemaDocument};
pub use tabular::{Sheet, TabularConverter};
pub use validate::{
    LeadingErrorPolicy, ResultFilter, StructuralValidator, ValidationOutcome, ValidationResultTree,
};
pub use version::DictionaryVersion;
