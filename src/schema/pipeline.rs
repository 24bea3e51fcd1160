//! Schema resolution pipeline
//!
//! Turns a raw dictionary into one self-contained schema per entity:
//!
//! ```text
//! raw dictionary
//!   ├─ links ──────────────► node pairs ──► node order
//!   ├─ _terms ─┐
//!   ├─ _definitions ──resolve──► resolved definitions
//!   └─ entity nodes ──────────resolve──► ResolvedSchemaMap
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::resolver::{contains_refs, resolve};
use super::{is_listed, strip_suffix, SchemaDocument, NODE_SUFFIX};
use crate::config::SchemaSettings;
use crate::error::{Result, ValidatorError};
use crate::fingerprint::SchemaFingerprint;
use crate::graph::{self, NodePair};
use crate::version::DictionaryVersion;

/// Entity id → fully inlined schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedSchemaMap(BTreeMap<String, Value>);

impl ResolvedSchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema for an entity id, with or without the `.yaml` suffix
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.0.get(strip_suffix(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(strip_suffix(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert a schema; keyed by its bare id
    pub fn insert(&mut self, id: &str, schema: Value) -> Option<Value> {
        self.0.insert(strip_suffix(id).to_string(), schema)
    }

    /// Re-key as `<id>.yaml`, the layout of a bundled resolved dictionary
    pub fn to_suffixed_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(id, schema)| (format!("{}{}", id, NODE_SUFFIX), schema.clone()))
            .collect()
    }

    /// Build from a list of schemas, keyed by each schema's `id`.
    ///
    /// Schemas without a string `id` are skipped.
    pub fn from_schemas(schemas: impl IntoIterator<Item = Value>) -> Self {
        let mut map = Self::new();
        for schema in schemas {
            let Some(id) = schema.get("id").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            map.insert(&id, schema);
        }
        map
    }
}

/// A node left out of the resolved map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    pub node: String,
    pub message: String,
}

/// Output of the resolution pipeline
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    /// Entity schemas with every reference inlined
    pub resolved: ResolvedSchemaMap,
    /// Relationship pairs extracted from the raw dictionary
    pub node_pairs: Vec<NodePair>,
    /// Entities in dependency order
    pub node_order: Vec<String>,
    /// Dictionary version from the settings node
    pub version: DictionaryVersion,
    /// Nodes skipped during resolution
    pub warnings: Vec<ResolutionWarning>,
    /// Fingerprint of `resolved`
    pub fingerprint: SchemaFingerprint,
}

impl ResolvedSchema {
    /// Run the full pipeline over a raw dictionary
    pub fn from_document(document: &SchemaDocument, settings: &SchemaSettings) -> Result<Self> {
        let node_pairs = graph::build_edges(document, &settings.excluded_nodes);
        let node_order = graph::order(&node_pairs, settings.aggregation_node.as_deref())?;
        debug!(nodes = node_order.len(), "computed node order");

        let definitions = document
            .find_node(&settings.definitions_node)
            .ok_or_else(|| ValidatorError::MissingFragment(settings.definitions_node.clone()))?;
        let terms = document
            .find_node(&settings.terms_node)
            .ok_or_else(|| ValidatorError::MissingFragment(settings.terms_node.clone()))?;

        let definitions = resolve(definitions, terms)?;
        if contains_refs(&definitions) {
            return Err(ValidatorError::InvalidDocument(format!(
                "unresolved references remain in '{}'",
                settings.definitions_node
            )));
        }

        info!("resolving schema references");
        let fragments = settings.fragment_nodes().map(str::to_string);
        let mut resolved = ResolvedSchemaMap::new();
        let mut warnings = Vec::new();

        for (name, node) in document.iter() {
            if is_listed(name, &fragments) {
                continue;
            }

            let outcome = match resolve(node, &definitions) {
                Err(e) if !e.is_structural_reference() => return Err(e),
                other => other.and_then(|schema| {
                    let id = schema
                        .get("id")
                        .and_then(Value::as_str)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ValidatorError::InvalidDocument("node has no id".to_string())
                        })?;
                    Ok((id, schema))
                }),
            };

            match outcome {
                Ok((id, schema)) => {
                    if resolved.contains(&id) {
                        warn!(node = name, id = %id, "duplicate node id, keeping the first");
                        warnings.push(ResolutionWarning {
                            node: name.to_string(),
                            message: format!("duplicate id '{}'", id),
                        });
                        continue;
                    }
                    debug!(node = name, "resolved");
                    resolved.insert(&id, schema);
                }
                Err(e) => {
                    warn!(node = name, error = %e, "skipping node");
                    warnings.push(ResolutionWarning {
                        node: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let version = DictionaryVersion::parse(
            &document.schema_version(&settings.settings_node, &settings.version_field)?,
        );
        let fingerprint = SchemaFingerprint::of_entries(resolved.iter());
        info!(
            schemas = resolved.len(),
            skipped = warnings.len(),
            version = %version,
            fingerprint = fingerprint.short(),
            "schema resolved"
        );

        Ok(Self {
            resolved,
            node_pairs,
            node_order,
            version,
            warnings,
            fingerprint,
        })
    }

    /// Parse and resolve a dictionary given as JSON
    pub fn from_value(value: Value, settings: &SchemaSettings) -> Result<Self> {
        Self::from_document(&SchemaDocument::from_value(value)?, settings)
    }

    /// Resolved schema for an entity, with or without the `.yaml` suffix
    pub fn resolved_node(&self, id: &str) -> Option<&Value> {
        self.resolved.get(id)
    }
}
