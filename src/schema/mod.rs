//! Gen3 dictionary documents
//!
//! A dictionary is a single JSON object mapping node names (`sample.yaml`,
//! `_definitions.yaml`, ...) to node definitions. Entity nodes carry an `id`,
//! `links`, `properties`, `required` and `category`; the underscore nodes hold
//! shared fragments and dictionary settings.

pub mod pipeline;
pub mod resolver;

pub use pipeline::{ResolutionWarning, ResolvedSchema, ResolvedSchemaMap};
pub use resolver::{contains_refs, resolve, ReferenceResolver, REF_KEY};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Result, ValidatorError};

/// Suffix carried by every node name in a bundled dictionary
pub const NODE_SUFFIX: &str = ".yaml";

/// Strip the `.yaml` node suffix if present
pub fn strip_suffix(name: &str) -> &str {
    name.strip_suffix(NODE_SUFFIX).unwrap_or(name)
}

/// One directed relationship from the declaring node to `target_type`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl LinkDescriptor {
    /// Read a descriptor leniently; unknown shapes yield an empty descriptor
    /// so the graph builder can surface them as placeholders.
    fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: text("name"),
            backref: text("backref"),
            label: text("label"),
            target_type: text("target_type"),
            multiplicity: text("multiplicity"),
            required: value.get("required").and_then(Value::as_bool),
        }
    }
}

/// Flatten a `links` value into plain descriptors.
///
/// Accepts a list of descriptors, a single descriptor object, and grouped
/// descriptors whose `subgroup` holds the alternatives.
pub fn normalize_links(links: &Value) -> Vec<LinkDescriptor> {
    fn push(entry: &Value, out: &mut Vec<LinkDescriptor>) {
        match entry.get("subgroup") {
            Some(Value::Array(group)) => group.iter().for_each(|g| push(g, out)),
            Some(single @ Value::Object(_)) => push(single, out),
            _ => out.push(LinkDescriptor::from_value(entry)),
        }
    }

    let mut out = Vec::new();
    match links {
        Value::Array(entries) => entries.iter().for_each(|e| push(e, &mut out)),
        Value::Object(_) => push(links, &mut out),
        _ => {}
    }
    out
}

/// Category and property names of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: Option<String>,
    pub category: Option<String>,
    pub properties: Vec<String>,
}

/// A raw (unresolved) dictionary
#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    nodes: Map<String, Value>,
}

impl SchemaDocument {
    /// Wrap a parsed dictionary; the top level must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(nodes) => Ok(Self { nodes }),
            other => Err(ValidatorError::InvalidDocument(format!(
                "expected an object of nodes, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Node names in authored order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// All `(name, definition)` pairs in authored order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node definition by exact name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.nodes.get(name)
    }

    /// Find a node by name or id, with or without the `.yaml` suffix.
    ///
    /// Exact node names win over `id` matches.
    pub fn find_node(&self, target: &str) -> Option<&Value> {
        let bare = strip_suffix(target);
        self.nodes
            .iter()
            .find(|(name, _)| strip_suffix(name) == bare)
            .or_else(|| {
                self.nodes
                    .iter()
                    .find(|(_, node)| node.get("id").and_then(Value::as_str) == Some(bare))
            })
            .map(|(_, node)| node)
    }

    /// The `id` declared by a node
    pub fn node_id(&self, name: &str) -> Option<&str> {
        self.nodes.get(name)?.get("id")?.as_str()
    }

    /// Normalized link list of a node (empty when `links` is absent)
    pub fn node_links(&self, name: &str) -> Vec<LinkDescriptor> {
        self.nodes
            .get(name)
            .and_then(|node| node.get("links"))
            .map(normalize_links)
            .unwrap_or_default()
    }

    /// `(id, category)` of a node
    pub fn node_category(&self, name: &str) -> (Option<&str>, Option<&str>) {
        let node = self.nodes.get(name);
        let field = |key: &str| node.and_then(|n| n.get(key)).and_then(Value::as_str);
        (field("id"), field("category"))
    }

    /// `(id, property names)` of a node
    pub fn node_properties(&self, name: &str) -> (Option<&str>, Vec<String>) {
        let node = self.nodes.get(name);
        let id = node.and_then(|n| n.get("id")).and_then(Value::as_str);
        let properties = node
            .and_then(|n| n.get("properties"))
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();
        (id, properties)
    }

    /// Category and property summary for every node not in `excluded`
    pub fn node_lookup(&self, excluded: &[String]) -> BTreeMap<String, NodeSummary> {
        self.nodes
            .iter()
            .filter(|(name, node)| !is_listed(name, excluded) && node.is_object())
            .map(|(name, _)| {
                let (id, category) = self.node_category(name);
                let (_, properties) = self.node_properties(name);
                (
                    name.clone(),
                    NodeSummary {
                        id: id.map(str::to_string),
                        category: category.map(str::to_string),
                        properties,
                    },
                )
            })
            .collect()
    }

    /// Dictionary version string stored in the settings node
    pub fn schema_version(&self, settings_node: &str, version_field: &str) -> Result<String> {
        let settings = self.find_node(settings_node).ok_or_else(|| {
            ValidatorError::SchemaVersion(format!("settings node '{}' not found", settings_node))
        })?;
        settings
            .get(version_field)
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                ValidatorError::SchemaVersion(format!(
                    "'{}' missing from '{}'",
                    version_field, settings_node
                ))
            })
    }
}

/// True when `name` appears in `list`, ignoring the `.yaml` suffix
pub(crate) fn is_listed(name: &str, list: &[String]) -> bool {
    let bare = strip_suffix(name);
    list.iter().any(|entry| strip_suffix(entry) == bare)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_link() -> Value {
        json!({
            "backref": "samples",
            "label": "taken_from",
            "multiplicity": "many_to_one",
            "name": "subjects",
            "required": true,
            "target_type": "subject"
        })
    }

    #[test]
    fn test_flat_links() {
        let links = normalize_links(&json!([sample_link()]));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_type.as_deref(), Some("subject"));
        assert_eq!(links[0].name.as_deref(), Some("subjects"));
        assert_eq!(links[0].required, Some(true));
    }

    #[test]
    fn test_subgroup_links_are_flattened() {
        let links = normalize_links(&json!([{
            "exclusive": false,
            "required": true,
            "subgroup": [
                {"name": "samples", "target_type": "sample"},
                {"name": "aliquots", "target_type": "aliquot"}
            ]
        }]));
        let targets: Vec<_> = links.iter().filter_map(|l| l.target_type.as_deref()).collect();
        assert_eq!(targets, vec!["sample", "aliquot"]);
    }

    #[test]
    fn test_single_link_object() {
        let links = normalize_links(&sample_link());
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_find_node_by_name_or_id() {
        let doc = SchemaDocument::from_value(json!({
            "subject.yaml": {"id": "subject", "type": "object"},
            "sample.yaml": {"id": "sample", "type": "object"},
            "odd_name": {"id": "project", "type": "object"}
        }))
        .unwrap();

        assert_eq!(doc.find_node("sample").unwrap()["id"], "sample");
        assert_eq!(doc.find_node("subject.yaml").unwrap()["id"], "subject");
        assert_eq!(doc.find_node("project.yaml").unwrap()["id"], "project");
        assert!(doc.find_node("not_a_node").is_none());
        assert!(doc.find_node("not_a_node.yaml").is_none());
    }

    #[test]
    fn test_node_category_and_properties() {
        let doc = SchemaDocument::from_value(json!({
            "demographic.yaml": {
                "id": "demographic",
                "category": "clinical",
                "properties": {
                    "sex": {"description": "Sex of the participant", "enum": ["male", "female", "other"]}
                }
            },
            "_definitions.yaml": null
        }))
        .unwrap();

        assert_eq!(
            doc.node_category("demographic.yaml"),
            (Some("demographic"), Some("clinical"))
        );
        assert_eq!(
            doc.node_properties("demographic.yaml"),
            (Some("demographic"), vec!["sex".to_string()])
        );

        let lookup = doc.node_lookup(&["_definitions.yaml".to_string()]);
        assert_eq!(lookup.len(), 1);
        let summary = &lookup["demographic.yaml"];
        assert_eq!(summary.category.as_deref(), Some("clinical"));
        assert_eq!(summary.properties, vec!["sex"]);
    }

    #[test]
    fn test_schema_version() {
        let doc = SchemaDocument::from_value(json!({
            "_settings.yaml": {"_dict_version": "3.0.1"},
            "sample.yaml": {"id": "sample"}
        }))
        .unwrap();
        assert_eq!(doc.schema_version("_settings.yaml", "_dict_version").unwrap(), "3.0.1");

        let missing_settings = SchemaDocument::from_value(json!({"sample.yaml": {"id": "sample"}})).unwrap();
        let err = missing_settings
            .schema_version("_settings.yaml", "_dict_version")
            .unwrap_err();
        assert!(err.to_string().contains("Could not pull schema version"));

        let missing_field = SchemaDocument::from_value(json!({"_settings.yaml": {}})).unwrap();
        assert!(matches!(
            missing_field.schema_version("_settings.yaml", "_dict_version"),
            Err(ValidatorError::SchemaVersion(_))
        ));
    }

    #[test]
    fn test_document_must_be_object() {
        assert!(SchemaDocument::from_value(json!([1, 2])).is_err());
    }
}
