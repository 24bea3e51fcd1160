//! Structural Validation
//!
//! Validates each record of each entity against the entity's resolved schema
//! (JSON Schema Draft 4) and records one outcome list per record:
//!
//! ```text
//! {
//!   "sample": [
//!     {"index_0": [{"index": 0, "validation_result": "PASS", "invalid_key": null, ...}]},
//!     {"index_1": [{"index": 1, "validation_result": "FAIL", "invalid_key": "freeze_thaw_cycles", ...}]}
//!   ]
//! }
//! ```

pub mod report;

pub use report::{CollapsedRow, EntitySummary, FlatRow, ResultFilter};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use jsonschema::{Draft, JSONSchema};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ValidatorError};
use crate::schema::{json_kind, ResolvedSchemaMap};
use crate::DataMap;

/// Prefix of record labels in the result tree
pub const INDEX_PREFIX: &str = "index_";

/// What to do with the first error collected for a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadingErrorPolicy {
    /// Report every error
    #[default]
    KeepAll,
    /// Drop exactly the first error before reporting
    SkipFirst,
}

impl LeadingErrorPolicy {
    pub fn apply<T>(self, mut errors: Vec<T>) -> Vec<T> {
        match self {
            LeadingErrorPolicy::KeepAll => errors,
            LeadingErrorPolicy::SkipFirst => {
                if !errors.is_empty() {
                    errors.remove(0);
                }
                errors
            }
        }
    }
}

/// PASS / FAIL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

/// One schema violation
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Dot-joined instance path, or `root`
    pub invalid_key: String,
    /// Dot-joined schema path
    pub schema_path: String,
    /// Keyword that failed (`type`, `required`, `enum`, ...)
    pub validator: String,
    /// Schema value of that keyword
    pub validator_value: Value,
    /// Human readable message
    pub validation_error: String,
}

/// Outcome of validating one record
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Pass,
    Fail(Violation),
}

impl ValidationOutcome {
    pub fn status(&self) -> ValidationStatus {
        match self {
            ValidationOutcome::Pass => ValidationStatus::Pass,
            ValidationOutcome::Fail(_) => ValidationStatus::Fail,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationOutcome::Pass)
    }

    pub fn is_fail(&self) -> bool {
        !self.is_pass()
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            ValidationOutcome::Pass => None,
            ValidationOutcome::Fail(v) => Some(v),
        }
    }

    pub fn invalid_key(&self) -> Option<&str> {
        self.violation().map(|v| v.invalid_key.as_str())
    }

    pub fn validator(&self) -> Option<&str> {
        self.violation().map(|v| v.validator.as_str())
    }

    pub fn validation_error(&self) -> Option<&str> {
        self.violation().map(|v| v.validation_error.as_str())
    }
}

#[derive(Serialize)]
struct OutcomeFields<'a> {
    validation_result: ValidationStatus,
    invalid_key: Option<&'a str>,
    schema_path: Option<&'a str>,
    validator: Option<&'a str>,
    validator_value: Option<&'a Value>,
    validation_error: Option<&'a str>,
}

impl Serialize for ValidationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let v = self.violation();
        OutcomeFields {
            validation_result: self.status(),
            invalid_key: v.map(|v| v.invalid_key.as_str()),
            schema_path: v.map(|v| v.schema_path.as_str()),
            validator: v.map(|v| v.validator.as_str()),
            validator_value: v.map(|v| &v.validator_value),
            validation_error: v.map(|v| v.validation_error.as_str()),
        }
        .serialize(serializer)
    }
}

/// Outcomes of one record, labelled `index_<i>`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordResult {
    pub label: String,
    pub outcomes: Vec<ValidationOutcome>,
}

impl RecordResult {
    pub fn new(index: usize, outcomes: Vec<ValidationOutcome>) -> Self {
        Self {
            label: format!("{}{}", INDEX_PREFIX, index),
            outcomes,
        }
    }

    /// Record position parsed back out of the label
    pub fn index(&self) -> Option<usize> {
        self.label.strip_prefix(INDEX_PREFIX)?.parse().ok()
    }

    /// Status of the first outcome; `None` for records that could not be validated
    pub fn status(&self) -> Option<ValidationStatus> {
        self.outcomes.first().map(ValidationOutcome::status)
    }
}

#[derive(Serialize)]
struct IndexedOutcome<'a> {
    index: Option<usize>,
    #[serde(flatten)]
    outcome: &'a ValidationOutcome,
}

impl Serialize for RecordResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let index = self.index();
        let outcomes: Vec<IndexedOutcome<'_>> = self
            .outcomes
            .iter()
            .map(|outcome| IndexedOutcome { index, outcome })
            .collect();
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, &outcomes)?;
        map.end()
    }
}

/// Entity → record results in record order.
///
/// Built once per run; every reporting view reads it without mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationResultTree {
    entities: BTreeMap<String, Vec<RecordResult>>,
}

impl ValidationResultTree {
    pub fn from_entities(entities: BTreeMap<String, Vec<RecordResult>>) -> Self {
        Self { entities }
    }

    /// Record results of one entity
    pub fn records(&self, entity: &str) -> Option<&[RecordResult]> {
        self.entities.get(entity).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<RecordResult>)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Draft 4 validator over a data map
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator {
    policy: LeadingErrorPolicy,
}

impl StructuralValidator {
    pub fn new(policy: LeadingErrorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LeadingErrorPolicy {
        self.policy
    }

    /// Validate every entity present in both `data` and `resolved`
    pub fn validate(&self, data: &DataMap, resolved: &ResolvedSchemaMap) -> ValidationResultTree {
        info!(
            data_nodes = ?data.keys().collect::<Vec<_>>(),
            schema_nodes = resolved.len(),
            "validating data against schema"
        );

        let mut entities = BTreeMap::new();
        for (entity, records) in data {
            let Some(schema) = resolved.get(entity) else {
                match closest_schema(entity, resolved) {
                    Some(suggestion) => warn!(
                        entity = %entity,
                        suggestion = %suggestion,
                        "entity not found in resolved schema, did you mean '{}'?",
                        suggestion
                    ),
                    None => warn!(entity = %entity, "entity not found in resolved schema"),
                }
                continue;
            };

            let compiled = match compile(entity, schema) {
                Ok(compiled) => compiled,
                Err(e) => {
                    error!(entity = %entity, error = %e, "could not build validator");
                    continue;
                }
            };
            info!(entity = %entity, records = records.len(), "validator set up");

            let results = records
                .iter()
                .enumerate()
                .map(|(index, record)| {
                    let outcomes = self
                        .validate_record(&compiled, schema, index, record)
                        .unwrap_or_else(|e| {
                            error!(entity = %entity, index, error = %e, "record skipped");
                            Vec::new()
                        });
                    RecordResult::new(index, outcomes)
                })
                .collect();
            entities.insert(entity.clone(), results);
        }

        ValidationResultTree::from_entities(entities)
    }

    /// Validate one record; non-object records are rejected
    pub fn validate_record(
        &self,
        compiled: &JSONSchema,
        schema: &Value,
        index: usize,
        record: &Value,
    ) -> Result<Vec<ValidationOutcome>> {
        if !record.is_object() {
            return Err(ValidatorError::InvalidRecord {
                index,
                message: format!("expected an object, found {}", json_kind(record)),
            });
        }

        let violations: Vec<Violation> = match compiled.validate(record) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let instance_path = e.instance_path.clone().into_vec();
                    let schema_path = e.schema_path.clone().into_vec();
                    Violation {
                        invalid_key: if instance_path.is_empty() {
                            "root".to_string()
                        } else {
                            instance_path.join(".")
                        },
                        validator: keyword(&schema_path),
                        validator_value: schema_value(schema, &schema_path),
                        schema_path: schema_path.join("."),
                        validation_error: e.to_string(),
                    }
                })
                .collect(),
        };
        debug!(index, errors = violations.len(), "record validated");

        let violations = self.policy.apply(violations);
        if violations.is_empty() {
            Ok(vec![ValidationOutcome::Pass])
        } else {
            Ok(violations.into_iter().map(ValidationOutcome::Fail).collect())
        }
    }
}

/// Compile one entity schema as Draft 4.
///
/// Gen3 uses the top-level `id` as the entity name, not a base URI, so a
/// non-URI `id` is dropped before compiling.
pub fn compile(entity: &str, schema: &Value) -> Result<JSONSchema> {
    let mut schema = schema.clone();
    if let Some(node) = schema.as_object_mut() {
        let bare_id = node
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.contains(':'));
        if bare_id {
            node.remove("id");
        }
    }

    JSONSchema::options()
        .with_draft(Draft::Draft4)
        .compile(&schema)
        .map_err(|e| ValidatorError::InvalidSchema {
            entity: entity.to_string(),
            message: e.to_string(),
        })
}

/// Keywords whose next schema path segment is a user-chosen name
const NAMED_SUBSCHEMAS: &[&str] = &["properties", "patternProperties", "dependencies", "definitions"];

/// Keyword that produced an error.
///
/// Walks the schema path from the root: array indices are skipped, and the
/// segment after a name-mapping keyword is a property name, not a keyword.
fn keyword(schema_path: &[String]) -> String {
    let mut found = None;
    let mut segments = schema_path.iter();
    while let Some(segment) = segments.next() {
        if segment.parse::<usize>().is_ok() {
            continue;
        }
        found = Some(segment);
        if NAMED_SUBSCHEMAS.contains(&segment.as_str()) {
            segments.next();
        }
    }
    found.cloned().unwrap_or_default()
}

/// Value found by walking `path` through `schema`; null when the walk fails
fn schema_value(schema: &Value, path: &[String]) -> Value {
    path.iter()
        .try_fold(schema, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Schema id most similar to `entity`
fn closest_schema<'a>(entity: &str, resolved: &'a ResolvedSchemaMap) -> Option<&'a str> {
    let matcher = SkimMatcherV2::default();
    let mut best: Option<(i64, &str)> = None;
    for id in resolved.ids() {
        let score = matcher
            .fuzzy_match(id, entity)
            .or_else(|| matcher.fuzzy_match(entity, id));
        if let Some(score) = score {
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, id.as_str()));
            }
        }
    }
    best.map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-04/schema#",
            "id": "sample",
            "type": "object",
            "required": ["submitter_id"],
            "properties": {
                "submitter_id": {"type": "string"},
                "freeze_thaw_cycles": {"type": "integer"},
                "sample_type": {"enum": ["blood", "tissue"]}
            }
        })
    }

    fn resolved() -> ResolvedSchemaMap {
        ResolvedSchemaMap::from_schemas(vec![sample_schema()])
    }

    fn data(records: Value) -> DataMap {
        serde_json::from_value(json!({ "sample": records })).unwrap()
    }

    #[test]
    fn test_type_error_yields_one_fail() {
        let tree = StructuralValidator::default().validate(
            &data(json!([{"submitter_id": "s1", "freeze_thaw_cycles": "10"}])),
            &resolved(),
        );
        let records = tree.records("sample").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "index_0");

        let outcomes = &records[0].outcomes;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status(), ValidationStatus::Fail);
        assert_eq!(outcomes[0].invalid_key(), Some("freeze_thaw_cycles"));
        assert_eq!(outcomes[0].validator(), Some("type"));

        let violation = outcomes[0].violation().unwrap();
        assert_eq!(violation.schema_path, "properties.freeze_thaw_cycles.type");
        assert_eq!(violation.validator_value, json!("integer"));
        assert!(violation.validation_error.contains("integer"));
    }

    #[test]
    fn test_conforming_record_yields_one_pass() {
        let tree = StructuralValidator::default().validate(
            &data(json!([{"submitter_id": "s1", "freeze_thaw_cycles": 10}])),
            &resolved(),
        );
        let outcomes = &tree.records("sample").unwrap()[0].outcomes;
        assert_eq!(outcomes, &vec![ValidationOutcome::Pass]);
        assert_eq!(
            serde_json::to_value(&outcomes[0]).unwrap(),
            json!({
                "validation_result": "PASS",
                "invalid_key": null,
                "schema_path": null,
                "validator": null,
                "validator_value": null,
                "validation_error": null
            })
        );
    }

    #[test]
    fn test_missing_required_is_reported_at_root() {
        let tree = StructuralValidator::default()
            .validate(&data(json!([{"freeze_thaw_cycles": 1}])), &resolved());
        let outcome = &tree.records("sample").unwrap()[0].outcomes[0];
        assert_eq!(outcome.invalid_key(), Some("root"));
        assert_eq!(outcome.validator(), Some("required"));
        assert_eq!(outcome.violation().unwrap().validator_value, json!(["submitter_id"]));
    }

    #[test]
    fn test_skip_first_policy() {
        let records = data(json!([
            {"submitter_id": "s1", "freeze_thaw_cycles": "10", "sample_type": "saliva"},
            {"submitter_id": "s2", "freeze_thaw_cycles": "10"}
        ]));

        let keep = StructuralValidator::new(LeadingErrorPolicy::KeepAll).validate(&records, &resolved());
        let skip = StructuralValidator::new(LeadingErrorPolicy::SkipFirst).validate(&records, &resolved());

        let keep = keep.records("sample").unwrap();
        let skip = skip.records("sample").unwrap();
        assert_eq!(keep[0].outcomes.len(), 2);
        assert_eq!(skip[0].outcomes.len(), 1);
        assert!(skip[0].outcomes[0].is_fail());

        // a single error is discarded entirely, leaving a PASS
        assert_eq!(keep[1].outcomes.len(), 1);
        assert_eq!(skip[1].outcomes, vec![ValidationOutcome::Pass]);
    }

    #[test]
    fn test_policy_apply() {
        assert_eq!(LeadingErrorPolicy::SkipFirst.apply(vec![1, 2, 3]), vec![2, 3]);
        assert_eq!(LeadingErrorPolicy::SkipFirst.apply(Vec::<i32>::new()), Vec::<i32>::new());
        assert_eq!(LeadingErrorPolicy::KeepAll.apply(vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_non_object_record_contributes_no_outcomes() {
        let tree = StructuralValidator::default().validate(
            &data(json!(["not a record", {"submitter_id": "s1"}])),
            &resolved(),
        );
        let records = tree.records("sample").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].outcomes.is_empty());
        assert_eq!(records[0].status(), None);
        assert_eq!(records[1].status(), Some(ValidationStatus::Pass));
    }

    #[test]
    fn test_unknown_entity_is_skipped() {
        let map: DataMap = serde_json::from_value(json!({
            "samples": [{"submitter_id": "s1"}],
            "sample": []
        }))
        .unwrap();
        let tree = StructuralValidator::default().validate(&map, &resolved());
        assert!(tree.records("samples").is_none());
        assert_eq!(tree.records("sample").map(<[RecordResult]>::len), Some(0));
        assert_eq!(closest_schema("samples", &resolved()), Some("sample"));
        assert_eq!(closest_schema("zzz", &resolved()), None);
    }

    #[test]
    fn test_record_labels_and_serialization() {
        let result = RecordResult::new(12, vec![ValidationOutcome::Pass]);
        assert_eq!(result.index(), Some(12));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["index_12"][0]["validation_result"], "PASS");
        assert_eq!(value["index_12"][0]["index"], 12);
        assert!(value["index_12"][0]["invalid_key"].is_null());
    }

    #[test]
    fn test_keyword_from_schema_path() {
        let path = |segments: &[&str]| -> Vec<String> {
            segments.iter().map(|s| s.to_string()).collect()
        };
        assert_eq!(keyword(&path(&["properties", "age", "type"])), "type");
        assert_eq!(keyword(&path(&["required"])), "required");
        assert_eq!(keyword(&path(&["properties", "a", "anyOf", "1", "type"])), "type");
        assert_eq!(keyword(&path(&["properties", "properties", "enum"])), "enum");
        assert_eq!(keyword(&path(&["dependencies", "bar"])), "dependencies");
        assert_eq!(keyword(&path(&["items", "0"])), "items");
        assert_eq!(keyword(&[]), "");
    }

    #[test]
    fn test_keyword_when_property_is_named_like_a_keyword() {
        let schema = json!({
            "type": "object",
            "properties": {"required": {"type": "integer"}}
        });
        let compiled = compile("thing", &schema).unwrap();
        let outcomes = StructuralValidator::default()
            .validate_record(&compiled, &schema, 0, &json!({"required": "yes"}))
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].invalid_key(), Some("required"));
        assert_eq!(outcomes[0].validator(), Some("type"));
        assert_eq!(outcomes[0].violation().unwrap().validator_value, json!("integer"));
    }

    #[test]
    fn test_schema_value_lookup() {
        let schema = json!({"properties": {"a": {"anyOf": [{"type": "string"}, {"type": "null"}]}}});
        let path: Vec<String> = ["properties", "a", "anyOf", "1", "type"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(schema_value(&schema, &path), json!("null"));
        assert_eq!(schema_value(&schema, &["nope".to_string()]), Value::Null);
    }
}
