//! Entity Linkage
//!
//! Infers which record field identifies a record (primary key) and which field
//! points at its parent (foreign key), checks that every foreign key names some
//! other entity's primary key, and then checks the key values themselves.
//!
//! ## Conventions
//!
//! - The primary key field of `sample` is `samples` (entity + link suffix).
//! - A foreign key field holds a relationship object carrying the identifier
//!   field: `"subjects": {"submitter_id": "subject_1"}`.
//! - Root entities (`subject` by default) may reference entities outside the
//!   submission, so their unmatched foreign keys are tolerated.

pub mod integrity;

pub use integrity::{
    check_links, check_links_in, extract_values, GlobalIdentifierSpace, IdentifierSpace, KeyKind,
    LinkReport,
};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::LinkageSettings;
use crate::error::{Result, ValidatorError};
use crate::schema::json_kind;
use crate::DataMap;

/// Field name of the first value in `record` that is a relationship object,
/// i.e. a mapping containing `id_field`. Fields are visited in authored order.
pub fn find_foreign_key<'a>(record: &'a Value, id_field: &str) -> Option<&'a str> {
    record
        .as_object()?
        .iter()
        .find(|(_, value)| value.as_object().is_some_and(|obj| obj.contains_key(id_field)))
        .map(|(key, _)| key.as_str())
}

/// Picks the foreign key field of one entity from its records
pub trait ForeignKeyStrategy {
    /// Foreign key field name, or `None` when the records carry no relationship
    fn foreign_key(&self, records: &[Value]) -> Option<String>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Looks at the first record only
#[derive(Debug, Clone)]
pub struct FirstRecord {
    pub id_field: String,
}

impl ForeignKeyStrategy for FirstRecord {
    fn foreign_key(&self, records: &[Value]) -> Option<String> {
        records
            .first()
            .and_then(|record| find_foreign_key(record, &self.id_field))
            .map(str::to_string)
    }

    fn name(&self) -> &'static str {
        "first_record"
    }
}

/// Looks at every record and takes the most common relationship field.
///
/// Ties go to the field seen first.
#[derive(Debug, Clone)]
pub struct MajorityVote {
    pub id_field: String,
}

impl ForeignKeyStrategy for MajorityVote {
    fn foreign_key(&self, records: &[Value]) -> Option<String> {
        let mut tally: Vec<(&str, usize)> = Vec::new();
        for key in records
            .iter()
            .filter_map(|record| find_foreign_key(record, &self.id_field))
        {
            match tally.iter_mut().find(|(seen, _)| *seen == key) {
                Some((_, count)) => *count += 1,
                None => tally.push((key, 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for (key, count) in tally {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((key, count));
            }
        }
        best.map(|(key, _)| key.to_string())
    }

    fn name(&self) -> &'static str {
        "majority_vote"
    }
}

/// Strategy selector used by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    FirstRecord,
    MajorityVote,
}

impl StrategyKind {
    pub fn build(self, id_field: &str) -> Box<dyn ForeignKeyStrategy> {
        let id_field = id_field.to_string();
        match self {
            StrategyKind::FirstRecord => Box::new(FirstRecord { id_field }),
            StrategyKind::MajorityVote => Box::new(MajorityVote { id_field }),
        }
    }
}

/// Key fields of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLinkage {
    pub primary_key: String,
    pub foreign_key: Option<String>,
}

/// Entity → key fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkageConfig(BTreeMap<String, EntityLinkage>);

impl LinkageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: impl Into<String>, linkage: EntityLinkage) {
        self.0.insert(entity.into(), linkage);
    }

    pub fn get(&self, entity: &str) -> Option<&EntityLinkage> {
        self.0.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EntityLinkage)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a hand-written config, failing on anything that is not
    /// `{entity: {"primary_key": str, "foreign_key": str | null}}`
    pub fn from_value(value: &Value) -> Result<Self> {
        let entries = value.as_object().ok_or_else(|| {
            ValidatorError::ConfigShape(format!(
                "expected an object of entities, found {}",
                json_kind(value)
            ))
        })?;

        let mut config = Self::new();
        for (entity, entry) in entries {
            let fields = entry.as_object().ok_or_else(|| {
                ValidatorError::ConfigShape(format!(
                    "entry for '{}' must be an object, found {}",
                    entity,
                    json_kind(entry)
                ))
            })?;

            let primary_key = match fields.get("primary_key") {
                Some(Value::String(pk)) => pk.clone(),
                Some(other) => {
                    return Err(ValidatorError::ConfigShape(format!(
                        "'{}'.primary_key must be a string, found {}",
                        entity,
                        json_kind(other)
                    )))
                }
                None => {
                    return Err(ValidatorError::ConfigShape(format!(
                        "'{}' is missing primary_key",
                        entity
                    )))
                }
            };

            let foreign_key = match fields.get("foreign_key") {
                Some(Value::String(fk)) => Some(fk.clone()),
                Some(Value::Null) => None,
                Some(other) => {
                    return Err(ValidatorError::ConfigShape(format!(
                        "'{}'.foreign_key must be a string or null, found {}",
                        entity,
                        json_kind(other)
                    )))
                }
                None => {
                    return Err(ValidatorError::ConfigShape(format!(
                        "'{}' is missing foreign_key",
                        entity
                    )))
                }
            };

            config.insert(
                entity.clone(),
                EntityLinkage {
                    primary_key,
                    foreign_key,
                },
            );
        }

        Ok(config)
    }
}

/// Infer key fields for every entity in `data`
pub fn infer_config(data: &DataMap, suffix: &str, strategy: &dyn ForeignKeyStrategy) -> LinkageConfig {
    let mut config = LinkageConfig::new();
    for (entity, records) in data {
        let foreign_key = strategy.foreign_key(records);
        if records.is_empty() {
            warn!(entity = %entity, "no records, foreign key left unset");
        }
        config.insert(
            entity.clone(),
            EntityLinkage {
                primary_key: format!("{}{}", entity, suffix),
                foreign_key,
            },
        );
    }
    info!(entities = config.len(), strategy = strategy.name(), "inferred linkage config");
    config
}

/// Outcome of checking a config's foreign keys against its primary keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigVerdict {
    Valid,
    /// Entity → foreign key that matches no other entity's primary key
    Broken(BTreeMap<String, String>),
}

impl ConfigVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ConfigVerdict::Valid)
    }
}

impl Serialize for ConfigVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ConfigVerdict::Valid => serializer.serialize_str("valid"),
            ConfigVerdict::Broken(links) => {
                let mut map = serializer.serialize_map(Some(links.len()))?;
                for (entity, fk) in links {
                    map.serialize_entry(entity, fk)?;
                }
                map.end()
            }
        }
    }
}

/// Check that each foreign key names another entity's primary key.
///
/// Root entities with an unmatched foreign key are logged and tolerated.
pub fn validate_config(config: &LinkageConfig, root_nodes: &[String]) -> ConfigVerdict {
    info!(?root_nodes, "validating linkage config");
    let mut broken = BTreeMap::new();

    for (entity, linkage) in config.iter() {
        let Some(fk) = &linkage.foreign_key else {
            continue;
        };

        let matched = config
            .iter()
            .any(|(other, l)| other != entity && &l.primary_key == fk);
        if matched {
            continue;
        }

        if root_nodes.iter().any(|root| root == entity) {
            warn!(entity = %entity, foreign_key = %fk, "ignoring broken link on root node");
        } else {
            broken.insert(entity.clone(), fk.clone());
        }
    }

    if broken.is_empty() {
        info!("linkage config valid");
        ConfigVerdict::Valid
    } else {
        warn!(?broken, "linkage config has broken links");
        ConfigVerdict::Broken(broken)
    }
}

/// Linkage checks bound to one set of settings
pub struct Linkage {
    pub root_nodes: Vec<String>,
    pub link_suffix: String,
    pub id_field: String,
    strategy: Box<dyn ForeignKeyStrategy>,
    last_report: Option<LinkReport>,
}

impl Default for Linkage {
    fn default() -> Self {
        Self::new(&LinkageSettings::default())
    }
}

impl Linkage {
    pub fn new(settings: &LinkageSettings) -> Self {
        Self {
            root_nodes: settings.root_nodes.clone(),
            link_suffix: settings.link_suffix.clone(),
            id_field: settings.id_field.clone(),
            strategy: settings.strategy.build(&settings.id_field),
            last_report: None,
        }
    }

    /// Replace the foreign key strategy
    pub fn with_strategy(mut self, strategy: Box<dyn ForeignKeyStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn generate_config(&self, data: &DataMap) -> LinkageConfig {
        infer_config(data, &self.link_suffix, self.strategy.as_ref())
    }

    pub fn validate_config(&self, config: &LinkageConfig) -> ConfigVerdict {
        validate_config(config, &self.root_nodes)
    }

    /// Run the full link check and keep the report
    pub fn validate_links(&mut self, data: &DataMap, config: &LinkageConfig) -> Result<&LinkReport> {
        let report = check_links(data, config, &self.root_nodes, &self.id_field)?;
        Ok(self.last_report.insert(report))
    }

    /// Report from the most recent `validate_links` call
    pub fn last_report(&self) -> Option<&LinkReport> {
        self.last_report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_map(value: Value) -> DataMap {
        serde_json::from_value(value).unwrap()
    }

    fn roots() -> Vec<String> {
        vec!["subject".to_string()]
    }

    fn passing_data() -> DataMap {
        data_map(json!({
            "sample": [{
                "storage_location": "UMELB",
                "subjects": {"submitter_id": "subject_e5616257f8"},
                "submitter_id": "sample_efdbe56d20",
                "type": "sample",
                "samples": "sample_efdbe56d20"
            }],
            "subject": [{
                "submitter_id": "subject_e5616257f8",
                "type": "subject",
                "subjects": "subject_e5616257f8"
            }],
            "genomics_assay": [{
                "submitter_id": "genomics_assay_1",
                "samples": {"submitter_id": "sample_efdbe56d20"},
                "type": "genomics_assay",
                "genomics_assays": "genomics_assay_1"
            }]
        }))
    }

    fn config(value: Value) -> LinkageConfig {
        LinkageConfig::from_value(&value).unwrap()
    }

    #[test]
    fn test_find_foreign_key() {
        let cases = [
            (json!({"id": "sample_1", "subjects": {"submitter_id": "subject_1"}, "foo": 123}), Some("subjects")),
            (json!({"id": "subject_1", "name": "John Doe"}), None),
            (
                json!({"id": "ga_1", "samples": {"submitter_id": "sample_1"}, "other": {"not_submitter_id": "foo"}}),
                Some("samples"),
            ),
            (json!("not a record"), None),
        ];
        for (record, expected) in cases {
            assert_eq!(find_foreign_key(&record, "submitter_id"), expected);
        }
    }

    #[test]
    fn test_first_match_wins_in_authored_order() {
        let record = json!({
            "projects": {"submitter_id": "p1"},
            "subjects": {"submitter_id": "s1"}
        });
        assert_eq!(find_foreign_key(&record, "submitter_id"), Some("projects"));
    }

    #[test]
    fn test_generate_config() {
        let linkage = Linkage::default();
        let generated = linkage.generate_config(&passing_data());
        let expected = config(json!({
            "sample": {"primary_key": "samples", "foreign_key": "subjects"},
            "subject": {"primary_key": "subjects", "foreign_key": null},
            "genomics_assay": {"primary_key": "genomics_assays", "foreign_key": "samples"}
        }));
        assert_eq!(generated, expected);
    }

    #[test]
    fn test_generate_config_without_foreign_keys() {
        let data = data_map(json!({
            "subject": [{"subjects": "subject_1", "name": "Alice"}],
            "sample": [{"samples": "sample_1", "bar": 123}],
            "empty": []
        }));
        let generated = Linkage::default().generate_config(&data);
        assert_eq!(generated.get("subject").unwrap().foreign_key, None);
        assert_eq!(generated.get("sample").unwrap().foreign_key, None);
        assert_eq!(generated.get("sample").unwrap().primary_key, "samples");
        assert_eq!(generated.get("empty").unwrap().foreign_key, None);
    }

    #[test]
    fn test_majority_vote() {
        let records = vec![
            json!({"name": "no link"}),
            json!({"projects": {"submitter_id": "p1"}}),
            json!({"subjects": {"submitter_id": "s1"}}),
            json!({"subjects": {"submitter_id": "s2"}}),
        ];
        let first = FirstRecord { id_field: "submitter_id".to_string() };
        let majority = MajorityVote { id_field: "submitter_id".to_string() };
        assert_eq!(first.foreign_key(&records), None);
        assert_eq!(majority.foreign_key(&records).as_deref(), Some("subjects"));

        let tied = vec![
            json!({"projects": {"submitter_id": "p1"}}),
            json!({"subjects": {"submitter_id": "s1"}}),
        ];
        assert_eq!(majority.foreign_key(&tied).as_deref(), Some("projects"));
        assert_eq!(majority.foreign_key(&[]), None);
    }

    #[test]
    fn test_strategy_override() {
        let data = data_map(json!({
            "sample": [
                {"name": "first has no link"},
                {"subjects": {"submitter_id": "s1"}}
            ]
        }));
        let linkage = Linkage::default().with_strategy(StrategyKind::MajorityVote.build("submitter_id"));
        let generated = linkage.generate_config(&data);
        assert_eq!(generated.get("sample").unwrap().foreign_key.as_deref(), Some("subjects"));
    }

    #[test]
    fn test_validate_config_valid() {
        let cfg = config(json!({
            "subject": {"primary_key": "subjects", "foreign_key": null},
            "sample": {"primary_key": "samples", "foreign_key": "subjects"},
            "genomics_assay": {"primary_key": "genomics_assays", "foreign_key": "samples"}
        }));
        assert_eq!(validate_config(&cfg, &roots()), ConfigVerdict::Valid);
    }

    #[test]
    fn test_validate_config_broken() {
        let cfg = config(json!({
            "subject": {"primary_key": "subjects", "foreign_key": null},
            "sample": {"primary_key": "samples", "foreign_key": "not_a_real_pk"},
            "genomics_assay": {"primary_key": "genomics_assays", "foreign_key": "samples"}
        }));
        match validate_config(&cfg, &roots()) {
            ConfigVerdict::Broken(links) => {
                assert_eq!(links.len(), 1);
                assert_eq!(links["sample"], "not_a_real_pk");
            }
            ConfigVerdict::Valid => panic!("expected broken links"),
        }
    }

    #[test]
    fn test_root_node_exemption() {
        let cfg = config(json!({
            "subject": {"primary_key": "subjects", "foreign_key": "not_a_real_pk"},
            "sample": {"primary_key": "samples", "foreign_key": "subjects"}
        }));
        assert!(validate_config(&cfg, &roots()).is_valid());

        let verdict = validate_config(&cfg, &[]);
        assert_eq!(
            verdict,
            ConfigVerdict::Broken(BTreeMap::from([(
                "subject".to_string(),
                "not_a_real_pk".to_string()
            )]))
        );
    }

    #[test]
    fn test_self_reference_is_not_a_match() {
        let cfg = config(json!({
            "sample": {"primary_key": "samples", "foreign_key": "samples"}
        }));
        assert!(!validate_config(&cfg, &roots()).is_valid());
    }

    #[test]
    fn test_verdict_serialization() {
        assert_eq!(serde_json::to_value(ConfigVerdict::Valid).unwrap(), json!("valid"));
        let broken = ConfigVerdict::Broken(BTreeMap::from([("sample".to_string(), "x".to_string())]));
        assert_eq!(serde_json::to_value(broken).unwrap(), json!({"sample": "x"}));
    }

    #[test]
    fn test_config_shape_errors() {
        let bad = [
            json!([{"primary_key": "subjects", "foreign_key": null}]),
            json!({"subject": ["subjects", null]}),
            json!({"subject": {"primary_key": "subjects"}}),
            json!({"subject": {"foreign_key": null}}),
            json!({"subject": {"primary_key": null, "foreign_key": null}}),
            json!({"subject": {"primary_key": "subjects", "foreign_key": 3}}),
        ];
        for value in bad {
            assert!(
                matches!(LinkageConfig::from_value(&value), Err(ValidatorError::ConfigShape(_))),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn test_facade_keeps_last_report() {
        let mut linkage = Linkage::default();
        assert!(linkage.last_report().is_none());

        let data = passing_data();
        let cfg = linkage.generate_config(&data);
        let report = linkage.validate_links(&data, &cfg).unwrap();
        assert!(report.is_clean());
        assert!(linkage.last_report().is_some());
    }
}
