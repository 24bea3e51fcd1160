//! Key value extraction and orphan detection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::{validate_config, ConfigVerdict, LinkageConfig};
use crate::error::{Result, ValidatorError};
use crate::DataMap;

/// Which configured field to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Foreign,
}

/// Read the configured key field of every record.
///
/// Absent and null fields are skipped; relationship objects are unwrapped to
/// their `id_field`. Every config entity must be present in `data`.
pub fn extract_values(
    data: &DataMap,
    config: &LinkageConfig,
    kind: KeyKind,
    id_field: &str,
) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut values = BTreeMap::new();

    for (entity, linkage) in config.iter() {
        let records = data
            .get(entity)
            .ok_or_else(|| ValidatorError::UnknownEntity(entity.clone()))?;

        let field = match kind {
            KeyKind::Primary => Some(linkage.primary_key.as_str()),
            KeyKind::Foreign => linkage.foreign_key.as_deref(),
        };

        let extracted: Vec<Value> = match field {
            Some(field) => records
                .iter()
                .filter_map(|record| record.as_object()?.get(field))
                .filter(|value| !value.is_null())
                .map(|value| match value.get(id_field) {
                    Some(id) if value.is_object() => id.clone(),
                    _ => value.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        debug!(entity = %entity, ?kind, count = extracted.len(), "extracted key values");
        values.insert(entity.clone(), extracted);
    }

    Ok(values)
}

/// Set of identifiers a foreign key value may resolve to
pub trait IdentifierSpace {
    /// True if `value`, referenced from `entity`, names a known record
    fn contains(&self, entity: &str, value: &Value) -> bool;
}

/// Union of every entity's primary key values.
///
/// Sound only while identifiers are unique across the whole submission.
#[derive(Debug, Clone, Default)]
pub struct GlobalIdentifierSpace {
    identifiers: HashSet<String>,
}

impl GlobalIdentifierSpace {
    pub fn from_primary_keys(primary: &BTreeMap<String, Vec<Value>>) -> Self {
        Self {
            identifiers: primary.values().flatten().map(identifier).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

impl IdentifierSpace for GlobalIdentifierSpace {
    fn contains(&self, _entity: &str, value: &Value) -> bool {
        self.identifiers.contains(&identifier(value))
    }
}

/// Comparison form of a key value; JSON text keeps `"1"` and `1` apart
fn identifier(value: &Value) -> String {
    value.to_string()
}

/// Result of a link check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "entities", rename_all = "snake_case")]
pub enum LinkReport {
    /// The config itself was broken; entity → unmatched foreign key field
    BrokenConfig(BTreeMap<String, String>),
    /// Entity → foreign key values with no matching record, in record order
    Checked(BTreeMap<String, Vec<Value>>),
}

impl LinkReport {
    /// True when the config was valid and no value was orphaned
    pub fn is_clean(&self) -> bool {
        match self {
            LinkReport::BrokenConfig(_) => false,
            LinkReport::Checked(orphans) => orphans.values().all(Vec::is_empty),
        }
    }

    /// Orphaned values of one entity; empty for broken configs
    pub fn orphans(&self, entity: &str) -> &[Value] {
        match self {
            LinkReport::Checked(orphans) => orphans.get(entity).map(Vec::as_slice).unwrap_or(&[]),
            LinkReport::BrokenConfig(_) => &[],
        }
    }

    pub fn orphan_count(&self) -> usize {
        match self {
            LinkReport::Checked(orphans) => orphans.values().map(Vec::len).sum(),
            LinkReport::BrokenConfig(_) => 0,
        }
    }
}

/// Check every foreign key value against the global identifier space
pub fn check_links(
    data: &DataMap,
    config: &LinkageConfig,
    root_nodes: &[String],
    id_field: &str,
) -> Result<LinkReport> {
    if let ConfigVerdict::Broken(links) = validate_config(config, root_nodes) {
        warn!("linkage config invalid, skipping value checks");
        return Ok(LinkReport::BrokenConfig(links));
    }

    let primary = extract_values(data, config, KeyKind::Primary, id_field)?;
    let space = GlobalIdentifierSpace::from_primary_keys(&primary);
    find_orphans(data, config, id_field, &space)
}

/// Check every foreign key value against a caller-supplied identifier space
pub fn check_links_in(
    data: &DataMap,
    config: &LinkageConfig,
    root_nodes: &[String],
    id_field: &str,
    space: &dyn IdentifierSpace,
) -> Result<LinkReport> {
    if let ConfigVerdict::Broken(links) = validate_config(config, root_nodes) {
        warn!("linkage config invalid, skipping value checks");
        return Ok(LinkReport::BrokenConfig(links));
    }
    find_orphans(data, config, id_field, space)
}

fn find_orphans(
    data: &DataMap,
    config: &LinkageConfig,
    id_field: &str,
    space: &dyn IdentifierSpace,
) -> Result<LinkReport> {
    let foreign = extract_values(data, config, KeyKind::Foreign, id_field)?;
    info!("validating links");

    let mut orphans = BTreeMap::new();
    for (entity, values) in foreign {
        let missing: Vec<Value> = values
            .into_iter()
            .filter(|value| !space.contains(&entity, value))
            .collect();
        info!(entity = %entity, invalid = missing.len(), "checked foreign keys");
        orphans.insert(entity, missing);
    }

    Ok(LinkReport::Checked(orphans))
}
