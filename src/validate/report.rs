//! Reporting views over a validation result tree
//!
//! All views are read-only. Counts are at outcome granularity: one record with
//! three violations contributes three FAIL outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{RecordResult, ValidationOutcome, ValidationResultTree, ValidationStatus};

/// Which outcomes a view returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultFilter {
    Pass,
    #[default]
    Fail,
    All,
}

impl ResultFilter {
    pub fn matches(self, status: ValidationStatus) -> bool {
        match self {
            ResultFilter::All => true,
            ResultFilter::Pass => status == ValidationStatus::Pass,
            ResultFilter::Fail => status == ValidationStatus::Fail,
        }
    }
}

impl fmt::Display for ResultFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultFilter::Pass => "PASS",
            ResultFilter::Fail => "FAIL",
            ResultFilter::All => "ALL",
        };
        f.write_str(name)
    }
}

impl FromStr for ResultFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PASS" => Ok(ResultFilter::Pass),
            "FAIL" => Ok(ResultFilter::Fail),
            "ALL" => Ok(ResultFilter::All),
            other => Err(format!("unknown result filter '{}', expected PASS, FAIL or ALL", other)),
        }
    }
}

/// Error counts of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity: String,
    #[serde(rename = "number_of_rows_with_errors")]
    pub rows_with_errors: usize,
    #[serde(rename = "number_of_errors_per_entity")]
    pub errors: usize,
}

/// One outcome as a table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    pub guid: Uuid,
    pub entity: String,
    pub row: usize,
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

/// Rows sharing one error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapsedRow {
    pub entity: String,
    pub count: usize,
    pub validation_error: String,
}

impl ValidationResultTree {
    /// Entities that were validated
    pub fn entities(&self) -> Vec<&str> {
        self.iter().map(|(entity, _)| entity.as_str()).collect()
    }

    /// `index_<i>` labels of one entity; empty for unknown entities
    pub fn index_labels(&self, entity: &str) -> Vec<&str> {
        self.records(entity)
            .unwrap_or_default()
            .iter()
            .map(|r| r.label.as_str())
            .collect()
    }

    /// Entity → index labels
    pub fn key_map(&self) -> BTreeMap<String, Vec<String>> {
        self.iter()
            .map(|(entity, records)| {
                (
                    entity.clone(),
                    records.iter().map(|r| r.label.clone()).collect(),
                )
            })
            .collect()
    }

    /// Record groups of an entity whose first outcome matches `filter`.
    ///
    /// `All` returns every group, including records with no outcomes.
    pub fn pull_entity(&self, entity: &str, filter: ResultFilter) -> Vec<&RecordResult> {
        let pulled: Vec<&RecordResult> = self
            .records(entity)
            .unwrap_or_default()
            .iter()
            .filter(|r| filter == ResultFilter::All || r.status().is_some_and(|s| filter.matches(s)))
            .collect();
        debug!(entity, %filter, count = pulled.len(), "pulled entity results");
        pulled
    }

    /// Outcomes at one record label matching `filter`; empty when unknown
    pub fn pull_index(&self, entity: &str, label: &str, filter: ResultFilter) -> Vec<&ValidationOutcome> {
        self.records(entity)
            .unwrap_or_default()
            .iter()
            .find(|r| r.label == label)
            .map(|r| {
                r.outcomes
                    .iter()
                    .filter(|o| filter.matches(o.status()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of outcomes at one record matching `filter`
    pub fn count_by_index(&self, entity: &str, label: &str, filter: ResultFilter) -> usize {
        self.pull_index(entity, label, filter).len()
    }

    /// Number of outcomes across an entity matching `filter`
    pub fn count_by_entity(&self, entity: &str, filter: ResultFilter) -> usize {
        self.records(entity)
            .unwrap_or_default()
            .iter()
            .flat_map(|r| &r.outcomes)
            .filter(|o| filter.matches(o.status()))
            .count()
    }

    /// FAIL outcomes across all entities
    pub fn total_validation_errors(&self) -> usize {
        let total = self
            .entities()
            .into_iter()
            .map(|entity| self.count_by_entity(entity, ResultFilter::Fail))
            .sum();
        info!(total, "total validation errors");
        total
    }

    /// Records of an entity whose first outcome is a FAIL
    pub fn rows_with_errors(&self, entity: &str) -> usize {
        self.pull_entity(entity, ResultFilter::Fail).len()
    }

    pub fn summary_stats(&self) -> Vec<EntitySummary> {
        self.entities()
            .into_iter()
            .map(|entity| EntitySummary {
                entity: entity.to_string(),
                rows_with_errors: self.rows_with_errors(entity),
                errors: self.count_by_entity(entity, ResultFilter::Fail),
            })
            .collect()
    }

    /// One row per outcome matching `filter`, each with a fresh random guid
    pub fn flatten(&self, filter: ResultFilter) -> Vec<FlatRow> {
        let mut rows = Vec::new();
        for (entity, records) in self.iter() {
            for (position, record) in records.iter().enumerate() {
                let row = record.index().unwrap_or(position);
                rows.extend(
                    record
                        .outcomes
                        .iter()
                        .filter(|o| filter.matches(o.status()))
                        .map(|outcome| FlatRow {
                            guid: Uuid::new_v4(),
                            entity: entity.clone(),
                            row,
                            outcome: outcome.clone(),
                        }),
                );
            }
        }
        info!(%filter, rows = rows.len(), "flattened validation results");
        rows
    }
}

/// Rows ordered by entity, then record number
pub fn sorted_rows(mut rows: Vec<FlatRow>) -> Vec<FlatRow> {
    rows.sort_by(|a, b| a.entity.cmp(&b.entity).then(a.row.cmp(&b.row)));
    rows
}

/// Group rows by error message, keeping the first entity seen for each.
///
/// Rows without a message (PASS outcomes) are ignored.
pub fn collapse(rows: &[FlatRow]) -> Vec<CollapsedRow> {
    let mut groups: BTreeMap<&str, CollapsedRow> = BTreeMap::new();
    for row in rows {
        let Some(message) = row.outcome.validation_error() else {
            continue;
        };
        groups
            .entry(message)
            .or_insert_with(|| CollapsedRow {
                entity: row.entity.clone(),
                count: 0,
                validation_error: message.to_string(),
            })
            .count += 1;
    }

    let mut collapsed: Vec<CollapsedRow> = groups.into_values().collect();
    collapsed.sort_by(|a, b| {
        a.entity
            .cmp(&b.entity)
            .then_with(|| a.validation_error.cmp(&b.validation_error))
            .then(a.count.cmp(&b.count))
    });
    collapsed
}
