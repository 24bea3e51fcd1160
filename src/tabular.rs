//! Workbook to data map conversion
//!
//! Each sheet holds one entity. A sheet named `sample` identifies its rows
//! with a `sample_uid` column and points at its parent with another `*_uid`
//! column (`subject_uid`). Every row becomes a record:
//!
//! ```text
//! sample_uid | subject_uid | sample_type        {"sample_type": "blood",
//! -----------+-------------+-------------   =>    "key_fk": "subject-1",
//! sample-1   | subject-1   | blood                "key_pk": "sample-1",
//!                                                 "subjects": {"submitter_id": "subject-1"},
//!                                                 "submitter_id": "sample-1"}
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::LinkageSettings;
use crate::error::{Result, ValidatorError};
use crate::schema::json_kind;
use crate::DataMap;

/// Suffix of identifier columns
pub const UID_SUFFIX: &str = "_uid";

/// One sheet of rows keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Map<String, Value>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Column names in the order of the first row
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Read `{"<sheet>": [{<column>: <cell>}, ...], ...}`
    pub fn from_workbook(value: &Value) -> Result<Vec<Sheet>> {
        let sheets = value.as_object().ok_or_else(|| {
            ValidatorError::InvalidDocument(format!(
                "expected an object of sheets, found {}",
                json_kind(value)
            ))
        })?;

        sheets
            .iter()
            .map(|(name, rows)| {
                let rows = rows
                    .as_array()
                    .ok_or_else(|| {
                        ValidatorError::InvalidDocument(format!("sheet '{}' is not a list of rows", name))
                    })?
                    .iter()
                    .map(|row| match row {
                        Value::Object(cells) => Ok(cells.clone()),
                        other => Err(ValidatorError::InvalidDocument(format!(
                            "sheet '{}' has a {} row",
                            name,
                            json_kind(other)
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Sheet::new(name.clone(), rows))
            })
            .collect()
    }
}

/// Key columns of one sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetKeys {
    pub primary: String,
    pub foreign: Option<String>,
}

/// Converts sheets into entity records
#[derive(Debug, Clone)]
pub struct TabularConverter {
    skip_rows: usize,
    link_suffix: String,
    id_field: String,
    uid_column: Regex,
}

impl Default for TabularConverter {
    fn default() -> Self {
        Self::new(0, &LinkageSettings::default())
    }
}

impl TabularConverter {
    pub fn new(skip_rows: usize, settings: &LinkageSettings) -> Self {
        Self {
            skip_rows,
            link_suffix: settings.link_suffix.clone(),
            id_field: settings.id_field.clone(),
            uid_column: Regex::new(r"^(?P<entity>.+)_uid$").unwrap(),
        }
    }

    /// Rows left after dropping the leading `skip_rows`
    pub fn rows<'s>(&self, sheet: &'s Sheet) -> &'s [Map<String, Value>] {
        sheet.rows.get(self.skip_rows..).unwrap_or_default()
    }

    /// Find the key columns of a sheet.
    ///
    /// The primary key column is `<sheet>_uid` and the foreign key column the
    /// first other `*_uid` column. Without a `<sheet>_uid` column the first and
    /// second columns are used.
    pub fn key_columns(&self, sheet: &Sheet) -> Option<SheetKeys> {
        let columns = sheet
            .rows
            .get(self.skip_rows)
            .map(|row| row.keys().map(String::as_str).collect::<Vec<_>>())
            .unwrap_or_default();
        let primary = format!("{}{}", sheet.name, UID_SUFFIX);

        if columns.iter().any(|c| *c == primary) {
            let foreign = columns
                .iter()
                .find(|c| **c != primary && self.uid_column.is_match(c))
                .map(|c| c.to_string());
            return Some(SheetKeys { primary, foreign });
        }

        let mut fallback = columns.into_iter();
        let primary = fallback.next()?.to_string();
        let foreign = fallback.next().map(str::to_string);
        debug!(sheet = %sheet.name, %primary, ?foreign, "no uid column, using leading columns as keys");
        Some(SheetKeys { primary, foreign })
    }

    /// Entity a foreign key column points at (`subject_uid` → `subject`)
    fn parent_entity<'c>(&self, column: &'c str) -> &'c str {
        self.uid_column
            .captures(column)
            .and_then(|caps| caps.name("entity"))
            .map(|m| m.as_str())
            .unwrap_or(column)
    }

    /// Convert one sheet into records
    pub fn convert_sheet(&self, sheet: &Sheet) -> Vec<Value> {
        let Some(keys) = self.key_columns(sheet) else {
            warn!(sheet = %sheet.name, "sheet has no columns, skipping");
            return Vec::new();
        };
        let link_field = keys
            .foreign
            .as_deref()
            .map(|fk| format!("{}{}", self.parent_entity(fk), self.link_suffix));

        self.rows(sheet)
            .iter()
            .map(|row| {
                let pk = row.get(&keys.primary).cloned().unwrap_or(Value::Null);
                let fk = keys
                    .foreign
                    .as_ref()
                    .and_then(|column| row.get(column))
                    .cloned()
                    .unwrap_or(Value::Null);

                let mut record: Map<String, Value> = row
                    .iter()
                    .filter(|(column, _)| {
                        **column != keys.primary
                            && Some(column.as_str()) != keys.foreign.as_deref()
                            && Some(column.as_str()) != link_field.as_deref()
                            && **column != self.id_field
                    })
                    .map(|(column, cell)| (column.clone(), cell.clone()))
                    .collect();

                record.insert("key_fk".to_string(), fk.clone());
                record.insert("key_pk".to_string(), pk.clone());
                if let Some(link_field) = &link_field {
                    if !fk.is_null() {
                        let mut relationship = Map::new();
                        relationship.insert(self.id_field.clone(), fk);
                        record.insert(link_field.clone(), Value::Object(relationship));
                    }
                }
                record.insert(self.id_field.clone(), pk);
                Value::Object(record)
            })
            .collect()
    }

    /// Convert every sheet; the sheet name becomes the entity name
    pub fn convert(&self, sheets: &[Sheet]) -> DataMap {
        sheets
            .iter()
            .map(|sheet| (sheet.name.clone(), self.convert_sheet(sheet)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sheet(name: &str, rows: Value) -> Sheet {
        let rows = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect();
        Sheet::new(name, rows)
    }

    #[test]
    fn test_fallback_key_columns() {
        let s = sheet("sheet1", json!([{"pk_col": 1, "fk_col": 3}, {"pk_col": 2, "fk_col": 4}]));
        let keys = TabularConverter::default().key_columns(&s).unwrap();
        assert_eq!(keys.primary, "pk_col");
        assert_eq!(keys.foreign.as_deref(), Some("fk_col"));
    }

    #[test]
    fn test_skip_rows() {
        let s = sheet("sheet1", json!([{"pk_col": 1, "fk_col": 3}, {"pk_col": 2, "fk_col": 4}]));
        let converter = TabularConverter::new(1, &LinkageSettings::default());
        let rows = converter.rows(&s);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pk_col"], 2);

        let past_end = TabularConverter::new(5, &LinkageSettings::default());
        assert!(past_end.rows(&s).is_empty());
        assert!(past_end.convert_sheet(&s).is_empty());
    }

    #[test]
    fn test_convert_sheet() {
        let s = sheet(
            "lipidomics_assay",
            json!([{
                "lipidomics_assay_uid": "lipidomics-assay-example-01-004-990910001",
                "sample_uid": "sample-example-0000101",
                "assay_id": "AD01_012#01-004-990910001",
                "assay_description": "Targeted mass spec lipidome",
                "instrument_type": "Agilent QQQ LC-MS",
                "type": "lipidomics_assay"
            }]),
        );
        let converter = TabularConverter::default();
        let keys = converter.key_columns(&s).unwrap();
        assert_eq!(keys.primary, "lipidomics_assay_uid");
        assert_eq!(keys.foreign.as_deref(), Some("sample_uid"));

        let records = converter.convert_sheet(&s);
        let expected = json!({
            "assay_id": "AD01_012#01-004-990910001",
            "assay_description": "Targeted mass spec lipidome",
            "instrument_type": "Agilent QQQ LC-MS",
            "type": "lipidomics_assay",
            "key_fk": "sample-example-0000101",
            "key_pk": "lipidomics-assay-example-01-004-990910001",
            "samples": {"submitter_id": "sample-example-0000101"},
            "submitter_id": "lipidomics-assay-example-01-004-990910001"
        });
        assert_eq!(records, vec![expected.clone()]);

        let keys: Vec<_> = records[0].as_object().unwrap().keys().cloned().collect();
        let expected_keys: Vec<_> = expected.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, expected_keys);
    }

    #[test]
    fn test_missing_parent_value_has_no_relationship() {
        let s = sheet("sample", json!([{"sample_uid": "s1", "subject_uid": null, "type": "sample"}]));
        let records = TabularConverter::default().convert_sheet(&s);
        assert_eq!(
            records[0],
            json!({"type": "sample", "key_fk": null, "key_pk": "s1", "submitter_id": "s1"})
        );
    }

    #[test]
    fn test_converted_records_feed_linkage() {
        let sheets = vec![
            sheet("subject", json!([{"subject_uid": "subject-1", "project_uid": "project-1"}])),
            sheet("sample", json!([{"sample_uid": "sample-1", "subject_uid": "subject-1"}])),
        ];
        let data = TabularConverter::default().convert(&sheets);
        assert_eq!(data.len(), 2);
        assert_eq!(data["sample"][0]["subjects"], json!({"submitter_id": "subject-1"}));
        assert_eq!(data["subject"][0]["projects"], json!({"submitter_id": "project-1"}));
    }

    #[test]
    fn test_from_workbook() {
        let sheets = Sheet::from_workbook(&json!({
            "sample": [{"sample_uid": "s1"}],
            "subject": []
        }))
        .unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].columns(), vec!["sample_uid"]);
        assert!(sheets[1].columns().is_empty());

        assert!(Sheet::from_workbook(&json!([])).is_err());
        assert!(Sheet::from_workbook(&json!({"sample": [1]})).is_err());
    }
}
