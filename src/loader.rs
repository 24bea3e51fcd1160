//! Filesystem loading of dictionaries, submissions and linkage configs

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::OutputFormat;
use crate::error::{Result, ValidatorError};
use crate::linkage::LinkageConfig;
use crate::schema::SchemaDocument;
use crate::tabular::Sheet;
use crate::DataMap;

/// Read and parse one JSON file
pub fn load_json(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a bundled dictionary (one JSON object of nodes)
pub fn load_schema(path: impl AsRef<Path>) -> Result<SchemaDocument> {
    let path = path.as_ref();
    let document = SchemaDocument::from_value(load_json(path)?)?;
    info!(path = %path.display(), nodes = document.len(), "loaded schema");
    Ok(document)
}

/// Load a hand-written linkage config
pub fn load_linkage_config(path: impl AsRef<Path>) -> Result<LinkageConfig> {
    LinkageConfig::from_value(&load_json(path)?)
}

/// `.json` files directly inside `dir`, sorted by path
pub fn list_data_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ValidatorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("data folder not found: {}", dir.display()),
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

/// Load one file per entity; the file stem names the entity.
///
/// A file holding a single object is read as a one-record list.
pub fn load_data_dir(dir: impl AsRef<Path>) -> Result<DataMap> {
    let dir = dir.as_ref();
    let mut data = DataMap::new();

    for path in list_data_files(dir)? {
        let Some(entity) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            warn!(path = %path.display(), "skipping file with unreadable name");
            continue;
        };

        let records = match load_json(&path)? {
            Value::Array(records) => records,
            object @ Value::Object(_) => vec![object],
            other => {
                return Err(ValidatorError::InvalidDocument(format!(
                    "{}: expected a list of records, found {}",
                    path.display(),
                    crate::schema::json_kind(&other)
                )))
            }
        };
        debug!(entity = %entity, records = records.len(), "loaded data file");
        data.insert(entity, records);
    }

    info!(dir = %dir.display(), entities = data.len(), "loaded data");
    Ok(data)
}

/// Load a workbook exported as `{"<sheet>": [{<column>: <cell>}, ...]}`
pub fn load_sheets(path: impl AsRef<Path>) -> Result<Vec<Sheet>> {
    Sheet::from_workbook(&load_json(path)?)
}

/// Write any serializable value as JSON
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T, format: OutputFormat) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format.render(value)?)?;
    info!(path = %path.display(), "wrote output");
    Ok(())
}
