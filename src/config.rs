//! Configuration management for the validator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (validator.toml)
//! - Environment variables (VALIDATOR__*)
//!
//! ## Example config file (validator.toml):
//! ```toml
//! [schema]
//! definitions_node = "_definitions.yaml"
//! terms_node = "_terms.yaml"
//! settings_node = "_settings.yaml"
//! version_field = "_dict_version"
//! excluded_nodes = ["_definitions.yaml", "_terms.yaml", "_settings.yaml", "program.yaml"]
//! aggregation_node = "core_metadata_collection"
//!
//! [linkage]
//! root_nodes = ["subject"]
//! link_suffix = "s"
//! id_field = "submitter_id"
//! strategy = "first_record"
//!
//! [validation]
//! leading_error = "keep_all"
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::graph::AGGREGATION_NODE;
use crate::linkage::StrategyKind;
use crate::validate::LeadingErrorPolicy;

/// Main configuration for the validator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Dictionary layout
    #[serde(default)]
    pub schema: SchemaSettings,

    /// Foreign key inference and link checks
    #[serde(default)]
    pub linkage: LinkageSettings,

    /// Structural validation
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Report output
    #[serde(default)]
    pub output: OutputSettings,
}

/// Names of the special dictionary nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Node holding the shared definitions fragment
    #[serde(default = "default_definitions_node")]
    pub definitions_node: String,

    /// Node holding the shared terms fragment
    #[serde(default = "default_terms_node")]
    pub terms_node: String,

    /// Node carrying the dictionary version
    #[serde(default = "default_settings_node")]
    pub settings_node: String,

    /// Field of the settings node holding the version string
    #[serde(default = "default_version_field")]
    pub version_field: String,

    /// Nodes left out of the relationship graph
    #[serde(default = "default_excluded_nodes")]
    pub excluded_nodes: Vec<String>,

    /// Entity always placed last in the node order
    #[serde(default = "default_aggregation_node")]
    pub aggregation_node: Option<String>,
}

/// Linkage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkageSettings {
    /// Entities allowed to reference something outside the submission
    #[serde(default = "default_root_nodes")]
    pub root_nodes: Vec<String>,

    /// Appended to an entity name to form its primary key field
    #[serde(default = "default_link_suffix")]
    pub link_suffix: String,

    /// Identifier field inside relationship objects
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// How the foreign key field is inferred
    #[serde(default)]
    pub strategy: StrategyKind,
}

/// Structural validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Treatment of the first error reported for each record
    #[serde(default)]
    pub leading_error: LeadingErrorPolicy,
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

impl OutputFormat {
    /// Serialize a value in this format
    pub fn render<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
            OutputFormat::Compact => serde_json::to_string(value),
        }
    }
}

// Default value functions
fn default_definitions_node() -> String {
    "_definitions.yaml".to_string()
}

fn default_terms_node() -> String {
    "_terms.yaml".to_string()
}

fn default_settings_node() -> String {
    "_settings.yaml".to_string()
}

fn default_version_field() -> String {
    "_dict_version".to_string()
}

fn default_excluded_nodes() -> Vec<String> {
    vec![
        "_definitions.yaml".to_string(),
        "_terms.yaml".to_string(),
        "_settings.yaml".to_string(),
        "program.yaml".to_string(),
    ]
}

fn default_aggregation_node() -> Option<String> {
    Some(AGGREGATION_NODE.to_string())
}

fn default_root_nodes() -> Vec<String> {
    vec!["subject".to_string()]
}

fn default_link_suffix() -> String {
    "s".to_string()
}

fn default_id_field() -> String {
    "submitter_id".to_string()
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            definitions_node: default_definitions_node(),
            terms_node: default_terms_node(),
            settings_node: default_settings_node(),
            version_field: default_version_field(),
            excluded_nodes: default_excluded_nodes(),
            aggregation_node: default_aggregation_node(),
        }
    }
}

impl SchemaSettings {
    /// Nodes that hold fragments or settings rather than an entity schema
    pub fn fragment_nodes(&self) -> [&str; 3] {
        [
            self.definitions_node.as_str(),
            self.terms_node.as_str(),
            self.settings_node.as_str(),
        ]
    }
}

impl Default for LinkageSettings {
    fn default() -> Self {
        Self {
            root_nodes: default_root_nodes(),
            link_suffix: default_link_suffix(),
            id_field: default_id_field(),
            strategy: StrategyKind::default(),
        }
    }
}

impl ValidatorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["validator.toml", ".validator.toml", "config/validator.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "gen3", "validator") {
            let xdg_config = config_dir.config_dir().join("validator.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (VALIDATOR__*)
        builder = builder.add_source(
            Environment::with_prefix("VALIDATOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("linkage.root_nodes")
                .with_list_parse_key("schema.excluded_nodes")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
