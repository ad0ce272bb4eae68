use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::category::RuleSet;

const CONFIG_FILE: &str = "camp_catalog";
const ENV_PREFIX: &str = "CAMP";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub description_max_chars: usize,
    pub long_description_max_chars: usize,
    pub short_description_max_chars: usize,
    pub preview_limit: usize,
    pub chunk_size: usize,
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("db_path", "data/catalog.sqlite")?
        .set_default("description_max_chars", 900)?
        .set_default("long_description_max_chars", 4000)?
        .set_default("short_description_max_chars", 750)?
        .set_default("preview_limit", 20)?
        .set_default("chunk_size", 500)
}

impl Settings {
    /// Defaults, then `camp_catalog.{toml,json,yaml}` if present, then `CAMP_*`.
    pub fn load() -> Result<Self, ConfigError> {
        with_defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Built-in camping rules unless `rules_path` points at a JSON rule file.
    pub fn load_rules(&self) -> Result<RuleSet> {
        match &self.rules_path {
            Some(path) => load_rule_file(path),
            None => Ok(RuleSet::default()),
        }
    }
}

pub fn load_rule_file(path: &Path) -> Result<RuleSet> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading rule file {}", path.display()))?;
    RuleSet::from_json(&json).with_context(|| format!("loading rules from {}", path.display()))
}
