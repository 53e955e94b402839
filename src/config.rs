// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Full OpenFoodFacts export, tab separated and gzipped.
pub const DEFAULT_DATASET_URL: &str =
    "https://static.openfoodfacts.org/data/en.openfoodfacts.org.products.csv.gz";

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Settings for the extract stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Raw dump; `.gz` and `.zip` are decompressed on the fly.
    pub source: PathBuf,
    /// Filtered CSV, appended to.
    pub output: PathBuf,
    /// Rows per chunk read from the source.
    pub chunk_size: usize,
    /// Country names matched case-insensitively against `countries_tags`.
    pub countries: Vec<String>,
    /// Remove an existing output file before extracting.
    pub fresh: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("en.openfoodfacts.org.products.csv.gz"),
            output: PathBuf::from("products_clean.csv"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            countries: vec!["portugal".to_string(), "spain".to_string()],
            fresh: false,
        }
    }
}

/// Selects how the loader shapes rows before inserting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Rename, derive, validate and dedupe into the `Product` shape.
    #[default]
    Full,
    /// Insert CSV columns as-is and stamp an `AppMeta` row.
    Minimal,
}

/// Settings for the load stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub input: PathBuf,
    pub database: PathBuf,
    /// DDL script; the bundled `offline_schema.sql` is used when unset.
    pub schema: Option<PathBuf>,
    pub mode: LoadMode,
    /// Tag written to `AppMeta` in minimal mode. Defaults to today's date.
    pub bundle_version: Option<String>,
    pub schema_version: i64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("products_clean.csv"),
            database: PathBuf::from("db/nutriscore.db"),
            schema: None,
            mode: LoadMode::Full,
            bundle_version: None,
            schema_version: 1,
        }
    }
}

/// Settings for downloading the raw dump.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub url: String,
    pub dest: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATASET_URL.to_string(),
            dest: ExtractConfig::default().source,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub load: LoadConfig,
}

impl Config {
    /// Read a YAML config; missing sections and keys fall back to defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
