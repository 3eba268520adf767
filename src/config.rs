//! Input and output locations for a pipeline run.
//!
//! Values come from CLI flags first, then `PRICEPULSE_*` environment
//! variables (a `.env` file is loaded by the binary), then defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::country::CountrySchema;

pub const RAW_DIR_ENV: &str = "PRICEPULSE_RAW_DIR";
pub const PROCESSED_DIR_ENV: &str = "PRICEPULSE_PROCESSED_DIR";

const DEFAULT_RAW_DIR: &str = "data_sources/raw";
const DEFAULT_PROCESSED_DIR: &str = "data_sources/processed";
const DEFAULT_CONCURRENCY: usize = 4;

pub const UNIFIED_FILE_NAME: &str = "unified_prices.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Per-country locator overrides, keyed by upper-case country code.
    pub sources: HashMap<String, String>,
    /// Maximum number of countries loaded and cleaned at once.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from(DEFAULT_RAW_DIR),
            processed_dir: PathBuf::from(DEFAULT_PROCESSED_DIR),
            sources: HashMap::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with any `PRICEPULSE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(RAW_DIR_ENV) {
            config.raw_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(PROCESSED_DIR_ENV) {
            config.processed_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_raw_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.raw_dir = dir;
        }
        self
    }

    pub fn with_processed_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.processed_dir = dir;
        }
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = (String, String)>) -> Self {
        for (code, locator) in sources {
            self.sources.insert(code.to_ascii_uppercase(), locator);
        }
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Locator of a country's raw extract: an override, or the published
    /// file name under `raw_dir`.
    pub fn source_for(&self, schema: &CountrySchema) -> String {
        self.sources.get(schema.code).cloned().unwrap_or_else(|| {
            self.raw_dir
                .join(schema.raw_file_name())
                .display()
                .to_string()
        })
    }

    pub fn clean_output_for(&self, schema: &CountrySchema) -> PathBuf {
        self.processed_dir.join(schema.clean_file_name())
    }

    pub fn unified_output(&self) -> PathBuf {
        self.processed_dir.join(UNIFIED_FILE_NAME)
    }
}

/// Parses a `CODE=LOCATOR` override as given on the command line.
pub fn parse_source_override(s: &str) -> Result<(String, String), String> {
    let (code, locator) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=LOCATOR, got `{s}`"))?;
    let code = code.trim();
    let locator = locator.trim();
    if code.is_empty() || locator.is_empty() {
        return Err(format!("expected CODE=LOCATOR, got `{s}`"));
    }
    Ok((code.to_ascii_uppercase(), locator.to_string()))
}
