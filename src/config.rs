use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::TallyError;

pub const DEFAULT_CONFIG_FILE: &str = "orgtally.json";
pub const DEFAULT_CACHE_PATH: &str = "data/orgname_2021_4";
pub const DEFAULT_TABLE_NAME: &str = "sid_tax_orgname";
pub const DEFAULT_OUTPUT_PATH: &str = "data/population.json";
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi?db=nuccore&id={}&rettype=fasta&retmode=xml";
const DEFAULT_RETRY_DELAY_MS: u64 = 200;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub output_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub remote_endpoint_template: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub cache_path: Utf8PathBuf,
    pub table_name: String,
    pub output_path: Utf8PathBuf,
    pub remote_endpoint_template: String,
    pub timeout_secs: Option<u64>,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            cache_path: Utf8PathBuf::from(DEFAULT_CACHE_PATH),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            output_path: Utf8PathBuf::from(DEFAULT_OUTPUT_PATH),
            remote_endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
            timeout_secs: None,
            max_retries: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `orgtally.json` in the working
    /// directory is read when present and defaults apply otherwise.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TallyError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| TallyError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TallyError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TallyError> {
        let defaults = ResolvedConfig::default();

        let table_name = config.table_name.unwrap_or(defaults.table_name);
        validate_table_name(&table_name)?;

        let remote_endpoint_template = config
            .remote_endpoint_template
            .unwrap_or(defaults.remote_endpoint_template);
        if remote_endpoint_template.matches("{}").count() != 1 {
            return Err(TallyError::InvalidConfig(format!(
                "remote_endpoint_template must contain exactly one {{}} placeholder: {remote_endpoint_template}"
            )));
        }

        Ok(ResolvedConfig {
            cache_path: config.cache_path.unwrap_or(defaults.cache_path),
            table_name,
            output_path: config.output_path.unwrap_or(defaults.output_path),
            remote_endpoint_template,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            retry_delay_ms: config.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        })
    }
}

// Table names are spliced into SQL text, so only plain identifiers are allowed.
fn validate_table_name(name: &str) -> Result<(), TallyError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|ch| ch.is_ascii_alphabetic() || ch == '_')
        .unwrap_or(false);
    if !valid_head || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(TallyError::InvalidConfig(format!(
            "table_name must be a plain SQL identifier: {name:?}"
        )));
    }
    Ok(())
}
