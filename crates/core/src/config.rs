use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ledgerscan_llm::{
    GatewayConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS,
};
use secrecy::SecretString;
use serde::Deserialize;

use crate::cache::DEFAULT_HIT_DELAY_MS;
use crate::error::{LedgerError, Result};
use crate::report::NarrativeSource;

pub const DEFAULT_CONFIG_FILE: &str = "ledgerscan.toml";
pub const DEFAULT_CACHE_ROOT: &str = "./data/cache";
pub const DEFAULT_EXTRACT_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_QUERY_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_REPORT_MAX_TOKENS: u32 = 1500;

pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_CONFIG: &str = "LEDGERSCAN_CONFIG";
pub const ENV_ENDPOINT: &str = "LEDGERSCAN_ENDPOINT";
pub const ENV_MODEL: &str = "LEDGERSCAN_MODEL";
pub const ENV_CACHE_DIR: &str = "LEDGERSCAN_CACHE_DIR";
pub const ENV_CACHE_HIT_DELAY_MS: &str = "LEDGERSCAN_CACHE_HIT_DELAY_MS";
pub const ENV_NARRATIVE: &str = "LEDGERSCAN_NARRATIVE";

/// On-disk layout of `ledgerscan.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub root: Option<PathBuf>,
    pub hit_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    pub extract_max_tokens: Option<u32>,
    pub query_max_tokens: Option<u32>,
    pub report_max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSection {
    pub narrative: Option<NarrativeSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub hit_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSettings {
    pub extract_max_tokens: u32,
    pub query_max_tokens: u32,
    pub report_max_tokens: u32,
    pub narrative: NarrativeSource,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            extract_max_tokens: DEFAULT_EXTRACT_MAX_TOKENS,
            query_max_tokens: DEFAULT_QUERY_MAX_TOKENS,
            report_max_tokens: DEFAULT_REPORT_MAX_TOKENS,
            narrative: NarrativeSource::Template,
        }
    }
}

/// Everything the process needs, resolved once at startup and handed to
/// constructors from there on.
#[derive(Debug)]
pub struct LedgerConfig {
    pub gateway: GatewayConfig,
    pub cache: CacheConfig,
    pub settings: LedgerSettings,
}

impl LedgerConfig {
    /// Reads the TOML file (explicit path, then `LEDGERSCAN_CONFIG`, then
    /// `ledgerscan.toml` if present) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(ENV_CONFIG).ok().map(PathBuf::from));
        let file = match explicit {
            Some(path) => read_file_config(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    read_file_config(default)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::from_sources(file, |name| env::var(name).ok())
    }

    /// Merges file settings with variables looked up through `lookup`.
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(ENV_API_KEY).map(SecretString::new);
        let endpoint = non_empty(ENV_ENDPOINT)
            .or(file.gateway.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = non_empty(ENV_MODEL)
            .or(file.gateway.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = file.gateway.temperature.or(Some(DEFAULT_TEMPERATURE));
        let timeout_secs = file.gateway.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let root = non_empty(ENV_CACHE_DIR)
            .map(PathBuf::from)
            .or(file.cache.root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT));
        let hit_delay_ms = match non_empty(ENV_CACHE_HIT_DELAY_MS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                LedgerError::Config(format!("{ENV_CACHE_HIT_DELAY_MS} must be an integer, got {raw:?}"))
            })?,
            None => file.cache.hit_delay_ms.unwrap_or(DEFAULT_HIT_DELAY_MS),
        };

        let narrative = match non_empty(ENV_NARRATIVE) {
            Some(raw) => NarrativeSource::from_str(&raw).ok_or_else(|| {
                LedgerError::Config(format!("unknown narrative source {raw:?}"))
            })?,
            None => file.report.narrative.unwrap_or_default(),
        };
        let defaults = LedgerSettings::default();
        let settings = LedgerSettings {
            extract_max_tokens: file
                .limits
                .extract_max_tokens
                .unwrap_or(defaults.extract_max_tokens),
            query_max_tokens: file
                .limits
                .query_max_tokens
                .unwrap_or(defaults.query_max_tokens),
            report_max_tokens: file
                .limits
                .report_max_tokens
                .unwrap_or(defaults.report_max_tokens),
            narrative,
        };

        Ok(Self {
            gateway: GatewayConfig {
                endpoint,
                model,
                api_key,
                temperature,
                timeout: Duration::from_secs(timeout_secs),
            },
            cache: CacheConfig {
                root,
                hit_delay: Duration::from_millis(hit_delay_ms),
            },
            settings,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path).map_err(|err| {
        LedgerError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;
    Ok(toml::from_str(&raw)?)
}
