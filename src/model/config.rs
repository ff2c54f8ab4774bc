use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::Criticality;
use super::Supplier;

const ENV_CONFIG_PATH: &str = "SUPPLIER_RISK_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Setting this to `1` or `true` forces golden evidence mode regardless of
/// the config file.
const ENV_GOLDEN_MODE: &str = "SUPPLIER_RISK_GOLDEN_MODE";

/// Configuration faults are the only fatal error class: a run never starts
/// on malformed weights or thresholds.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Global aggregation weights for the four criteria.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub c1_delivery: f64,
    pub c2_dependency: f64,
    pub c3_relationship: f64,
    pub c4_financial: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            c1_delivery: 0.20,
            c2_dependency: 0.15,
            c3_relationship: 0.15,
            c4_financial: 0.50,
        }
    }
}

/// (low, high) pair for the linear risk scale: <=low scores 0, >=high
/// scores 100, linear in between.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScalePair {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct C1Thresholds {
    pub delay_frequency: ScalePair,
    pub delay_severity: ScalePair,
    pub quality_incidents: ScalePair,
}

impl Default for C1Thresholds {
    fn default() -> Self {
        Self {
            delay_frequency: ScalePair { low: 2.0, high: 8.0 },
            delay_severity: ScalePair { low: 2.0, high: 7.0 },
            quality_incidents: ScalePair { low: 1.0, high: 5.0 },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct C2Thresholds {
    pub monosource_penalty: f64,
    pub criticality_scores: HashMap<Criticality, f64>,
}

impl Default for C2Thresholds {
    fn default() -> Self {
        let mut criticality_scores = HashMap::new();
        criticality_scores.insert(Criticality::Low, 10.0);
        criticality_scores.insert(Criticality::Medium, 40.0);
        criticality_scores.insert(Criticality::High, 70.0);
        criticality_scores.insert(Criticality::Critical, 90.0);
        Self {
            monosource_penalty: 50.0,
            criticality_scores,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct C3Thresholds {
    pub contract_maturity_years: ScalePair,
    /// Risk score by litigation count; counts beyond the largest key are
    /// clamped to it.
    pub litigation_scores: BTreeMap<u32, f64>,
}

impl Default for C3Thresholds {
    fn default() -> Self {
        let mut litigation_scores = BTreeMap::new();
        litigation_scores.insert(0, 0.0);
        litigation_scores.insert(1, 40.0);
        litigation_scores.insert(2, 60.0);
        litigation_scores.insert(3, 75.0);
        Self {
            contract_maturity_years: ScalePair {
                low: 3.0,
                high: 10.0,
            },
            litigation_scores,
        }
    }
}

/// Global score cutoffs for risk classification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskLevelCutoffs {
    pub high: i32,
    pub medium: i32,
}

impl Default for RiskLevelCutoffs {
    fn default() -> Self {
        Self { high: 70, medium: 55 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub c1: C1Thresholds,
    pub c2: C2Thresholds,
    pub c3: C3Thresholds,
    pub risk_levels: RiskLevelCutoffs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Minimum global score increase over `lookback_days` that fires a
    /// velocity alert.
    pub score_delta_threshold: i32,
    pub lookback_days: u32,
    pub critical_drivers: Vec<String>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            score_delta_threshold: 15,
            lookback_days: 7,
            critical_drivers: vec![
                "PAYMENT_DEFAULT".to_string(),
                "INSOLVENCY".to_string(),
                "BANKRUPTCY".to_string(),
                "LIQUIDATION".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllowedDomain {
    pub domain: String,
    pub rate_limit_rpm: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub respect_robots_txt: bool,
    /// Bound on the wait for a rate-limit token.
    pub rate_limit_wait_seconds: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            max_retries: 3,
            backoff_factor: 2.0,
            respect_robots_txt: true,
            rate_limit_wait_seconds: 60,
        }
    }
}

/// Domain allowlist with per-domain rate limits. Fetches outside the
/// allowlist are refused, never retried.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AllowlistConfig {
    pub user_agent: String,
    pub default_rate_limit_rpm: u32,
    pub domains: Vec<AllowedDomain>,
    pub settings: FetchSettings,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            user_agent: "supplier-risk-agent/0.1".to_string(),
            default_rate_limit_rpm: 4,
            domains: Vec::new(),
            settings: FetchSettings::default(),
        }
    }
}

impl AllowlistConfig {
    pub fn is_domain_allowed(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.domains.iter().any(|d| d.domain.to_lowercase() == domain)
    }

    pub fn rate_limit_for(&self, domain: &str) -> u32 {
        let domain = domain.to_lowercase();
        self.domains
            .iter()
            .find(|d| d.domain.to_lowercase() == domain)
            .and_then(|d| d.rate_limit_rpm)
            .unwrap_or(self.default_rate_limit_rpm)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Suppliers processed concurrently.
    pub concurrency: usize,
    /// Per-supplier wall-clock budget; expiry is recorded as a failure for
    /// that supplier only.
    pub supplier_timeout_seconds: u64,
    pub max_llm_retries: u32,
    pub cache_dir: String,
    pub cache_ttl_hours: u64,
    pub output_dir: String,
    /// "log" or "file".
    pub alert_mode: String,
    /// When set, evidence is read from local golden fixture files instead
    /// of the web gateway.
    pub golden_mode: bool,
    pub golden_dir: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            supplier_timeout_seconds: 180,
            max_llm_retries: 2,
            cache_dir: "./cache/web".to_string(),
            cache_ttl_hours: 24,
            output_dir: "./output".to_string(),
            alert_mode: "log".to_string(),
            golden_mode: false,
            golden_dir: "./golden".to_string(),
        }
    }
}

/// Application configuration, loaded from a YAML file named by
/// SUPPLIER_RISK_CONFIG_PATH (default `config.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weights: Weights,
    pub thresholds: Thresholds,
    pub alerting: AlertPolicy,
    pub allowlist: AllowlistConfig,
    pub pipeline: PipelineSettings,
}

impl Config {
    /// Load configuration from the environment-selected YAML file.
    ///
    /// A missing file yields the built-in defaults; an unreadable or
    /// unparseable file, or invalid values, are fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;
        if std::env::var(ENV_GOLDEN_MODE).is_ok_and(|v| flag_enabled(&v)) {
            tracing::info!("Golden evidence mode forced by environment");
            config.pipeline.golden_mode = true;
        }
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_string(),
                source: e,
            })?;
            if contents.trim().is_empty() {
                tracing::debug!(path = %path, "Config file is empty, using defaults");
                Config::default()
            } else {
                let config: Config =
                    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                        path: path.to_string(),
                        source: e,
                    })?;
                tracing::info!(path = %path, "Loaded configuration from file");
                config
            }
        } else {
            tracing::debug!(path = %path, "Config file not found, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject malformed weights and thresholds before any supplier is
    /// processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("weights.c1_delivery", w.c1_delivery),
            ("weights.c2_dependency", w.c2_dependency),
            ("weights.c3_relationship", w.c3_relationship),
            ("weights.c4_financial", w.c4_financial),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let t = &self.thresholds;
        for (name, pair) in [
            ("thresholds.c1.delay_frequency", t.c1.delay_frequency),
            ("thresholds.c1.delay_severity", t.c1.delay_severity),
            ("thresholds.c1.quality_incidents", t.c1.quality_incidents),
            (
                "thresholds.c3.contract_maturity_years",
                t.c3.contract_maturity_years,
            ),
        ] {
            if pair.low >= pair.high {
                return Err(ConfigError::Invalid(format!(
                    "{}: low ({}) must be below high ({})",
                    name, pair.low, pair.high
                )));
            }
        }

        if t.risk_levels.medium > t.risk_levels.high {
            return Err(ConfigError::Invalid(format!(
                "thresholds.risk_levels: medium ({}) must not exceed high ({})",
                t.risk_levels.medium, t.risk_levels.high
            )));
        }

        let s = &self.allowlist.settings;
        if s.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "allowlist.settings.backoff_factor must be >= 1.0, got {}",
                s.backoff_factor
            )));
        }
        if s.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "allowlist.settings.max_retries must be at least 1".to_string(),
            ));
        }
        if self.allowlist.default_rate_limit_rpm == 0 {
            return Err(ConfigError::Invalid(
                "allowlist.default_rate_limit_rpm must be at least 1".to_string(),
            ));
        }

        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn flag_enabled(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True")
}

#[derive(Debug, Deserialize)]
struct SupplierRoster {
    #[serde(default)]
    suppliers: Vec<Supplier>,
}

/// Load the supplier roster from a YAML file.
pub fn load_suppliers(path: &str) -> Result<Vec<Supplier>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string(),
        source: e,
    })?;
    let roster: SupplierRoster =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            source: e,
        })?;
    tracing::info!(path = %path, count = roster.suppliers.len(), "Loaded supplier roster");
    Ok(roster.suppliers)
}
