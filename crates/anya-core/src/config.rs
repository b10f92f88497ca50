//! Engine configuration
//!
//! Loads thresholds, windows and the keyword table from TOML:
//! 1. An explicit path (`--config`), if given
//! 2. User override at `~/.local/share/anya/config/anya.toml`
//! 3. Embedded defaults (`config/anya.toml` at the repo root)
//!
//! Keys missing from an override keep the built-in values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::categories::{KeywordRule, KeywordTable};
use crate::error::{Error, Result};
use crate::models::Category;
use crate::money::{self, DEFAULT_CURRENCY};
use crate::period::DEFAULT_TZ;

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../config/anya.toml");

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Proposals below this confidence are returned as ambiguous
    pub confidence_threshold: f64,
    /// How many recent categories feed the history fallback
    pub history_limit: usize,
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// spent/limit at which a budget moves to WARNING
    pub warning_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct InterventionConfig {
    pub soft_threshold: f64,
    pub hard_threshold: f64,
    pub dedupe_window: chrono::Duration,
    pub abandon_window: chrono::Duration,
    /// Category assumed for merchants the keyword table does not know
    pub default_category: Category,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_currency: String,
    pub default_timezone: Tz,
    pub interpreter: InterpreterConfig,
    pub budget: BudgetConfig,
    pub intervention: InterventionConfig,
    /// Upper bound on one AI categorization call
    pub ai_timeout: Duration,
    pub keywords: KeywordTable,
}

impl EngineConfig {
    /// Hard-coded values used beneath any TOML layer
    fn baseline() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            default_timezone: DEFAULT_TZ,
            interpreter: InterpreterConfig {
                confidence_threshold: 0.6,
                history_limit: 20,
            },
            budget: BudgetConfig { warning_ratio: 0.8 },
            intervention: InterventionConfig {
                soft_threshold: 0.1,
                hard_threshold: 0.5,
                dedupe_window: chrono::Duration::minutes(30),
                abandon_window: chrono::Duration::hours(24),
                default_category: Category::Shopping,
            },
            ai_timeout: Duration::from_millis(3000),
            keywords: KeywordTable::empty(Category::Uncategorized),
        }
    }

    /// Load from the user override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document layered over the embedded defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let base = parse_config(DEFAULT_CONFIG, Self::baseline())?;
        parse_config(content, base)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        parse_config(DEFAULT_CONFIG, Self::baseline()).unwrap_or_else(|e| {
            warn!(error = %e, "Embedded config failed to parse, using built-in thresholds");
            Self::baseline()
        })
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("anya").join("config").join("anya.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let override_path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    match override_path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config override");
            let content = fs::read_to_string(&path)?;
            EngineConfig::from_toml(&content)
        }
        None => parse_config(DEFAULT_CONFIG, EngineConfig::baseline()),
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    user: Option<RawUser>,
    interpreter: Option<RawInterpreter>,
    budget: Option<RawBudget>,
    intervention: Option<RawIntervention>,
    ai: Option<RawAi>,
    keywords: Option<RawKeywords>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    currency: Option<String>,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInterpreter {
    confidence_threshold: Option<f64>,
    history_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawBudget {
    warning_ratio: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawIntervention {
    soft_threshold: Option<f64>,
    hard_threshold: Option<f64>,
    dedupe_window_minutes: Option<i64>,
    abandon_window_hours: Option<i64>,
    default_category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAi {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawKeywords {
    version: Option<u32>,
    default: Option<String>,
    rules: Option<Vec<RawRule>>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    category: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    merchants: Vec<String>,
}

fn parse_category(value: &str, field: &str) -> Result<Category> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", field, e)))
}

/// Parse config from TOML content on top of `config`
fn parse_config(content: &str, mut config: EngineConfig) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    if let Some(user) = raw.user {
        if let Some(currency) = user.currency {
            if !money::is_currency_code(&currency) {
                return Err(Error::Config(format!("Invalid currency code: {}", currency)));
            }
            config.default_currency = currency.to_uppercase();
        }
        if let Some(tz) = user.timezone {
            config.default_timezone = tz
                .parse()
                .map_err(|_| Error::Config(format!("Unknown timezone: {}", tz)))?;
        }
    }

    if let Some(interp) = raw.interpreter {
        if let Some(threshold) = interp.confidence_threshold {
            config.interpreter.confidence_threshold = threshold;
        }
        if let Some(limit) = interp.history_limit {
            config.interpreter.history_limit = limit;
        }
    }

    if let Some(budget) = raw.budget {
        if let Some(ratio) = budget.warning_ratio {
            config.budget.warning_ratio = ratio;
        }
    }

    if let Some(iv) = raw.intervention {
        if let Some(soft) = iv.soft_threshold {
            config.intervention.soft_threshold = soft;
        }
        if let Some(hard) = iv.hard_threshold {
            config.intervention.hard_threshold = hard;
        }
        if let Some(minutes) = iv.dedupe_window_minutes {
            config.intervention.dedupe_window = chrono::Duration::minutes(minutes);
        }
        if let Some(hours) = iv.abandon_window_hours {
            config.intervention.abandon_window = chrono::Duration::hours(hours);
        }
        if let Some(category) = iv.default_category {
            config.intervention.default_category =
                parse_category(&category, "intervention.default_category")?;
        }
    }

    if let Some(ai) = raw.ai {
        if let Some(ms) = ai.timeout_ms {
            config.ai_timeout = Duration::from_millis(ms);
        }
    }

    if let Some(kw) = raw.keywords {
        let default = match kw.default {
            Some(d) => parse_category(&d, "keywords.default")?,
            None => config.keywords.default.clone(),
        };
        let version = kw.version.unwrap_or(config.keywords.version);
        let rules = match kw.rules {
            Some(raw_rules) => raw_rules
                .into_iter()
                .map(|r| {
                    Ok(KeywordRule {
                        category: parse_category(&r.category, "keywords.rules.category")?,
                        keywords: r.keywords,
                        merchants: r.merchants,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => config.keywords.rules().to_vec(),
        };
        config.keywords = KeywordTable::new(version, default, rules);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<()> {
    let c = &config.interpreter.confidence_threshold;
    if !(0.0..=1.0).contains(c) {
        return Err(Error::Config(format!(
            "interpreter.confidence_threshold must be within [0, 1], got {}",
            c
        )));
    }
    let iv = &config.intervention;
    if !(iv.soft_threshold >= 0.0 && iv.soft_threshold < iv.hard_threshold) {
        return Err(Error::Config(format!(
            "intervention thresholds must satisfy 0 <= soft < hard (soft={}, hard={})",
            iv.soft_threshold, iv.hard_threshold
        )));
    }
    if iv.dedupe_window < chrono::Duration::zero() || iv.abandon_window <= chrono::Duration::zero()
    {
        return Err(Error::Config("intervention windows must be positive".into()));
    }
    if !(config.budget.warning_ratio > 0.0 && config.budget.warning_ratio <= 1.0) {
        return Err(Error::Config(format!(
            "budget.warning_ratio must be within (0, 1], got {}",
            config.budget.warning_ratio
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let config = parse_config(DEFAULT_CONFIG, EngineConfig::baseline()).unwrap();
        assert_eq!(config.default_currency, "INR");
        assert_eq!(config.default_timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(config.interpreter.confidence_threshold, 0.6);
        assert_eq!(config.intervention.dedupe_window, chrono::Duration::minutes(30));
        assert_eq!(config.keywords.default, Category::Uncategorized);
        assert!(config.keywords.version >= 1);
        assert!(!config.keywords.rules().is_empty());
    }

    #[test]
    fn test_override_keeps_unspecified_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [intervention]
            hard_threshold = 0.75
            "#,
        )
        .unwrap();
        assert_eq!(config.intervention.hard_threshold, 0.75);
        assert_eq!(config.intervention.soft_threshold, 0.1);
        assert_eq!(
            config.keywords.match_text("coffee").unwrap().category,
            Category::Dining
        );
    }

    #[test]
    fn test_override_replaces_keyword_rules() {
        let config = EngineConfig::from_toml(
            r#"
            [keywords]
            version = 7
            [[keywords.rules]]
            category = "pets"
            keywords = ["kibble"]
            "#,
        )
        .unwrap();
        assert_eq!(config.keywords.version, 7);
        assert_eq!(
            config.keywords.match_text("bought kibble").unwrap().category,
            Category::Custom("pets".to_string())
        );
        assert!(config.keywords.match_text("coffee").is_none());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = EngineConfig::from_toml(
            r#"
            [intervention]
            soft_threshold = 0.6
            hard_threshold = 0.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(EngineConfig::from_toml("[user]\ntimezone = \"Mars/Olympus\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ai]\ntimeout_ms = 250").unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.ai_timeout, Duration::from_millis(250));

        assert!(EngineConfig::load_from(Path::new("/nonexistent/anya.toml")).is_err());
    }
}
