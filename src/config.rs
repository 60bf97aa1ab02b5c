use crate::history::{DEFAULT_MAX_LOOKBACK, DEFAULT_TRIGGER, HistoryOptions, Lookback};
use crate::JuiceError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "JUICE_";

#[derive(Debug, Deserialize, Clone)]
pub struct JuiceConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub include_outputs: bool,
    #[serde(default = "default_trigger")]
    pub trigger: String,
    #[serde(default)]
    pub lookback: LookbackConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for JuiceConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            include_outputs: false,
            trigger: default_trigger(),
            lookback: LookbackConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookbackConfig {
    #[serde(default)]
    pub policy: LookbackPolicy,
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
}

impl Default for LookbackConfig {
    fn default() -> Self {
        Self {
            policy: LookbackPolicy::default(),
            max_cells: default_max_cells(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LookbackPolicy {
    #[default]
    Bounded,
    Unbounded,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "openai:gpt-4o".into()
}

fn default_trigger() -> String {
    DEFAULT_TRIGGER.into()
}

fn default_max_cells() -> usize {
    DEFAULT_MAX_LOOKBACK
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

fn default_timeout() -> u64 {
    120
}

impl JuiceConfig {
    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            trigger: self.trigger.clone(),
            lookback: match self.lookback.policy {
                LookbackPolicy::Bounded => Lookback::Bounded(self.lookback.max_cells),
                LookbackPolicy::Unbounded => Lookback::Unbounded,
            },
            include_outputs: self.include_outputs,
        }
    }
}

/// Load config from JUICE_CONFIG, ~/.juice/config.toml, or defaults, then
/// apply JUICE_* environment overrides.
pub fn load_config() -> Result<JuiceConfig, JuiceError> {
    let mut config = match config_path() {
        Some(p) if p.exists() => read_config_file(&p)?,
        _ => JuiceConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<JuiceConfig, JuiceError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| JuiceError::Config(format!("{}: {e}", path.display())))
}

fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("JUICE_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let home = std::env::var("HOME").ok()?;
    Some(Path::new(&home).join(".juice").join("config.toml"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, JuiceError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(JuiceError::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

/// Overrides read through `lookup` so tests need not touch the process env.
pub fn apply_env_overrides(
    config: &mut JuiceConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), JuiceError> {
    let var = |name: &str| {
        let key = format!("{ENV_PREFIX}{name}");
        lookup(&key).map(|v| (key, v))
    };

    if let Some((_, v)) = var("MODEL") {
        config.model = v;
    }
    if let Some((key, v)) = var("INCLUDE_OUTPUTS") {
        config.include_outputs = parse_bool(&key, &v)?;
    }
    if let Some((key, v)) = var("LOOKBACK") {
        config.lookback.policy = match v.trim().to_ascii_lowercase().as_str() {
            "bounded" => LookbackPolicy::Bounded,
            "unbounded" => LookbackPolicy::Unbounded,
            other => {
                return Err(JuiceError::Config(format!(
                    "{key}: expected bounded or unbounded, got {other:?}"
                )));
            }
        };
    }
    if let Some((key, v)) = var("MAX_LOOKBACK") {
        config.lookback.max_cells = v
            .trim()
            .parse()
            .map_err(|e| JuiceError::Config(format!("{key}: {e}")))?;
    }
    Ok(())
}

pub fn validate_config(config: &JuiceConfig) -> Result<(), JuiceError> {
    if config.trigger.trim().is_empty() {
        return Err(JuiceError::Config("trigger must not be empty".into()));
    }
    if config.lookback.policy == LookbackPolicy::Bounded && config.lookback.max_cells == 0 {
        return Err(JuiceError::Config(
            "lookback.max_cells must be positive for the bounded policy".into(),
        ));
    }
    if config.model.trim().is_empty() {
        return Err(JuiceError::Config("model must not be empty".into()));
    }
    Ok(())
}
