//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`PAPERMATE_API_KEY`, `PAPERMATE_BASE_URL`,
//!    `PAPERMATE_MODEL`, `PAPERMATE_API_TIMEOUT_SECS`, `PAPERMATE_MAX_RETRIES`,
//!    `PAPERMATE_MAX_TOOL_ROUNDS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./papermate.toml in the current directory
//! 4. $XDG_CONFIG_HOME/papermate/papermate.toml (or ~/.config/papermate/papermate.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

mod defaults;
mod types;

use defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use types::{
    AgentConfig, ApiConfig, ChatConfig, Config, Locale, ProgressConfig, ToolsConfig,
};

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Where the effective config text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local,
    Global(PathBuf),
    BuiltInDefaults,
}

/// A resolved config plus the file it was read from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) = read_config_text(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&config_text)?;
    resolve_api_key(&mut config, &env_lookup);
    apply_env_overrides(&mut config, &env_lookup)?;
    validate(&config)?;
    Ok(LoadedConfig { config, source })
}

fn read_config_text<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<(String, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(p) = path_override {
        let path = PathBuf::from(p);
        let text = read_file(&path)?;
        return Ok((text, ConfigSource::Explicit(path)));
    }

    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok((text, ConfigSource::Local));
    }
    if let Some(dir) = config_root() {
        let global = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            return Ok((text, ConfigSource::Global(global)));
        }
    }

    Ok((String::new(), ConfigSource::BuiltInDefaults))
}

/// Fill an empty inline key from `api_key_env`.
fn resolve_api_key<FEnv>(config: &mut Config, env_lookup: &FEnv)
where
    FEnv: Fn(&str) -> Option<String>,
{
    if normalized_string(&config.api.api_key).is_some() {
        return;
    }
    if let Some(var) = config.api.api_key_env.as_deref().and_then(normalized_string) {
        if let Some(key) = env_lookup(&var).and_then(|v| normalized_string(&v)) {
            config.api.api_key = key;
        }
    }
}

fn apply_env_overrides<FEnv>(config: &mut Config, env_lookup: &FEnv) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(key) = env_lookup("PAPERMATE_API_KEY").and_then(|v| normalized_string(&v)) {
        config.api.api_key = key;
    }
    if let Some(url) = env_lookup("PAPERMATE_BASE_URL").and_then(|v| normalized_string(&v)) {
        config.api.base_url = url;
    }
    if let Some(model) = env_lookup("PAPERMATE_MODEL").and_then(|v| normalized_string(&v)) {
        config.api.model = model;
    }
    if let Some(raw) = env_lookup("PAPERMATE_API_TIMEOUT_SECS") {
        config.api.timeout_secs = parse_env_number::<u64>("PAPERMATE_API_TIMEOUT_SECS", &raw)?.max(1);
    }
    if let Some(raw) = env_lookup("PAPERMATE_MAX_RETRIES") {
        config.api.max_retries = parse_env_number::<u32>("PAPERMATE_MAX_RETRIES", &raw)?;
    }
    if let Some(raw) = env_lookup("PAPERMATE_MAX_TOOL_ROUNDS") {
        config.chat.max_tool_rounds =
            parse_env_number::<usize>("PAPERMATE_MAX_TOOL_ROUNDS", &raw)?;
    }
    Ok(())
}

fn parse_env_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| {
        ConfigError::Invalid(format!(
            "invalid {name} value `{raw}`: expected a non-negative integer"
        ))
    })
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if normalized_string(&config.api.base_url).is_none() {
        return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
    }
    if normalized_string(&config.api.model).is_none() {
        return Err(ConfigError::Invalid("api.model must not be empty".into()));
    }
    if config.agent.max_steps == 0 {
        return Err(ConfigError::Invalid("agent.max_steps must be at least 1".into()));
    }
    if config.chat.max_tool_rounds == 0 {
        return Err(ConfigError::Invalid(
            "chat.max_tool_rounds must be at least 1".into(),
        ));
    }
    if config.progress.queue_capacity == 0 {
        return Err(ConfigError::Invalid(
            "progress.queue_capacity must be at least 1".into(),
        ));
    }
    Ok(())
}

fn normalized_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn config_root_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .or_else(dirs::config_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
