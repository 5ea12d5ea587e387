use crate::error::{LoftError, Result};
use crate::save_queue::SaveSettings;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILENAME: &str = "config.json";

pub const KEYS: &[&str] = &[
    "dark-mode",
    "auto-format",
    "font-size",
    "debounce-ms",
    "autosave-interval-secs",
    "max-retries",
    "history-limit",
];

/// Preferences and autosave tuning, stored in .codeloft/config.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoftConfig {
    #[serde(default)]
    pub dark_mode: bool,

    /// Reformat files when they are saved
    #[serde(default = "default_true")]
    pub auto_format: bool,

    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Quiet period before pending saves are flushed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Flush pending saves at least this often while edits keep coming
    #[serde(default = "default_interval")]
    pub autosave_interval_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Saved versions kept per file for undo and diff
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_font_size() -> u32 {
    14
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_interval() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_history_limit() -> usize {
    10
}

impl Default for LoftConfig {
    fn default() -> Self {
        Self {
            dark_mode: false,
            auto_format: default_true(),
            font_size: default_font_size(),
            debounce_ms: default_debounce_ms(),
            autosave_interval_secs: default_interval(),
            max_retries: default_max_retries(),
            history_limit: default_history_limit(),
        }
    }
}

impl LoftConfig {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(LoftError::Io)?;
        let config: LoftConfig =
            serde_json::from_str(&content).map_err(LoftError::Serialization)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).map_err(LoftError::Io)?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);
        let content = serde_json::to_string_pretty(self).map_err(LoftError::Serialization)?;
        fs::write(config_path, content).map_err(LoftError::Io)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "dark-mode" => self.dark_mode.to_string(),
            "auto-format" => self.auto_format.to_string(),
            "font-size" => self.font_size.to_string(),
            "debounce-ms" => self.debounce_ms.to_string(),
            "autosave-interval-secs" => self.autosave_interval_secs.to_string(),
            "max-retries" => self.max_retries.to_string(),
            "history-limit" => self.history_limit.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "dark-mode" => self.dark_mode = parse_bool(key, value)?,
            "auto-format" => self.auto_format = parse_bool(key, value)?,
            "font-size" => self.font_size = parse_in_range(key, value, 8, 72)?,
            "debounce-ms" => self.debounce_ms = parse_in_range(key, value, 0, 60_000)?,
            "autosave-interval-secs" => {
                self.autosave_interval_secs = parse_in_range(key, value, 1, 3600)?
            }
            "max-retries" => self.max_retries = parse_in_range(key, value, 1, 100)?,
            "history-limit" => self.history_limit = parse_in_range(key, value, 1, 1000)?,
            _ => return Err(LoftError::Config(format!("Unknown config key: {}", key))),
        }
        Ok(())
    }

    pub fn save_settings(&self) -> SaveSettings {
        SaveSettings {
            debounce: Duration::milliseconds(self.debounce_ms as i64),
            interval: Duration::seconds(self.autosave_interval_secs as i64),
            max_retries: self.max_retries,
            history_limit: self.history_limit,
            auto_format: self.auto_format,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(LoftError::Config(format!(
            "{} expects true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_in_range<T>(key: &str, value: &str, min: T, max: T) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| LoftError::Config(format!("{} expects a number, got '{}'", key, value)))?;
    if parsed < min || parsed > max {
        return Err(LoftError::Config(format!(
            "{} must be between {} and {}",
            key, min, max
        )));
    }
    Ok(parsed)
}
