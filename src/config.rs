//! Player configuration with persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mplayer::{CallDefaults, Value};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to access config file: {0}")]
  Io(#[from] io::Error),
  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("{0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub mplayer_path: Option<String>,

  /// Additional MPlayer command-line arguments.
  #[serde(default)]
  pub mplayer_args: Vec<String>,

  /// Prefix written before every command, e.g. `pausing_keep`.
  #[serde(default)]
  pub response_prefix: String,

  /// Result of a query that cannot be answered.
  #[serde(default)]
  pub default_value: Value,

  /// How long `stop` waits for the supervisor loop, in milliseconds.
  #[serde(default = "default_stop_timeout_ms")]
  pub stop_timeout_ms: u64,
}

fn default_stop_timeout_ms() -> u64 {
  2000
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      mplayer_path: None,
      mplayer_args: Vec::new(),
      response_prefix: String::new(),
      default_value: Value::Null,
      stop_timeout_ms: default_stop_timeout_ms(),
    }
  }
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(path) = &self.mplayer_path {
      if path.trim().is_empty() {
        return Err("MPlayer path cannot be blank".to_string());
      }
    }
    if self.response_prefix.contains(char::is_whitespace) {
      return Err("Response prefix must be a single word".to_string());
    }
    if self.stop_timeout_ms < 1 || self.stop_timeout_ms > 60_000 {
      return Err("Stop timeout must be between 1 and 60000 milliseconds".to_string());
    }
    Ok(())
  }

  /// Configured executable, if any.
  pub fn mplayer_path(&self) -> Option<PathBuf> {
    self
      .mplayer_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
  }

  pub fn call_defaults(&self) -> CallDefaults {
    CallDefaults {
      response_prefix: self.response_prefix.clone(),
      default: self.default_value.clone(),
    }
  }

  /// `<config dir>/mplayer-slave/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mplayer-slave").join("config.json"))
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Load `path`, or defaults when it does not exist yet.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    match Self::load(path) {
      Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
        log::info!("No config at {:?}, using defaults", path);
        Ok(Self::default())
      }
      other => other,
    }
  }

  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    self.validate().map_err(ConfigError::Invalid)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = PlayerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.call_defaults(), CallDefaults::default());
    assert_eq!(config.mplayer_path(), None);
  }

  #[test]
  fn test_partial_json_uses_defaults() {
    let config: PlayerConfig =
      serde_json::from_str(r#"{"mplayerArgs":["-vo","null"],"defaultValue":-1}"#).unwrap();
    assert_eq!(config.mplayer_args, vec!["-vo", "null"]);
    assert_eq!(config.default_value, Value::Int(-1));
    assert_eq!(config.stop_timeout_ms, 2000);
  }

  #[test]
  fn test_validate() {
    let mut config = PlayerConfig {
      response_prefix: "pausing keep".into(),
      ..Default::default()
    };
    assert!(config.validate().is_err());

    config.response_prefix = "pausing_keep".into();
    config.stop_timeout_ms = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = PlayerConfig {
      mplayer_path: Some("/usr/bin/mplayer".into()),
      default_value: Value::Float(0.0),
      ..Default::default()
    };
    config.save(&path).unwrap();

    let loaded = PlayerConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
  }

  #[test]
  fn test_load_or_default_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = PlayerConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, PlayerConfig::default());
  }

  #[test]
  fn test_load_rejects_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"stopTimeoutMs":0}"#).unwrap();
    assert!(matches!(PlayerConfig::load(&path), Err(ConfigError::Invalid(_))));
  }
}
