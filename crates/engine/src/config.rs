//! Engine configuration.
//!
//! ```yaml
//! flow_timeout: 2m
//! save_timeout: 5s
//! http_timeout: 30s
//! step_buffer: 16
//! message_buffer: 16
//! variables:
//!   BASE_URL: http://localhost:8080
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};

const CONFIG_PATH_VARIABLE: &str = "THESIS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for one performance run.
    #[serde(with = "duration_text")]
    pub flow_timeout: Duration,
    /// Upper bound for persisting one flow snapshot.
    #[serde(with = "duration_text")]
    pub save_timeout: Duration,
    #[serde(with = "duration_text")]
    pub http_timeout: Duration,
    pub step_buffer: usize,
    pub message_buffer: usize,
    /// Exposed to templates as `env.NAME`.
    pub variables: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flow_timeout: Duration::from_secs(300),
            save_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(30),
            step_buffer: 16,
            message_buffer: 16,
            variables: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("flow_timeout", self.flow_timeout),
            ("save_timeout", self.save_timeout),
            ("http_timeout", self.http_timeout),
        ] {
            if value.is_zero() {
                bail!("{name} must be greater than zero");
            }
        }
        if self.step_buffer == 0 || self.message_buffer == 0 {
            bail!("step_buffer and message_buffer must be at least 1");
        }
        Ok(())
    }
}

/// `$THESIS_CONFIG_PATH`, or `<config dir>/thesis/engine.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_VARIABLE)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("thesis").join("engine.yaml")
}

pub fn load_config() -> Result<EngineConfig> {
    load_config_from_path(&default_config_path())
}

/// Loads a YAML (or JSON) config. A missing file yields the defaults.
pub fn load_config_from_path(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: EngineConfig = serde_yaml::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
    config.validate().with_context(|| format!("validate {}", path.display()))?;
    Ok(config)
}

/// Parses `"250ms"`, `"5s"`, `"2m"`, `"1h"`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(number) = trimmed.strip_suffix("ms") {
        return number.trim().parse().ok().map(Duration::from_millis);
    }
    let last_character = trimmed.chars().last()?;
    if last_character.is_ascii_alphabetic() {
        let value: u64 = trimmed[..trimmed.len() - 1].trim().parse().ok()?;
        return match last_character {
            's' | 'S' => Some(Duration::from_secs(value)),
            'm' | 'M' => value.checked_mul(60).map(Duration::from_secs),
            'h' | 'H' => value.checked_mul(3600).map(Duration::from_secs),
            _ => None,
        };
    }
    trimmed.parse().ok().map(Duration::from_secs)
}

/// Renders a duration in the shortest unit `parse_duration` reads back.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let seconds = duration.as_secs();
    if seconds != 0 && seconds % 3600 == 0 {
        format!("{}h", seconds / 3600)
    } else if seconds != 0 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{seconds}s")
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => super::parse_duration(&text).ok_or_else(|| D::Error::custom(format!("invalid duration `{text}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_humane_durations() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration(&format!("{}h", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX / 2)), None);
    }

    #[test]
    fn formats_in_the_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
    }

    #[test]
    fn default_path_honors_environment_override() {
        temp_env::with_var(CONFIG_PATH_VARIABLE, Some("/tmp/custom/engine.yaml"), || {
            assert_eq!(default_config_path(), PathBuf::from("/tmp/custom/engine.yaml"));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_path(&directory.path().join("absent.yaml")).expect("defaults");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn loads_partial_yaml_over_defaults() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("engine.yaml");
        fs::write(&path, "flow_timeout: 250ms\nstep_buffer: 4\nvariables:\n  HOST: localhost\n").expect("write");

        let config = load_config_from_path(&path).expect("config");
        assert_eq!(config.flow_timeout, Duration::from_millis(250));
        assert_eq!(config.step_buffer, 4);
        assert_eq!(config.save_timeout, Duration::from_secs(5));
        assert_eq!(config.variables.get("HOST").map(String::as_str), Some("localhost"));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("engine.yaml");
        fs::write(&path, "flow_timeout: 0s\n").expect("write");

        let error = load_config_from_path(&path).expect_err("invalid");
        assert!(format!("{error:#}").contains("flow_timeout must be greater than zero"));
    }

    #[test]
    fn load_config_reads_the_default_path() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("engine.yaml");
        fs::write(&path, "flow_timeout: 2m\n").expect("write");

        temp_env::with_var(CONFIG_PATH_VARIABLE, Some(path.as_os_str()), || {
            let config = load_config().expect("config");
            assert_eq!(config.flow_timeout, Duration::from_secs(120));
        });
    }
}
