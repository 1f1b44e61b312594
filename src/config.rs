use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::analyzer::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,

    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_diff_chars: default_max_diff_chars(),
            system_prompt: None,
            api_key: None,
            base_url: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try .diffbrief.yml / .diffbrief.yaml in the current directory
        for name in [".diffbrief.yml", ".diffbrief.yaml"] {
            let config_path = PathBuf::from(name);
            if config_path.exists() {
                return Self::load_from(&config_path);
            }
        }

        // Then the home directory
        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".diffbrief.yml");
            if home_config.exists() {
                return Self::load_from(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn merge_with_cli(
        &mut self,
        cli_model: Option<String>,
        cli_temperature: Option<f32>,
        cli_max_tokens: Option<usize>,
    ) {
        if let Some(model) = cli_model {
            self.model = model;
        }
        if let Some(temperature) = cli_temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = cli_max_tokens {
            self.max_tokens = max_tokens;
        }
    }

    /// Clamps settings into usable ranges.
    pub fn normalize(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_tokens = self.max_tokens.max(1);
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            self.retry.max_delay_ms = self.retry.base_delay_ms;
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> usize {
    1000
}

fn default_max_diff_chars() -> usize {
    60000
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    4000
}

fn default_max_delay_ms() -> u64 {
    10000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_settings() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 4000);
        assert_eq!(config.retry.max_delay_ms, 10000);
    }

    #[test]
    fn loads_partial_yaml_and_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model: claude-sonnet-4-5").unwrap();
        writeln!(file, "retry:").unwrap();
        writeln!(file, "  max_attempts: 5").unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 4000);
        assert_eq!(config.max_tokens, 1000);
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut config = Config {
            temperature: 9.0,
            max_tokens: 0,
            ..Config::default()
        };
        config.retry.max_attempts = 0;
        config.retry.base_delay_ms = 5000;
        config.retry.max_delay_ms = 100;

        config.normalize();

        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.max_tokens, 1);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.max_delay_ms, 5000);
    }

    #[test]
    fn cli_values_override_file_values() {
        let mut config = Config::default();
        config.merge_with_cli(Some("gpt-4o-mini".to_string()), Some(0.0), Some(256));

        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, 256);
    }
}
