use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::providers::base::DEFAULT_CONTEXT_SIZE;

const ENV_PREFIX: &str = "ASTRA";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid value for {env_var}: {reason}")]
    InvalidValue { env_var: String, reason: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a settings key such as `worker.temperature` to `ASTRA_WORKER__TEMPERATURE`
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}

/// Completion parameters of one engine
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationSettings {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Worker turns allowed per delegated task before it times out
    pub task_max_iters: u32,
    /// Context size assumed for providers that do not report one
    pub default_context_size: usize,
    pub main: GenerationSettings,
    pub worker: GenerationSettings,
    pub summary: GenerationSettings,
    pub verification: GenerationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            task_max_iters: 20,
            default_context_size: DEFAULT_CONTEXT_SIZE,
            main: GenerationSettings::new(1024, 0.5),
            worker: GenerationSettings::new(1024, 0.7),
            summary: GenerationSettings::new(1024, 0.7),
            verification: GenerationSettings::new(512, 0.3),
        }
    }
}

impl Settings {
    /// Defaults overridden by `ASTRA_*` environment variables
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("task_max_iters", defaults.task_max_iters as u64)?
            .set_default("default_context_size", defaults.default_context_size as u64)?;
        for (name, generation) in [
            ("main", defaults.main),
            ("worker", defaults.worker),
            ("summary", defaults.summary),
            ("verification", defaults.verification),
        ] {
            builder = builder
                .set_default(format!("{}.max_tokens", name), generation.max_tokens as u64)?
                .set_default(format!("{}.temperature", name), generation.temperature as f64)?;
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(match &err {
                    config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    },
                    _ => ConfigError::Other(err),
                });
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.task_max_iters == 0 {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("task_max_iters"),
                reason: "must be at least 1".into(),
            });
        }
        for (name, generation) in [
            ("main", &self.main),
            ("worker", &self.worker),
            ("summary", &self.summary),
            ("verification", &self.verification),
        ] {
            if !(0.0..=2.0).contains(&generation.temperature) {
                return Err(ConfigError::InvalidValue {
                    env_var: to_env_var(&format!("{}.temperature", name)),
                    reason: format!("{} is outside 0.0..=2.0", generation.temperature),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("ASTRA_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::new().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.task_max_iters, 20);
        assert_eq!(settings.default_context_size, 4096);
        assert_eq!(settings.main, GenerationSettings::new(1024, 0.5));
        assert_eq!(settings.verification, GenerationSettings::new(512, 0.3));
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("ASTRA_TASK_MAX_ITERS", "5");
        env::set_var("ASTRA_WORKER__TEMPERATURE", "0.2");
        env::set_var("ASTRA_MAIN__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.task_max_iters, 5);
        assert_eq!(settings.worker.temperature, 0.2);
        assert_eq!(settings.worker.max_tokens, 1024);
        assert_eq!(settings.main.max_tokens, 2000);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_malformed_value() {
        clean_env();
        env::set_var("ASTRA_TASK_MAX_ITERS", "many");

        let err = Settings::new().unwrap_err();
        assert!(matches!(err, ConfigError::Other(_)));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_out_of_range_values() {
        clean_env();
        env::set_var("ASTRA_TASK_MAX_ITERS", "0");
        match Settings::new().unwrap_err() {
            ConfigError::InvalidValue { env_var, .. } => assert_eq!(env_var, "ASTRA_TASK_MAX_ITERS"),
            other => panic!("unexpected error {:?}", other),
        }

        clean_env();
        env::set_var("ASTRA_SUMMARY__TEMPERATURE", "3.5");
        match Settings::new().unwrap_err() {
            ConfigError::InvalidValue { env_var, .. } => {
                assert_eq!(env_var, "ASTRA_SUMMARY__TEMPERATURE")
            }
            other => panic!("unexpected error {:?}", other),
        }

        clean_env();
    }

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("worker.max_tokens"), "ASTRA_WORKER__MAX_TOKENS");
        assert_eq!(to_env_var("task_max_iters"), "ASTRA_TASK_MAX_ITERS");
    }
}
