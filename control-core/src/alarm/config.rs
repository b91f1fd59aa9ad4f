//! Alarm configuration file loading and validation.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::alarm::dto::{AlarmConfig, AlarmSeverity};
use crate::error::AlarmError;

static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[EWI]\d{3}$").unwrap());

#[derive(Debug, Deserialize)]
struct ConfigFile {
    version: String,
    alarms: Vec<AlarmConfig>,
}

/// In-memory catalog of configured alarms, keyed by code.
#[derive(Debug, Default)]
pub struct AlarmConfiguration {
    configs: HashMap<String, AlarmConfig>,
    version: Option<String>,
}

impl AlarmConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file, rejecting duplicate codes.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), AlarmError> {
        let path = path.as_ref();
        log::info!("loading alarm config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        self.load_from_str(&contents)
    }

    pub fn load_from_str(&mut self, contents: &str) -> Result<(), AlarmError> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        log::info!("alarm config version: {}", file.version);

        let mut configs = HashMap::with_capacity(file.alarms.len());
        for config in file.alarms {
            if configs.contains_key(&config.code) {
                return Err(AlarmError::DuplicateCode(config.code));
            }
            log::debug!("loaded alarm: {} - {}", config.code, config.name);
            configs.insert(config.code.clone(), config);
        }

        self.version = Some(file.version);
        self.configs = configs;
        log::info!("loaded {} alarms successfully", self.configs.len());
        Ok(())
    }

    pub fn add_config(&mut self, config: AlarmConfig) {
        self.configs.insert(config.code.clone(), config);
    }

    pub fn get_alarm_config(&self, code: &str) -> Option<&AlarmConfig> {
        self.configs.get(code)
    }

    pub fn get_all_configs(&self) -> Vec<&AlarmConfig> {
        self.configs.values().collect()
    }

    pub fn has_alarm_config(&self, code: &str) -> bool {
        self.configs.contains_key(code)
    }

    /// Effective severity for the `recurrence_count`-th occurrence of
    /// `code`: promoted one step if the count has reached the configured
    /// threshold, otherwise the configured base severity.
    pub fn should_escalate_severity(&self, code: &str, recurrence_count: u32) -> AlarmSeverity {
        let Some(config) = self.get_alarm_config(code) else {
            return AlarmSeverity::Info;
        };
        if recurrence_count >= config.recurrence_threshold {
            config.severity.escalate_one_step()
        } else {
            config.severity
        }
    }

    /// Validate every loaded config: non-empty catalog, code format
    /// `[EWI]\d{3}`, non-empty names.
    pub fn validate(&self) -> Result<(), AlarmError> {
        if self.configs.is_empty() {
            return Err(AlarmError::config("no alarms configured"));
        }

        for (code, config) in &self.configs {
            if !CODE_PATTERN.is_match(code) {
                return Err(AlarmError::config(format!(
                    "invalid alarm code format: {code}"
                )));
            }
            if config.name.is_empty() {
                return Err(AlarmError::config(format!("empty name for alarm: {code}")));
            }
        }

        log::info!("validation passed for {} alarms", self.configs.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: "1.0"
alarms:
  - code: "E001"
    name: "Emergency Stop Activated"
    severity: "CRITICAL"
  - code: "W001"
    name: "Battery Low"
    severity: "WARNING"
    recurrence_window_secs: 60
    recurrence_threshold: 3
"#;

    #[test]
    fn loads_and_validates() {
        let mut cfg = AlarmConfiguration::new();
        cfg.load_from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert!(cfg.has_alarm_config("E001"));
        assert_eq!(
            cfg.get_alarm_config("W001").unwrap().recurrence_threshold,
            3
        );
    }

    #[test]
    fn duplicate_code_rejected() {
        let dup = format!("{SAMPLE}  - code: \"E001\"\n    name: \"dup\"\n    severity: \"INFO\"\n");
        let mut cfg = AlarmConfiguration::new();
        assert!(cfg.load_from_str(&dup).is_err());
    }

    #[test]
    fn escalation_promotes_one_step_at_threshold() {
        let mut cfg = AlarmConfiguration::new();
        cfg.load_from_str(SAMPLE).unwrap();
        assert_eq!(
            cfg.should_escalate_severity("W001", 2),
            AlarmSeverity::Warning
        );
        assert_eq!(
            cfg.should_escalate_severity("W001", 3),
            AlarmSeverity::Critical
        );
    }

    #[test]
    fn unknown_severity_string_defaults_to_info() {
        let yaml = r#"
version: "1.0"
alarms:
  - code: "I001"
    name: "test"
    severity: "NOT_A_SEVERITY"
"#;
        let mut cfg = AlarmConfiguration::new();
        cfg.load_from_str(yaml).unwrap();
        assert_eq!(cfg.get_alarm_config("I001").unwrap().severity, AlarmSeverity::Info);
    }
}
