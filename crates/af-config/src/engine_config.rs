//! Engine configuration
//!
//! ```yaml
//! dispatch:
//!   mode: resilient
//! tracing:
//!   enabled: false
//!   keep_attached: false
//! templating:
//!   enabled: true
//! automations: !include automations.yaml
//! ```

use af_automation::{AutomationDefinition, DispatchMode};
use af_trace::TraceSettings;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml_path;

/// Dispatch behavior
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
}

/// Templating behavior
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatingConfig {
    /// Install the templating interceptor
    pub enabled: bool,
}

impl Default for TemplatingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dispatch: DispatchConfig,

    pub tracing: TraceSettings,

    pub templating: TemplatingConfig,

    /// Automations registered at startup
    #[serde(alias = "automation")]
    pub automations: Vec<AutomationDefinition>,
}

impl EngineConfig {
    /// Load the configuration from a YAML file
    ///
    /// Includes are resolved relative to the file's directory.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let yaml = load_yaml_path(path)?;

        let config = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            automations = config.automations.len(),
            mode = ?config.dispatch.mode,
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Parse the configuration from a processed YAML value
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        match yaml {
            Value::Null => Ok(Self::default()),
            Value::Mapping(_) => {
                serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: e.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dispatch.mode, DispatchMode::Strict);
        assert!(!config.tracing.enabled);
        assert!(!config.tracing.keep_attached);
        assert!(config.templating.enabled);
        assert!(config.automations.is_empty());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_yaml(&Value::Null).unwrap();
        assert!(config.templating.enabled);
    }

    #[test]
    fn test_parse_from_yaml() {
        let yaml: Value = serde_yaml::from_str(
            r#"
dispatch:
  mode: resilient
tracing:
  enabled: true
templating:
  enabled: false
automation:
  - alias: Porch light
    trigger:
      - type: event_type
        data: motion
    action:
      - type: logger
        data:
          message: "Motion on {{ area }}"
          level: info
"#,
        )
        .unwrap();

        let config = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.dispatch.mode, DispatchMode::Resilient);
        assert!(config.tracing.enabled);
        assert!(!config.tracing.keep_attached);
        assert!(!config.templating.enabled);

        let automation = &config.automations[0];
        assert_eq!(automation.alias.as_deref(), Some("Porch light"));
        assert_eq!(automation.triggers[0].type_tag(), "event_type");
        assert_eq!(
            automation.actions[0].data()["message"],
            serde_json::json!("Motion on {{ area }}")
        );
    }

    #[test]
    fn test_non_mapping_is_rejected() {
        let yaml: Value = serde_yaml::from_str("- one\n- two\n").unwrap();
        assert!(matches!(
            EngineConfig::from_yaml(&yaml),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_dispatch_mode_is_rejected() {
        let yaml: Value = serde_yaml::from_str("dispatch:\n  mode: sometimes\n").unwrap();
        assert!(EngineConfig::from_yaml(&yaml).is_err());
    }
}
