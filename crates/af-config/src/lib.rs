//! YAML configuration loading for autoflow
//!
//! [`EngineConfig`] holds the dispatch, tracing and templating settings plus
//! the automations registered at startup. Files are read through
//! [`YamlLoader`], which understands two custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var NAME [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use af_config::EngineConfig;
//!
//! let config = EngineConfig::load("/etc/autoflow/engine.yaml")?;
//! ```

mod engine_config;
mod error;
mod loader;

pub use engine_config::{DispatchConfig, EngineConfig, TemplatingConfig};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_path, load_yaml_string, YamlLoader};

pub use serde_yaml::Value;
