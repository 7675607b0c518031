//! Invocation engine configuration
//!
//! Loaded from an `[invoke]` table in a TOML document or from
//! `RAYA_INVOKE_*` environment variables:
//!
//! ```toml
//! [invoke]
//! force_interpreted = false
//! force_compiled = false
//! dynamic_code = true
//! max_heap_bytes = 0
//! ```

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable forcing interpreted dispatch
pub const ENV_FORCE_INTERPRETED: &str = "RAYA_INVOKE_FORCE_INTERPRETED";
/// Environment variable forcing compilation on the first call
pub const ENV_FORCE_COMPILED: &str = "RAYA_INVOKE_FORCE_COMPILED";
/// Environment variable enabling or disabling dynamic code generation
pub const ENV_DYNAMIC_CODE: &str = "RAYA_INVOKE_DYNAMIC_CODE";

/// Invocation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InvokeConfig {
    /// Never compile; every call runs interpreted
    pub force_interpreted: bool,
    /// Compile on the first call instead of the second
    pub force_compiled: bool,
    /// Allow the compiler at all
    pub dynamic_code: bool,
    /// Heap size limit in bytes (0 = unlimited)
    pub max_heap_bytes: usize,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            force_interpreted: false,
            force_compiled: false,
            dynamic_code: true,
            max_heap_bytes: 0,
        }
    }
}

/// Dispatch strategy forced on every new invoker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyOverride {
    /// Interpreted first call, compiled afterwards when available
    #[default]
    None,
    /// Always interpreted
    Interpreted,
    /// Compiled from the first call
    Compiled,
}

#[derive(Deserialize, Default)]
struct ConfigDocument {
    #[serde(default)]
    invoke: InvokeConfig,
}

impl InvokeConfig {
    /// Parse the `[invoke]` table of a TOML document.
    ///
    /// A document without the table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument = toml::from_str(content)?;
        Ok(document.invoke)
    }

    /// Read overrides from the process environment on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup` on top of the defaults
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Apply environment overrides to an existing configuration
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_FORCE_INTERPRETED) {
            self.force_interpreted = parse_flag(ENV_FORCE_INTERPRETED, &value)?;
        }
        if let Some(value) = lookup(ENV_FORCE_COMPILED) {
            self.force_compiled = parse_flag(ENV_FORCE_COMPILED, &value)?;
        }
        if let Some(value) = lookup(ENV_DYNAMIC_CODE) {
            self.dynamic_code = parse_flag(ENV_DYNAMIC_CODE, &value)?;
        }
        Ok(())
    }

    /// Resolve the strategy override. Interpreted wins when both are forced.
    pub fn strategy_override(&self) -> StrategyOverride {
        match (self.force_interpreted, self.force_compiled) {
            (true, true) => {
                tracing::warn!(
                    "both force_interpreted and force_compiled set; using interpreted dispatch"
                );
                StrategyOverride::Interpreted
            }
            (true, false) => StrategyOverride::Interpreted,
            (false, true) => StrategyOverride::Compiled,
            (false, false) => StrategyOverride::None,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
