//! Evaluator configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{PolicyError, Result};

/// Environment variable overriding [`CacheConfig::capacity`]
pub const CACHE_CAPACITY_VAR: &str = "ECCHI_CACHE_CAPACITY";

/// Environment variable overriding [`EvaluatorConfig::strict_roles`]
pub const STRICT_ROLES_VAR: &str = "ECCHI_STRICT_ROLES";

/// Evaluation cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of expression vectors kept, common and subject combined
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 128 }
    }
}

impl CacheConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

/// Access evaluator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Reject role names the compiled policy does not declare.
    /// When disabled they are skipped with a warning.
    #[serde(default = "default_strict_roles")]
    pub strict_roles: bool,
}

fn default_strict_roles() -> bool {
    true
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            strict_roles: default_strict_roles(),
        }
    }
}

impl EvaluatorConfig {
    /// Defaults overridden by `ECCHI_CACHE_CAPACITY` and `ECCHI_STRICT_ROLES`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(capacity) = lookup(CACHE_CAPACITY_VAR) {
            config.cache.capacity = parse(CACHE_CAPACITY_VAR, &capacity)?;
        }
        if let Some(strict) = lookup(STRICT_ROLES_VAR) {
            config.strict_roles = parse_flag(STRICT_ROLES_VAR, &strict)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_strict_roles(mut self, strict_roles: bool) -> Self {
        self.strict_roles = strict_roles;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(PolicyError::Configuration(
                "Cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        PolicyError::Configuration(format!("Invalid value '{}' for {}", raw, name))
    })
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PolicyError::Configuration(format!(
            "Invalid value '{}' for {}",
            raw, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EvaluatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EvaluatorConfig::default());
        assert_eq!(config.cache.capacity, 128);
        assert!(config.strict_roles);
    }

    #[test]
    fn test_overrides() {
        let config = EvaluatorConfig::from_lookup(lookup(&[
            (CACHE_CAPACITY_VAR, "16"),
            (STRICT_ROLES_VAR, "off"),
        ]))
        .unwrap();
        assert_eq!(config.cache.capacity, 16);
        assert!(!config.strict_roles);
    }

    #[test]
    fn test_malformed_values() {
        assert!(matches!(
            EvaluatorConfig::from_lookup(lookup(&[(CACHE_CAPACITY_VAR, "lots")])),
            Err(PolicyError::Configuration(msg)) if msg.contains(CACHE_CAPACITY_VAR)
        ));
        assert!(EvaluatorConfig::from_lookup(lookup(&[(STRICT_ROLES_VAR, "maybe")])).is_err());
        assert!(EvaluatorConfig::from_lookup(lookup(&[(CACHE_CAPACITY_VAR, "0")])).is_err());
    }
}
