use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Ceiling for `while` passes, unless the loop carries `_unchecked`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Ceiling for nested raises on one context.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default)]
    pub trace_raises: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_depth: default_max_depth(),
            trace_raises: false,
        }
    }
}

fn default_max_iterations() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    512
}

impl RuntimeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to open config file: {}", e)))?;
        let reader = BufReader::new(file);
        let config: RuntimeConfig = serde_json::from_reader(reader)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(json: &str) -> InternalResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> InternalResult<()> {
        if self.max_depth == 0 {
            return Err(Error::config("max_depth must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.max_iterations, 10_000);
    }

    #[test]
    fn test_partial_override() {
        let config = RuntimeConfig::from_str(r#"{"max_iterations": 5, "trace_raises": true}"#)
            .unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_depth, 512);
        assert!(config.trace_raises);
    }

    #[test]
    fn test_rejects_zero_depth() {
        assert!(matches!(
            RuntimeConfig::from_str(r#"{"max_depth": 0}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(RuntimeConfig::from_file("/nonexistent/arbor.json").is_err());
    }
}
