//! Configuration types for repokit

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Which side wins when a stored record changed after a write context read it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Fields changed by the committing context overwrite the stored values
    #[default]
    IncomingWins,
    /// Stored values win on fields both sides changed
    ExistingWins,
    /// Fail the whole commit
    Reject,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming-wins" | "incomingWins" => Ok(ConflictPolicy::IncomingWins),
            "existing-wins" | "existingWins" => Ok(ConflictPolicy::ExistingWins),
            "reject" => Ok(ConflictPolicy::Reject),
            other => Err(ConfigError::Invalid(format!("unknown conflict policy '{}'", other))),
        }
    }
}

/// How queries resolve "nothing matched" and "wrong record type"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionMode {
    /// Log and return an empty result
    #[default]
    Lenient,
    /// Surface `NoData` / `TypeMismatch` to the caller
    Strict,
}

/// Per-repository settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryConfig {
    pub conflict_policy: ConflictPolicy,
    pub projection: ProjectionMode,
    /// Reconcile saves in chunks of this many objects instead of loading the
    /// whole table. Only used when the mapper can build a key predicate.
    pub reconcile_batch_size: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl RepositoryConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_batch_size == Some(0) {
            return Err(ConfigError::Invalid(
                "reconcileBatchSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_projection(mut self, mode: ProjectionMode) -> Self {
        self.projection = mode;
        self
    }

    pub fn with_reconcile_batch_size(mut self, size: usize) -> Self {
        self.reconcile_batch_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.conflict_policy, ConflictPolicy::IncomingWins);
        assert_eq!(config.projection, ProjectionMode::Lenient);
        assert_eq!(config.reconcile_batch_size, None);
    }

    #[test]
    fn test_config_parse_json() {
        let json = r#"{ "conflictPolicy": "existingWins", "reconcileBatchSize": 500 }"#;

        let config: RepositoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::ExistingWins);
        assert_eq!(config.projection, ProjectionMode::Lenient);
        assert_eq!(config.reconcile_batch_size, Some(500));
    }

    #[test]
    fn test_from_file_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "conflictPolicy: reject\nprojection: strict").unwrap();

        let config = RepositoryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.projection, ProjectionMode::Strict);
    }

    #[test]
    fn test_from_file_rejects_zero_batch() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "reconcileBatchSize": 0 }}"#).unwrap();

        let err = RepositoryConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("reject".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Reject);
        assert_eq!(
            "existing-wins".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::ExistingWins
        );
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }
}
