use crate::owner::DEFAULT_MAX_OWNER_DEPTH;
use crate::retry::RetryPolicy;
use crate::CoreError;
use rekon_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_owner_depth() -> usize {
    DEFAULT_MAX_OWNER_DEPTH
}

/// Engine settings, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "StoreConfig::memory")]
    pub store: StoreConfig,
    #[serde(default, rename = "retry_attempts")]
    pub retry: RetryPolicy,
    #[serde(default = "default_max_owner_depth")]
    pub max_owner_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::memory(),
            retry: RetryPolicy::default(),
            max_owner_depth: DEFAULT_MAX_OWNER_DEPTH,
        }
    }
}

impl EngineConfig {
    pub fn with_store(store: StoreConfig) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        if config.max_owner_depth == 0 {
            return Err(CoreError::Config(format!(
                "{}: max_owner_depth must be at least 1",
                path.display()
            )));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, "{}").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.store.backend, "memory");
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/engine.json");
        let mut config = EngineConfig::with_store(StoreConfig::http("http://127.0.0.1:7443"));
        config.retry = RetryPolicy::new(5).unwrap();
        config.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"retry_attempts\": 5"));
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn rejects_zero_attempts_and_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"retry_attempts": 0}"#).unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(CoreError::Config(_))));

        std::fs::write(&path, r#"{"max_owner_depth": 0}"#).unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(CoreError::Config(_))));
    }
}
