use crate::{HttpStore, MemoryStore, ResourceStore, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_backend() -> String {
    "http".to_owned()
}

/// Where the resource store lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `http` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub url: String,
    /// Forwarded verbatim as a bearer token; never inspected.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl StoreConfig {
    pub fn http(url: &str) -> Self {
        Self {
            backend: default_backend(),
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: "memory".to_owned(),
            url: String::new(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Load config from `~/.config/rekon/store.json`.
    pub fn load_default() -> Result<Self, StoreError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| StoreError::Invalid(format!("invalid store config: {e}")))?;
        config.url = config.url.trim_end_matches('/').to_owned();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf, StoreError> {
    let home =
        std::env::var("HOME").map_err(|_| StoreError::Invalid("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/rekon/store.json"))
}

/// Instantiate the backend named in the config.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn ResourceStore>, StoreError> {
    match config.backend.as_str() {
        "http" => {
            if config.url.is_empty() {
                return Err(StoreError::Invalid("http backend requires a url".to_owned()));
            }
            Ok(Box::new(HttpStore::new(config.clone())))
        }
        "memory" => Ok(Box::new(MemoryStore::new())),
        other => Err(StoreError::Invalid(format!("unknown store backend '{other}'"))),
    }
}
