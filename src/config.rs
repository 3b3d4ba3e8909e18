//! Sync configuration.
//!
//! Persisted as pretty JSON under the user's home directory. The first
//! run creates a default file; an unparseable file is reported, never
//! silently replaced.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub const DEFAULT_CANONICAL_KEY: &str = "InHouseTool/permissions.json";
pub const DEFAULT_BACKUP_KEY: &str = "InHouseTool/backup/permissions.json";

const CONFIG_DIR_NAME: &str = ".permsync";

/// Where the pre-save snapshot of the canonical object goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BackupSlot {
    /// A single slot overwritten on every save.
    Fixed { key: String },
    /// One object per save under the prefix, keyed by UTC time.
    Timestamped { prefix: String },
}

impl BackupSlot {
    pub fn resolve(&self) -> String {
        match self {
            BackupSlot::Fixed { key } => key.clone(),
            BackupSlot::Timestamped { prefix } => format!(
                "{}/permissions-{}.json",
                prefix.trim_end_matches('/'),
                Utc::now().format("%Y%m%dT%H%M%SZ")
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    pub endpoint: String,
    pub bucket: String,
    /// Base64-encoded access key id; empty disables authentication.
    #[serde(default)]
    pub access_key: String,
    /// Base64-encoded secret key.
    #[serde(default)]
    pub secret_key: String,
    pub canonical_key: String,
    pub backup: BackupSlot,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            bucket: "permission-control".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            canonical_key: DEFAULT_CANONICAL_KEY.to_string(),
            backup: BackupSlot::Fixed {
                key: DEFAULT_BACKUP_KEY.to_string(),
            },
            cache_path: None,
            timeout_seconds: 30,
        }
    }
}

impl SyncConfig {
    fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or_else(|| SyncError::Config("Could not find home directory".to_string()))
    }

    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir()?;

        std::fs::create_dir_all(&config_dir).map_err(|e| {
            SyncError::Config(format!("Failed to create config directory: {}", e))
        })?;

        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| SyncError::Config(format!("Failed to read config file: {}", e)))?;

            serde_json::from_str::<SyncConfig>(&content).map_err(|e| {
                SyncError::Config(format!(
                    "Failed to parse config: {}. Please fix the config file or delete it to use defaults.",
                    e
                ))
            })
        } else {
            let default_config = SyncConfig::default();
            default_config.save()?;
            tracing::info!("Created new default config file");
            Ok(default_config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&config_path, content)
            .map_err(|e| SyncError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Configured cache file, or the default one next to the config.
    pub fn resolve_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("cache").join("permissions.json")),
        }
    }

    /// Decoded credential pair, or None when unauthenticated.
    pub fn credentials(&self) -> Result<Option<(String, String)>> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Ok(None);
        }
        let access = decode_credential("access key", &self.access_key)?;
        let secret = decode_credential("secret key", &self.secret_key)?;
        Ok(Some((access, secret)))
    }
}

fn decode_credential(label: &str, encoded: &str) -> Result<String> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| SyncError::Config(format!("Invalid base64 {}: {}", label, e)))?;
    String::from_utf8(raw).map_err(|e| SyncError::Config(format!("Invalid {}: {}", label, e)))
}
