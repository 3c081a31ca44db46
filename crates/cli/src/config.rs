use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use donor::DonorServiceConfig;
use reshard_core::ShardId;
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".reshard-donor";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "donor.db";
pub const DEFAULT_PORT: u16 = 3001;
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub shard: ShardSection,
    pub server: ServerSection,
    pub storage: StorageSection,
    #[serde(default)]
    pub donor: DonorSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSection {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Relative paths resolve against the config directory.
    pub database: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorSection {
    pub readiness_poll_interval_ms: u64,
}

impl Default for DonorSection {
    fn default() -> Self {
        Self {
            readiness_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ShardConfig {
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard: ShardSection { id: shard_id.into() },
            server: ServerSection { port: DEFAULT_PORT },
            storage: StorageSection {
                database: PathBuf::from(DEFAULT_DB_NAME),
            },
            donor: DonorSection::default(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, toml::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            config_dir.join(&self.storage.database)
        }
    }

    pub fn database_url(&self, config_dir: &Path) -> String {
        format!("sqlite:{}", self.database_path(config_dir).display())
    }

    pub fn donor_service_config(&self) -> Result<DonorServiceConfig> {
        let shard_id = ShardId::new(self.shard.id.clone())?;
        Ok(DonorServiceConfig::new(shard_id).with_readiness_poll_interval(
            Duration::from_millis(self.donor.readiness_poll_interval_ms),
        ))
    }
}
