use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub data_dir: PathBuf,
    pub database: DatabaseConfig,
    pub admin: AdminSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub file: String,
    pub sync: SyncMode,
    pub busy_timeout_ms: u64,
    /// How often queued writes are flushed in batched mode.
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub max_clients: usize,
    /// Marker that turns a chat line into a command.
    pub command_prefix: char,
    pub eight_ball_delay_ms: u64,
    pub page_size: usize,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database: DatabaseConfig::default(),
            admin: AdminSettings::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: "warden.db".to_string(),
            sync: SyncMode::Instant,
            busy_timeout_ms: 5000,
            flush_interval_secs: 60,
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            max_clients: 64,
            command_prefix: '!',
            eight_ball_delay_ms: 3000,
            page_size: 20,
        }
    }
}

impl AdminSettings {
    pub fn eight_ball_delay(&self) -> Duration {
        Duration::from_millis(self.eight_ball_delay_ms)
    }

    /// Rows per listing page. Settings built in code skip `validate`, so a
    /// zero page size still lists one row at a time.
    pub fn page_len(&self) -> usize {
        self.page_size.max(1)
    }
}

impl WardenConfig {
    /// Reads a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin.max_clients == 0 {
            return Err(Error::Config("admin.max_clients must be at least 1".to_string()));
        }
        if self.admin.page_size == 0 {
            return Err(Error::Config("admin.page_size must be at least 1".to_string()));
        }
        if self.admin.command_prefix.is_whitespace() {
            return Err(Error::Config(
                "admin.command_prefix cannot be whitespace".to_string(),
            ));
        }
        if self.database.file.trim().is_empty() {
            return Err(Error::Config("database.file cannot be empty".to_string()));
        }
        if self.database.sync == SyncMode::Batched && self.database.flush_interval_secs == 0 {
            return Err(Error::Config(
                "database.flush_interval_secs must be at least 1 in batched mode".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.database.file)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.database.flush_interval_secs)
    }
}
