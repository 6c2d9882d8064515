use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

const DB_FILE_NAME: &str = "gitspace.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    pub principal_cache_ttl_secs: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Upper bound on ancestor walks; deeper chains are treated as corrupt.
    pub max_space_depth: usize,
}

impl StoreConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(Error::Config("default_page_size must be positive".to_string()));
        }
        if self.max_page_size < self.default_page_size {
            return Err(Error::Config(
                "max_page_size cannot be smaller than default_page_size".to_string(),
            ));
        }
        if self.max_space_depth == 0 {
            return Err(Error::Config("max_space_depth must be positive".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub fn principal_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.principal_cache_ttl_secs)
    }

    /// Clamps a requested page size; zero selects the default.
    #[must_use]
    pub fn limit(&self, size: u32) -> u32 {
        match size {
            0 => self.default_page_size,
            s => s.min(self.max_page_size),
        }
    }

    /// Pages are 1-based; page 0 is treated as the first page.
    #[must_use]
    pub fn offset(&self, page: u32, size: u32) -> u64 {
        u64::from(page.saturating_sub(1)) * u64::from(self.limit(size))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            busy_timeout_ms: 5_000,
            principal_cache_ttl_secs: 60,
            default_page_size: 50,
            max_page_size: 100,
            max_space_depth: 64,
        }
    }
}
