//! Configuration loaded from environment variables
//!
//! Built once at process start and passed by reference into the pipeline;
//! nothing reads the environment after startup.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Filesystem root for downloaded raw files.
    pub raw_data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            raw_data_dir: env::var("RAW_DATA_DIR")
                .unwrap_or_else(|_| "./raw_data".to_string())
                .into(),
        })
    }

    /// Create the raw data directory if it does not exist yet.
    pub fn ensure_raw_data_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.raw_data_dir)
    }

    /// Remove and recreate the raw data directory.
    pub fn clear_raw_data_dir(&self) -> std::io::Result<()> {
        if self.raw_data_dir.exists() {
            fs::remove_dir_all(&self.raw_data_dir)?;
        }
        fs::create_dir_all(&self.raw_data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_raw_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_url: "postgres://localhost/test".to_string(),
            raw_data_dir: dir.path().join("raw"),
        };

        config.ensure_raw_data_dir().unwrap();
        fs::write(config.raw_data_dir.join("stale.csv"), "a,b\n").unwrap();

        config.clear_raw_data_dir().unwrap();
        assert!(config.raw_data_dir.exists());
        assert_eq!(fs::read_dir(&config.raw_data_dir).unwrap().count(), 0);
    }
}
