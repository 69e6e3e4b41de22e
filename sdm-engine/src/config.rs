//! sdm-engine specific configuration

use std::path::PathBuf;

/// Engine configuration resolved at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Config {
    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sdm.db")
    }
}
