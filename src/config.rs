//! Runtime settings.
//!
//! Read in order from built-in defaults, an optional settings file and
//! `TAGBOORU_*` environment variables; later sources win.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, TagbooruError};

pub const DEFAULT_SETTINGS_FILE: &str = "tagbooru";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// SQLite database file, or `:memory:`.
    pub database: String,
    /// Directory holding the index cache.
    pub index: String,
    /// Directory holding stored baseline queries.
    pub baseline: String,
    pub address: String,
    pub page_length: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Settings {
    /// `file` is a path without extension; any format the `config` crate
    /// recognises by extension is accepted and a missing file is ignored.
    pub fn load(file: Option<&str>) -> Result<Self> {
        Config::builder()
            .set_default("database", "booru.db")?
            .set_default("index", "index")?
            .set_default("baseline", "baseline")?
            .set_default("address", "localhost:8085")?
            .set_default("page_length", 24)?
            .add_source(File::with_name(file.unwrap_or(DEFAULT_SETTINGS_FILE)).required(false))
            .add_source(Environment::with_prefix("TAGBOORU"))
            .build()?
            .try_deserialize()
            .map_err(TagbooruError::from)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl From<config::ConfigError> for TagbooruError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let settings = Settings::load(missing.to_str()).unwrap();
        assert_eq!(settings.index, "index");
        assert_eq!(settings.page_length, 24);
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("booru.toml");
        std::fs::write(&path, "database = \":memory:\"\ntimeout_ms = 250\n").unwrap();
        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.database, ":memory:");
        assert_eq!(settings.baseline, "baseline");
        assert_eq!(settings.timeout(), Some(Duration::from_millis(250)));
    }
}
