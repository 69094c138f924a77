use std::path::PathBuf;

use anyhow::{Context, Result};
use quill_types::time::Zone;

/// Settings from the environment. Command-line arguments override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub zone: Zone,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::load(|key| std::env::var(key).ok())
    }

    pub fn load(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = match var("QUILL_DB_PATH").filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path(var("HOME")),
        };
        let zone = match var("QUILL_TIMEZONE").filter(|z| !z.is_empty()) {
            Some(zone) => zone
                .parse::<Zone>()
                .map_err(anyhow::Error::msg)
                .context("invalid QUILL_TIMEZONE")?,
            None => Zone::default(),
        };
        Ok(Self { db_path, zone })
    }
}

fn default_db_path(home: Option<String>) -> PathBuf {
    home.map(PathBuf::from)
        .unwrap_or_default()
        .join("Library")
        .join("Messages")
        .join("chat.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_home_store() {
        let config = load(&[("HOME", "/Users/sam")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/Users/sam/Library/Messages/chat.db"));
        assert_eq!(config.zone, Zone::Local);
    }

    #[test]
    fn env_overrides() {
        let config = load(&[
            ("HOME", "/Users/sam"),
            ("QUILL_DB_PATH", "/tmp/copy.db"),
            ("QUILL_TIMEZONE", "UTC"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/copy.db"));
        assert_eq!(config.zone, Zone::Utc);
    }

    #[test]
    fn rejects_unknown_zone() {
        let err = load(&[("QUILL_TIMEZONE", "PST")]).unwrap_err();
        assert!(format!("{err:#}").contains("QUILL_TIMEZONE"));
    }
}
