//! Startup configuration: which backend to use and where its data lives.
//!
//! Values come from the process environment, optionally primed from a `.env`
//! file. Command-line flags override them in the binary.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::store::{BackendKind, CatalogStore, JsonStore, SeedPolicy, SqliteStore};
use crate::utils::{default_data_dir, ensure_parent_directory};

/// Selects the backend (`sqlite` or `json`).
pub const BACKEND_ENV: &str = "TUNEBOOK_BACKEND";
/// Directory holding the data file.
pub const DATA_DIR_ENV: &str = "TUNEBOOK_DATA_DIR";
/// Whether a fresh catalog gets sample content (`true`/`false`).
pub const SEED_ENV: &str = "TUNEBOOK_SEED";

/// Resolved startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub seed: SeedPolicy,
}

impl CatalogConfig {
    /// Reads configuration from the environment after loading `.env`, if any.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from a variable lookup, using defaults for
    /// unset or blank variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let backend = match get(BACKEND_ENV) {
            Some(value) => value.parse()?,
            None => BackendKind::default(),
        };
        let data_dir = match get(DATA_DIR_ENV) {
            Some(value) => PathBuf::from(value.trim()),
            None => default_data_dir()?,
        };
        let seed = match get(SEED_ENV) {
            Some(value) => parse_seed(&value)?,
            None => SeedPolicy::default(),
        };

        Ok(Self {
            backend,
            data_dir,
            seed,
        })
    }

    /// Path of the data file for the configured backend.
    pub fn data_file(&self) -> PathBuf {
        self.data_dir.join(self.backend.file_name())
    }
}

fn parse_seed(value: &str) -> Result<SeedPolicy> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(SeedPolicy::Sample),
        "0" | "false" | "no" | "off" => Ok(SeedPolicy::Empty),
        other => Err(CatalogError::validation(
            "seed",
            format!("expected true or false, got '{other}'"),
        )),
    }
}

/// Opens the configured backend, creating its data directory if needed.
pub fn open_store(config: &CatalogConfig) -> Result<Box<dyn CatalogStore>> {
    let path = config.data_file();
    ensure_parent_directory(&path)?;

    Ok(match config.backend {
        BackendKind::Sqlite => Box::new(SqliteStore::open(&path, config.seed)?),
        BackendKind::Json => Box::new(JsonStore::open(path, config.seed)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn explicit_values_are_used() {
        let config = CatalogConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "json"),
            (DATA_DIR_ENV, "/tmp/tunes"),
            (SEED_ENV, "off"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Json);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/tunes"));
        assert_eq!(config.seed, SeedPolicy::Empty);
        assert_eq!(config.data_file(), PathBuf::from("/tmp/tunes/tunebook.json"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = CatalogConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "  "),
            (DATA_DIR_ENV, "/tmp/tunes"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.seed, SeedPolicy::Sample);
    }

    #[test]
    fn invalid_values_are_validation_errors() {
        let err = CatalogConfig::from_lookup(lookup(&[
            (BACKEND_ENV, "mongo"),
            (DATA_DIR_ENV, "/tmp"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { field: "backend", .. }));

        let err = CatalogConfig::from_lookup(lookup(&[(SEED_ENV, "maybe"), (DATA_DIR_ENV, "/tmp")]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { field: "seed", .. }));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        let dir = tempdir().unwrap();
        // SAFETY: #[serial] keeps other env-reading tests from running concurrently.
        unsafe {
            std::env::set_var(BACKEND_ENV, "json");
            std::env::set_var(DATA_DIR_ENV, dir.path());
            std::env::set_var(SEED_ENV, "false");
        }

        let config = CatalogConfig::from_env();

        unsafe {
            std::env::remove_var(BACKEND_ENV);
            std::env::remove_var(DATA_DIR_ENV);
            std::env::remove_var(SEED_ENV);
        }
        let config = config.unwrap();
        assert_eq!(config.backend, BackendKind::Json);
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.seed, SeedPolicy::Empty);
    }

    #[test]
    fn open_store_creates_directory_and_file() {
        let dir = tempdir().unwrap();
        for backend in [BackendKind::Sqlite, BackendKind::Json] {
            let config = CatalogConfig {
                backend,
                data_dir: dir.path().join("nested"),
                seed: SeedPolicy::Sample,
            };

            let store = open_store(&config).unwrap();

            assert_eq!(store.backend(), backend);
            assert!(config.data_file().exists());
            assert_eq!(store.list_collections().unwrap().len(), 2);
        }
    }
}
