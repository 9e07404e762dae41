use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wirekit_bootstrap::{module_config, ConfigError, ConfigProvider};

/// Process environment plus the per-module configuration bag.
///
/// On construction every `.env*` file of the working directory is loaded into
/// the process environment. Variables that are already set keep their value.
pub struct ConfigService {
    provider: Arc<dyn ConfigProvider>,
    env_files: Vec<PathBuf>,
}

impl ConfigService {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => Self::from_dir(&cwd, provider),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read working directory; no .env files loaded");
                Self {
                    provider,
                    env_files: Vec::new(),
                }
            }
        }
    }

    /// Load the `.env*` files of `dir` in name order.
    pub fn from_dir(dir: &Path, provider: Arc<dyn ConfigProvider>) -> Self {
        let env_files = load_env_files(dir);
        Self {
            provider,
            env_files,
        }
    }

    /// Value of `key`, or `default` when unset.
    pub fn get_env(&self, key: &str, default: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    }

    pub fn module_config<T: DeserializeOwned>(&self, module: &str) -> Result<T, ConfigError> {
        module_config(self.provider.as_ref(), module)
    }

    pub fn provider(&self) -> &dyn ConfigProvider {
        self.provider.as_ref()
    }

    /// Files that were loaded successfully.
    pub fn env_files(&self) -> &[PathBuf] {
        &self.env_files
    }
}

fn load_env_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot list .env files");
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(".env"))
        })
        .collect();
    candidates.sort();

    let mut loaded = Vec::with_capacity(candidates.len());
    for path in candidates {
        match dotenv::from_path(&path) {
            Ok(()) => {
                tracing::debug!(file = %path.display(), "Loaded env file");
                loaded.push(path);
            }
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "Failed to load env file"),
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use wirekit_bootstrap::{AppConfig, AppConfigProvider};

    fn provider() -> Arc<dyn ConfigProvider> {
        Arc::new(AppConfigProvider::new(AppConfig::default()))
    }

    #[test]
    fn env_files_are_loaded_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".env"), "WIREKIT_TEST_VERSION=1.0\n").unwrap();
        fs::write(
            tmp.path().join(".env.local"),
            "WIREKIT_TEST_VERSION=2.0\nWIREKIT_TEST_AUTHOR=ann\n",
        )
        .unwrap();
        fs::write(tmp.path().join("env.txt"), "WIREKIT_TEST_IGNORED=1\n").unwrap();

        let service = ConfigService::from_dir(tmp.path(), provider());
        assert_eq!(service.env_files().len(), 2);
        // The first file wins: loading never overrides a set variable.
        assert_eq!(service.get_env("WIREKIT_TEST_VERSION", "x"), "1.0");
        assert_eq!(service.get_env("WIREKIT_TEST_AUTHOR", "x"), "ann");
        assert_eq!(service.get_env("WIREKIT_TEST_IGNORED", "none"), "none");
    }

    #[test]
    fn missing_key_yields_default() {
        let tmp = tempfile::tempdir().unwrap();
        let service = ConfigService::from_dir(tmp.path(), provider());
        assert!(service.env_files().is_empty());
        assert_eq!(service.get_env("WIREKIT_TEST_UNSET_KEY", "example"), "example");
    }

    #[test]
    fn module_config_errors_are_typed() {
        let service = ConfigService::from_dir(Path::new("/nonexistent-dir"), provider());
        assert!(matches!(
            service.module_config::<serde_json::Value>("nothing"),
            Err(ConfigError::MissingModule(_))
        ));
    }
}
