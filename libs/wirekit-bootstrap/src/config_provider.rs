use crate::config::{AppConfig, ConfigError};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Read access to loaded configuration for modules.
pub trait ConfigProvider: Send + Sync {
    /// Raw bag entry of one module.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;

    /// A global section ("server", "logging") as JSON.
    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value>;
}

/// Typed view over any provider's module entry.
pub fn module_config<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let raw = provider
        .get_module_config(module_name)
        .ok_or_else(|| ConfigError::MissingModule(module_name.to_string()))?;
    serde_json::from_value(raw.clone()).map_err(|source| ConfigError::InvalidModule {
        module: module_name.to_string(),
        source,
    })
}

/// `ConfigProvider` backed by an `AppConfig`.
#[derive(Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name)
    }

    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "server" => serde_json::to_value(&self.0.server).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}
