//! Global configuration module.
//!
//! `ConfigModule` is global and exports `ConfigService`, so every module can
//! depend on it without importing anything.

mod service;

pub use service::ConfigService;

use std::sync::Arc;
use wirekit::RegistryBuilder;
use wirekit_bootstrap::AppConfigProvider;

pub struct ConfigModule;

/// Register `ConfigModule` with a service built on `config`.
pub fn register(b: &mut RegistryBuilder, config: AppConfigProvider) {
    register_with(b, Arc::new(ConfigService::new(Arc::new(config))));
}

/// Register `ConfigModule` around an already-built service.
pub fn register_with(b: &mut RegistryBuilder, service: Arc<ConfigService>) {
    b.instance(service);
    b.module::<ConfigModule>(|m| {
        m.provider::<ConfigService>()
            .export::<ConfigService>()
            .global()
    });
}
