//! Demo modules. Each submodule registers itself through `inventory`.

pub mod article;
pub mod group;
pub mod tags;
pub mod user;

use std::sync::Arc;

use serde_json::{json, Value};
use wirekit::api::ValidationPipe;
use wirekit::{Args, Deps, Injectable, RegistryBuilder};
use wirekit_config::ConfigModule;

use crate::enhancers::{Logger, TokenGuard};

/// Global module carrying the application-wide enhancers.
pub struct CommonModule;

pub struct AppController;

impl Injectable for AppController {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(AppController)
    }
}

impl AppController {
    async fn health(self: Arc<Self>, _args: Args) -> anyhow::Result<Value> {
        Ok(json!({ "code": 200, "data": "ok" }))
    }
}

pub struct AppModule;

fn register(b: &mut RegistryBuilder) {
    b.middleware::<Logger>()
        .guard::<TokenGuard>()
        .pipe::<ValidationPipe>();
    b.module::<CommonModule>(|m| m.middleware::<Logger>().global());

    b.controller::<AppController>("/", |c| {
        c.method("health", AppController::health, |m| m.get("health"))
    });
    b.module::<AppModule>(|m| {
        m.import::<ConfigModule>()
            .import::<CommonModule>()
            .import::<user::UserModule>()
            .controller::<AppController>()
    });
}

wirekit::inventory::submit! { wirekit::Registrator(register) }
