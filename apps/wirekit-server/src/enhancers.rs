//! Cross-cutting enhancers of the demo application.

use std::sync::Arc;

use wirekit::{
    async_trait, Deps, Flow, Guard, HttpRequest, HttpResponse, Injectable, Middleware, TypeRef,
};
use wirekit_config::ConfigService;

/// Logs every request before it reaches a controller.
pub struct Logger;

impl Injectable for Logger {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Logger)
    }
}

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, req: &HttpRequest, _res: &HttpResponse) -> anyhow::Result<Flow> {
        tracing::info!(
            method = %req.method,
            path = %req.path,
            at = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "request"
        );
        Ok(Flow::Continue)
    }
}

/// Admits requests whose `token` header equals `APP_TOKEN` (default `123456`).
pub struct TokenGuard {
    expected: String,
}

impl Injectable for TokenGuard {
    fn dependencies() -> Vec<TypeRef> {
        vec![TypeRef::of::<ConfigService>()]
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
        let config: Arc<ConfigService> = deps.next()?;
        Ok(Self {
            expected: config.get_env("APP_TOKEN", "123456"),
        })
    }
}

#[async_trait]
impl Guard for TokenGuard {
    async fn can_activate(&self, req: &HttpRequest) -> anyhow::Result<bool> {
        let ok = req.header("token") == Some(self.expected.as_str());
        if !ok {
            tracing::debug!(path = %req.path, "token rejected");
        }
        Ok(ok)
    }
}
