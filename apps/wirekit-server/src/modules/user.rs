use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use wirekit::api::{ParseIntPipe, ValidationPipe};
use wirekit::{
    Args, Deps, GuardRef, HttpException, Injectable, ParamDescriptor, PipeRef, RegistryBuilder,
    TypeHint, TypeRef,
};
use wirekit_config::ConfigService;

use super::article::{ArticleModule, ArticleService};
use crate::enhancers::TokenGuard;

#[derive(Default)]
pub struct UserService {
    calls: AtomicU64,
}

impl Injectable for UserService {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

impl UserService {
    pub async fn login(&self, name: &str, pwd: &str) -> Result<bool, HttpException> {
        if name == "error" {
            return Err(self.not_found());
        }
        Ok(name == "test" && pwd == "123")
    }

    /// Returns the current count, then increments it.
    pub fn count(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed)
    }

    pub fn not_found(&self) -> HttpException {
        HttpException::not_found("Not Found User!")
    }
}

pub struct UserController {
    service: Arc<UserService>,
    articles: Arc<ArticleService>,
    config: Arc<ConfigService>,
}

impl Injectable for UserController {
    fn dependencies() -> Vec<TypeRef> {
        vec![
            TypeRef::of::<UserService>(),
            TypeRef::of::<ArticleService>(),
            TypeRef::of::<ConfigService>(),
        ]
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self {
            service: deps.next()?,
            articles: deps.next()?,
            config: deps.next()?,
        })
    }
}

fn query_str(args: &Args, index: usize) -> String {
    args.value(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl UserController {
    async fn login(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        let (name, pwd) = (query_str(&args, 0), query_str(&args, 1));
        let pass = self.service.login(&name, &pwd).await?;
        Ok(json!({
            "code": 200,
            "data": "login",
            "count": self.service.count(),
            "msg": if pass { "success" } else { "failure" },
        }))
    }

    async fn articles(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        let name = query_str(&args, 0);
        let articles = self.articles.count_articles(&name)?;
        Ok(json!({
            "name": name,
            "count": self.articles.count(),
            "articles": articles,
        }))
    }

    async fn info(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        Ok(json!({ "userInfo": args.value(0).cloned().unwrap_or(Value::Null) }))
    }

    async fn version(self: Arc<Self>, _args: Args) -> anyhow::Result<String> {
        let version = self.config.get_env("VERSION", "example");
        let author = self.config.get_env("AUTHOR", "example");
        Ok(format!("version={version} and author={author}"))
    }

    async fn find(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        let id: i64 = args.parse(0)?;
        if id < 0 {
            return Err(HttpException::bad_request("id must be a number").into());
        }
        Ok(json!({ "id": id }))
    }
}

pub struct UserModule;

fn register(b: &mut RegistryBuilder) {
    b.injectable::<UserService>();
    b.controller::<UserController>("user", |c| {
        c.method("login", UserController::login, |m| {
            m.get("login")
                .param(ParamDescriptor::query(0).key("name"))
                .param(ParamDescriptor::query(1).key("pwd"))
        })
        .method("articles", UserController::articles, |m| {
            m.get("articles").param(ParamDescriptor::query(0).key("name"))
        })
        .method("info", UserController::info, |m| {
            m.post("info").param(
                ParamDescriptor::body(0)
                    .hint(TypeHint::Object)
                    .pipe(PipeRef::provider::<ValidationPipe>()),
            )
        })
        .method("version", UserController::version, |m| m.get("version"))
        .method("find", UserController::find, |m| {
            m.get("/:id")
                .param(ParamDescriptor::path(0).key("id").pipe(ParseIntPipe::new()))
                .use_guard(GuardRef::provider::<TokenGuard>())
        })
    });
    b.module::<UserModule>(|m| {
        m.import::<ArticleModule>()
            .controller::<UserController>()
            .provider::<UserService>()
    });
}

wirekit::inventory::submit! { wirekit::Registrator(register) }
