use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use wirekit::{Args, Deps, HttpException, Injectable, RegistryBuilder, TypeRef};
use wirekit_config::ConfigService;

use super::group::{GroupModule, GroupService};
use super::tags::{TagsModule, TagsService};

/// Bag entry `modules.articles`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArticlesConfig {
    #[serde(default)]
    counts: HashMap<String, u64>,
}

pub struct ArticleService {
    tags: Arc<TagsService>,
    group: Arc<GroupService>,
    counts: HashMap<String, u64>,
    written: AtomicU64,
}

impl Injectable for ArticleService {
    fn dependencies() -> Vec<TypeRef> {
        vec![
            TypeRef::of::<TagsService>(),
            TypeRef::of::<GroupService>(),
            TypeRef::of::<ConfigService>(),
        ]
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
        let tags: Arc<TagsService> = deps.next()?;
        let group: Arc<GroupService> = deps.next()?;
        let config: Arc<ConfigService> = deps.next()?;
        let cfg = config
            .module_config::<ArticlesConfig>("articles")
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "articles: using built-in counts");
                ArticlesConfig::default()
            });
        let counts = if cfg.counts.is_empty() {
            [("admin", 33), ("test", 22), ("user", 11)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        } else {
            cfg.counts
        };
        Ok(Self {
            tags,
            group,
            counts,
            written: AtomicU64::new(0),
        })
    }
}

impl ArticleService {
    pub fn create_article(&self) -> Value {
        let tags = [self.tags.generate_tag(), self.tags.generate_tag()];
        let group = self.group.generate_group();
        let n = self.written.fetch_add(1, Ordering::Relaxed) + 1;
        json!({
            "tags": tags,
            "group": group,
            "title": format!("article-{n}"),
            "content": super::tags::to_base36(n * 1_000_003),
            "count": {
                "tags": self.tags.count(),
                "group": self.group.count(),
                "count": n,
            },
        })
    }

    pub fn count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn count_articles(&self, name: &str) -> Result<u64, HttpException> {
        self.counts
            .get(name)
            .copied()
            .ok_or_else(|| HttpException::not_found(format!("user {name} not found")))
    }
}

pub struct ArticleController {
    service: Arc<ArticleService>,
}

impl Injectable for ArticleController {
    fn dependencies() -> Vec<TypeRef> {
        vec![TypeRef::of::<ArticleService>()]
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self {
            service: deps.next()?,
        })
    }
}

impl ArticleController {
    async fn create(self: Arc<Self>, _args: Args) -> anyhow::Result<Value> {
        Ok(self.service.create_article())
    }
}

pub struct ArticleModule;

fn register(b: &mut RegistryBuilder) {
    b.injectable::<ArticleService>();
    b.controller::<ArticleController>("articles", |c| {
        c.method("create", ArticleController::create, |m| m.get("create"))
    });
    b.module::<ArticleModule>(|m| {
        m.import::<TagsModule>()
            .import::<GroupModule>()
            .controller::<ArticleController>()
            .provider::<ArticleService>()
            .export::<ArticleService>()
    });
}

wirekit::inventory::submit! { wirekit::Registrator(register) }
