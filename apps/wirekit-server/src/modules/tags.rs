use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wirekit::{Args, Deps, Injectable, RegistryBuilder};

/// Hands out short pseudo-random tags and counts them.
#[derive(Default)]
pub struct TagsService {
    issued: AtomicU64,
}

impl Injectable for TagsService {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        tracing::debug!("tags init");
        Ok(Self::default())
    }
}

impl TagsService {
    pub fn generate_tag(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let seed = chrono::Utc::now().timestamp_subsec_nanos() as u64;
        to_base36(seed.wrapping_mul(n).wrapping_add(n))
    }

    pub fn count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

pub(crate) fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub struct TagsController {
    service: Arc<TagsService>,
}

impl Injectable for TagsController {
    fn dependencies() -> Vec<wirekit::TypeRef> {
        vec![wirekit::TypeRef::of::<TagsService>()]
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self {
            service: deps.next()?,
        })
    }
}

impl TagsController {
    async fn random(self: Arc<Self>, _args: Args) -> anyhow::Result<String> {
        Ok(self.service.generate_tag())
    }
}

pub struct TagsModule;

fn register(b: &mut RegistryBuilder) {
    b.injectable::<TagsService>();
    b.controller::<TagsController>("tags", |c| {
        c.method("random", TagsController::random, |m| m.get("/random"))
    });
    b.module::<TagsModule>(|m| {
        m.provider::<TagsService>()
            .controller::<TagsController>()
            .export::<TagsService>()
    });
}

wirekit::inventory::submit! { wirekit::Registrator(register) }
