use std::sync::atomic::{AtomicU64, Ordering};

use wirekit::{Deps, Injectable, RegistryBuilder};

#[derive(Default)]
pub struct GroupService {
    created: AtomicU64,
}

impl Injectable for GroupService {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

impl GroupService {
    pub fn generate_group(&self) -> String {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        format!("group-{n}")
    }

    pub fn count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

pub struct GroupModule;

fn register(b: &mut RegistryBuilder) {
    b.injectable::<GroupService>();
    b.module::<GroupModule>(|m| m.provider::<GroupService>().export::<GroupService>());
}

wirekit::inventory::submit! { wirekit::Registrator(register) }
