//! Metadata store: the immutable key-value table every descriptor is parsed from.
//!
//! Entries are keyed by `(target type, optional member, key)`. The store is
//! filled exclusively by [`RegistryBuilder`](crate::registry::RegistryBuilder)
//! at load time and is read-only once the registry is built.

use std::collections::HashMap;

use crate::api::{MethodHandler, ParamDescriptor, Verb};
use crate::contracts::{FilterRef, GuardRef, InterceptorRef, MiddlewareRef, PipeRef};
use crate::registry::{Factory, ModuleConfig};
use crate::type_ref::TypeRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// Module marker carrying the declared module configuration.
    Module,
    /// Global module flag.
    Global,
    /// Constructor factory of an injectable component.
    Factory,
    /// Controller marker carrying the class-level path prefix.
    Controller,
    /// Ordered list of registered controller members.
    Members,
    RouteVerb,
    RoutePath,
    Params,
    HttpStatus,
    Handler,
    Middlewares,
    Guards,
    Pipes,
    Interceptors,
    Filters,
}

#[derive(Clone)]
pub enum MetaValue {
    Module(ModuleConfig),
    Flag(bool),
    Factory(Factory),
    Prefix(String),
    Members(Vec<&'static str>),
    Verb(Verb),
    Path(String),
    Params(Vec<ParamDescriptor>),
    Status(u16),
    Handler(MethodHandler),
    Middlewares(Vec<MiddlewareRef>),
    Guards(Vec<GuardRef>),
    Pipes(Vec<PipeRef>),
    Interceptors(Vec<InterceptorRef>),
    Filters(Vec<FilterRef>),
}

type Slot = (TypeRef, Option<&'static str>, MetaKey);

#[derive(Clone, Default)]
pub struct MetadataStore {
    entries: HashMap<Slot, MetaValue>,
}

impl MetadataStore {
    pub fn has(&self, target: TypeRef, member: Option<&'static str>, key: MetaKey) -> bool {
        self.entries.contains_key(&(target, member, key))
    }

    pub fn get(
        &self,
        target: TypeRef,
        member: Option<&'static str>,
        key: MetaKey,
    ) -> Option<&MetaValue> {
        self.entries.get(&(target, member, key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `value`, returning the previous value of the slot.
    pub(crate) fn define(
        &mut self,
        target: TypeRef,
        member: Option<&'static str>,
        key: MetaKey,
        value: MetaValue,
    ) -> Option<MetaValue> {
        self.entries.insert((target, member, key), value)
    }

    pub(crate) fn get_mut(
        &mut self,
        target: TypeRef,
        member: Option<&'static str>,
        key: MetaKey,
    ) -> Option<&mut MetaValue> {
        self.entries.get_mut(&(target, member, key))
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Target;

    #[test]
    fn lookups_are_scoped_by_member() {
        let mut store = MetadataStore::default();
        let t = TypeRef::of::<Target>();
        store.define(t, None, MetaKey::Controller, MetaValue::Prefix("/a".into()));
        store.define(t, Some("list"), MetaKey::RouteVerb, MetaValue::Verb(Verb::Get));

        assert!(store.has(t, None, MetaKey::Controller));
        assert!(!store.has(t, Some("list"), MetaKey::Controller));
        assert!(store.has(t, Some("list"), MetaKey::RouteVerb));
        assert!(!store.has(t, None, MetaKey::RouteVerb));
        assert!(matches!(
            store.get(t, Some("list"), MetaKey::RouteVerb),
            Some(MetaValue::Verb(Verb::Get))
        ));
    }

    #[test]
    fn define_returns_previous_value() {
        let mut store = MetadataStore::default();
        let t = TypeRef::of::<Target>();
        assert!(store
            .define(t, None, MetaKey::Global, MetaValue::Flag(true))
            .is_none());
        assert!(store
            .define(t, None, MetaKey::Global, MetaValue::Flag(false))
            .is_some());
        assert_eq!(store.len(), 1);
    }
}
