//! Load-time registration and the provider registry parsed from it.
//!
//! [`RegistryBuilder`] is the only writer of the [`MetadataStore`]. Crates can
//! feed it explicitly or submit a [`Registrator`] through `inventory` so that
//! [`RegistryBuilder::discover`] picks it up. [`ProviderRegistry`] is the frozen
//! result; every module and controller descriptor is parsed from it.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;

use crate::api::{
    join_paths, normalize_prefix, Args, ControllerDescriptor, MethodHandler, ParamDescriptor,
    RouteDescriptor, Verb,
};
use crate::contracts::{
    ExceptionFilter, FilterRef, Guard, GuardRef, Injectable, Instance, Interceptor,
    InterceptorRef, Middleware, MiddlewareRef, Pipe, PipeRef, ProviderDescriptor, ProviderKind,
};
use crate::entities::Deps;
use crate::error::BootstrapError;
use crate::metadata::{MetaKey, MetaValue, MetadataStore};
use crate::type_ref::TypeRef;

type Construct = Arc<dyn Fn(&mut Deps) -> anyhow::Result<Instance> + Send + Sync>;

/// Per-kind views of an entity, used to hand it out as an enhancer trait object.
#[derive(Clone, Copy, Default)]
pub(crate) struct Casts {
    pub pipe: Option<fn(&Instance) -> Option<Arc<dyn Pipe>>>,
    pub middleware: Option<fn(&Instance) -> Option<Arc<dyn Middleware>>>,
    pub guard: Option<fn(&Instance) -> Option<Arc<dyn Guard>>>,
    pub interceptor: Option<fn(&Instance) -> Option<Arc<dyn Interceptor>>>,
    pub filter: Option<fn(&Instance) -> Option<Arc<dyn ExceptionFilter>>>,
}

fn cast_pipe<T: Pipe>(i: &Instance) -> Option<Arc<dyn Pipe>> {
    Arc::clone(i).downcast::<T>().ok().map(|t| t as Arc<dyn Pipe>)
}

fn cast_middleware<T: Middleware>(i: &Instance) -> Option<Arc<dyn Middleware>> {
    Arc::clone(i)
        .downcast::<T>()
        .ok()
        .map(|t| t as Arc<dyn Middleware>)
}

fn cast_guard<T: Guard>(i: &Instance) -> Option<Arc<dyn Guard>> {
    Arc::clone(i).downcast::<T>().ok().map(|t| t as Arc<dyn Guard>)
}

fn cast_interceptor<T: Interceptor>(i: &Instance) -> Option<Arc<dyn Interceptor>> {
    Arc::clone(i)
        .downcast::<T>()
        .ok()
        .map(|t| t as Arc<dyn Interceptor>)
}

fn cast_filter<T: ExceptionFilter>(i: &Instance) -> Option<Arc<dyn ExceptionFilter>> {
    Arc::clone(i)
        .downcast::<T>()
        .ok()
        .map(|t| t as Arc<dyn ExceptionFilter>)
}

/// Constructor of one component: declared dependencies plus the build function.
#[derive(Clone)]
pub struct Factory {
    pub(crate) dependencies: Vec<TypeRef>,
    pub(crate) construct: Construct,
    pub(crate) casts: Casts,
    /// Registered through `instance`; cannot take enhancer roles.
    pub(crate) prebuilt: bool,
}

impl Factory {
    fn injectable<T: Injectable>() -> Self {
        Self {
            dependencies: T::dependencies(),
            construct: Arc::new(|deps: &mut Deps| {
                let value = T::construct(deps)?;
                Ok(Arc::new(value) as Instance)
            }),
            casts: Casts::default(),
            prebuilt: false,
        }
    }

    fn value<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        let value: Instance = value;
        Self {
            dependencies: Vec::new(),
            construct: Arc::new(move |_: &mut Deps| Ok(Arc::clone(&value))),
            casts: Casts::default(),
            prebuilt: true,
        }
    }

    pub fn dependencies(&self) -> &[TypeRef] {
        &self.dependencies
    }
}

/// Module declaration as registered; parsed into a [`ModuleDescriptor`].
#[derive(Clone, Debug, Default)]
pub struct ModuleConfig {
    pub controllers: Vec<TypeRef>,
    pub providers: Vec<ProviderDescriptor>,
    pub imports: Vec<TypeRef>,
    pub exports: Vec<TypeRef>,
}

/// Typed view of a registered module.
#[derive(Clone, Debug)]
pub struct ModuleDescriptor {
    pub type_ref: TypeRef,
    pub controllers: Vec<TypeRef>,
    pub providers: Vec<ProviderDescriptor>,
    pub imports: Vec<TypeRef>,
    pub exports: Vec<TypeRef>,
    pub is_global: bool,
}

impl ModuleDescriptor {
    pub fn name(&self) -> &'static str {
        self.type_ref.short_name()
    }

    pub fn provider(&self, ty: TypeRef) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.type_ref == ty)
    }
}

/// The function type submitted via `inventory::submit!`.
pub struct Registrator(pub fn(&mut RegistryBuilder));

inventory::collect!(Registrator);

/// Builder that fills the metadata store.
/// Conflicting registrations are collected and reported by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    store: MetadataStore,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registrator submitted through `inventory`.
    pub fn discover() -> Self {
        let mut b = Self::default();
        for r in ::inventory::iter::<Registrator> {
            r.0(&mut b);
        }
        b
    }

    /// Register a component constructed from its declared dependencies.
    pub fn injectable<T: Injectable>(&mut self) -> &mut Self {
        let ty = TypeRef::of::<T>();
        if self.store.has(ty, None, MetaKey::Factory) {
            self.errors
                .push(format!("Provider '{}' is already registered", ty.name()));
            return self;
        }
        self.store.define(
            ty,
            None,
            MetaKey::Factory,
            MetaValue::Factory(Factory::injectable::<T>()),
        );
        self
    }

    /// Register a pre-built value. It is handed out as-is by the entity cache.
    pub fn instance<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        let ty = TypeRef::of::<T>();
        if self.store.has(ty, None, MetaKey::Factory) {
            self.errors
                .push(format!("Provider '{}' is already registered", ty.name()));
            return self;
        }
        self.store.define(
            ty,
            None,
            MetaKey::Factory,
            MetaValue::Factory(Factory::value(value)),
        );
        self
    }

    pub fn pipe<T: Pipe + Injectable>(&mut self) -> &mut Self {
        if let Some(casts) = self.factory_casts::<T>("pipe") {
            casts.pipe = Some(cast_pipe::<T>);
        }
        self
    }

    pub fn middleware<T: Middleware + Injectable>(&mut self) -> &mut Self {
        if let Some(casts) = self.factory_casts::<T>("middleware") {
            casts.middleware = Some(cast_middleware::<T>);
        }
        self
    }

    pub fn guard<T: Guard + Injectable>(&mut self) -> &mut Self {
        if let Some(casts) = self.factory_casts::<T>("guard") {
            casts.guard = Some(cast_guard::<T>);
        }
        self
    }

    pub fn interceptor<T: Interceptor + Injectable>(&mut self) -> &mut Self {
        if let Some(casts) = self.factory_casts::<T>("interceptor") {
            casts.interceptor = Some(cast_interceptor::<T>);
        }
        self
    }

    pub fn filter<T: ExceptionFilter + Injectable>(&mut self) -> &mut Self {
        if let Some(casts) = self.factory_casts::<T>("filter") {
            casts.filter = Some(cast_filter::<T>);
        }
        self
    }

    /// Factory casts of `T` for a role registration. Roles add to an injectable
    /// factory (creating it if needed); a pre-built instance takes none.
    fn factory_casts<T: Injectable>(&mut self, role: &str) -> Option<&mut Casts> {
        let ty = TypeRef::of::<T>();
        if matches!(
            self.store.get(ty, None, MetaKey::Factory),
            Some(MetaValue::Factory(f)) if f.prebuilt
        ) {
            self.errors.push(format!(
                "Provider '{}' is registered as an instance and cannot be a {role}",
                ty.name()
            ));
            return None;
        }
        if !self.store.has(ty, None, MetaKey::Factory) {
            self.store.define(
                ty,
                None,
                MetaKey::Factory,
                MetaValue::Factory(Factory::injectable::<T>()),
            );
        }
        match self.store.get_mut(ty, None, MetaKey::Factory) {
            Some(MetaValue::Factory(f)) => Some(&mut f.casts),
            _ => None,
        }
    }

    /// Declare module `M`.
    pub fn module<M: 'static>(&mut self, f: impl FnOnce(ModuleBuilder) -> ModuleBuilder) -> &mut Self {
        let ty = TypeRef::of::<M>();
        if self.store.has(ty, None, MetaKey::Module) {
            self.errors
                .push(format!("Module '{}' is already registered", ty.name()));
            return self;
        }
        let built = f(ModuleBuilder::default());
        self.store
            .define(ty, None, MetaKey::Module, MetaValue::Module(built.config));
        if built.global {
            self.store
                .define(ty, None, MetaKey::Global, MetaValue::Flag(true));
        }
        self
    }

    /// Declare controller `C` mounted under `prefix`. The controller itself is
    /// registered as injectable.
    pub fn controller<C: Injectable>(
        &mut self,
        prefix: &str,
        f: impl FnOnce(ControllerBuilder<C>) -> ControllerBuilder<C>,
    ) -> &mut Self {
        let ty = TypeRef::of::<C>();
        if self.store.has(ty, None, MetaKey::Controller) {
            self.errors
                .push(format!("Controller '{}' is already registered", ty.name()));
            return self;
        }
        self.factory_casts::<C>("controller");

        let built = f(ControllerBuilder::new(prefix));
        self.errors.extend(built.errors);

        let store = &mut self.store;
        store.define(
            ty,
            None,
            MetaKey::Controller,
            MetaValue::Prefix(built.prefix),
        );
        store.define(
            ty,
            None,
            MetaKey::Members,
            MetaValue::Members(built.members.iter().map(|m| m.name).collect()),
        );
        store.define(ty, None, MetaKey::Middlewares, MetaValue::Middlewares(built.middlewares));
        store.define(ty, None, MetaKey::Guards, MetaValue::Guards(built.guards));
        store.define(ty, None, MetaKey::Pipes, MetaValue::Pipes(built.pipes));
        store.define(ty, None, MetaKey::Interceptors, MetaValue::Interceptors(built.interceptors));
        store.define(ty, None, MetaKey::Filters, MetaValue::Filters(built.filters));

        for member in built.members {
            let name = Some(member.name);
            let route = member.route;
            store.define(ty, name, MetaKey::Handler, MetaValue::Handler(member.handler));
            if let Some(verb) = route.verb {
                store.define(ty, name, MetaKey::RouteVerb, MetaValue::Verb(verb));
                store.define(ty, name, MetaKey::RoutePath, MetaValue::Path(route.path));
            }
            if let Some(code) = route.status {
                store.define(ty, name, MetaKey::HttpStatus, MetaValue::Status(code));
            }
            store.define(ty, name, MetaKey::Params, MetaValue::Params(route.params));
            store.define(ty, name, MetaKey::Middlewares, MetaValue::Middlewares(route.middlewares));
            store.define(ty, name, MetaKey::Guards, MetaValue::Guards(route.guards));
            store.define(ty, name, MetaKey::Pipes, MetaValue::Pipes(route.pipes));
            store.define(ty, name, MetaKey::Interceptors, MetaValue::Interceptors(route.interceptors));
        }
        self
    }

    /// Freeze the store.
    pub fn build(self) -> Result<ProviderRegistry, BootstrapError> {
        if !self.errors.is_empty() {
            return Err(BootstrapError::InvalidRegistryConfiguration {
                errors: self.errors,
            });
        }
        tracing::debug!(entries = self.store.len(), "Metadata store frozen");
        Ok(ProviderRegistry { store: self.store })
    }
}

/// Declarative module configuration.
#[derive(Default)]
pub struct ModuleBuilder {
    config: ModuleConfig,
    global: bool,
}

impl ModuleBuilder {
    pub fn controller<C: 'static>(mut self) -> Self {
        push_unique(&mut self.config.controllers, TypeRef::of::<C>());
        self
    }

    /// Add a provider of kind `Service`.
    pub fn provider<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Service, TypeRef::of::<T>())
    }

    pub fn pipe<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Pipe, TypeRef::of::<T>())
    }

    pub fn middleware<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Middleware, TypeRef::of::<T>())
    }

    pub fn guard<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Guard, TypeRef::of::<T>())
    }

    pub fn interceptor<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Interceptor, TypeRef::of::<T>())
    }

    pub fn filter<T: 'static>(self) -> Self {
        self.provide(ProviderKind::Filter, TypeRef::of::<T>())
    }

    pub fn provide(mut self, kind: ProviderKind, type_ref: TypeRef) -> Self {
        if !self.config.providers.iter().any(|p| p.type_ref == type_ref) {
            self.config
                .providers
                .push(ProviderDescriptor::new(kind, type_ref));
        }
        self
    }

    pub fn import<M: 'static>(mut self) -> Self {
        push_unique(&mut self.config.imports, TypeRef::of::<M>());
        self
    }

    /// Export a provider, or re-export an imported module.
    pub fn export<T: 'static>(mut self) -> Self {
        push_unique(&mut self.config.exports, TypeRef::of::<T>());
        self
    }

    /// Make the module's exports visible to every module in the tree.
    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

fn push_unique(list: &mut Vec<TypeRef>, ty: TypeRef) {
    if !list.contains(&ty) {
        list.push(ty);
    }
}

struct Member {
    name: &'static str,
    handler: MethodHandler,
    route: MethodBuilder,
}

/// Declarative controller configuration: class-level enhancers plus members.
pub struct ControllerBuilder<C> {
    prefix: String,
    members: Vec<Member>,
    middlewares: Vec<MiddlewareRef>,
    guards: Vec<GuardRef>,
    pipes: Vec<PipeRef>,
    interceptors: Vec<InterceptorRef>,
    filters: Vec<FilterRef>,
    errors: Vec<String>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            members: Vec::new(),
            middlewares: Vec::new(),
            guards: Vec::new(),
            pipes: Vec::new(),
            interceptors: Vec::new(),
            filters: Vec::new(),
            errors: Vec::new(),
            _controller: PhantomData,
        }
    }

    /// Register member `name`. It becomes a route only if `configure` sets a verb.
    pub fn method<F, Fut, R>(
        mut self,
        name: &'static str,
        handler: F,
        configure: impl FnOnce(MethodBuilder) -> MethodBuilder,
    ) -> Self
    where
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + 'static,
    {
        if self.members.iter().any(|m| m.name == name) {
            self.errors.push(format!(
                "Member '{}' of controller '{}' is already registered",
                name,
                std::any::type_name::<C>()
            ));
            return self;
        }

        let handler: MethodHandler = Arc::new(move |instance: Instance, args: Args| {
            match instance.downcast::<C>() {
                Ok(controller) => {
                    let fut = handler(controller, args);
                    async move {
                        let out = fut.await?;
                        Ok(serde_json::to_value(out)?)
                    }
                    .boxed()
                }
                Err(_) => async move {
                    Err(anyhow::anyhow!(
                        "controller instance is not a '{}'",
                        std::any::type_name::<C>()
                    ))
                }
                .boxed(),
            }
        });

        self.members.push(Member {
            name,
            handler,
            route: configure(MethodBuilder::default()),
        });
        self
    }

    pub fn use_middleware(mut self, m: impl Into<MiddlewareRef>) -> Self {
        self.middlewares.push(m.into());
        self
    }

    pub fn use_guard(mut self, g: impl Into<GuardRef>) -> Self {
        self.guards.push(g.into());
        self
    }

    pub fn use_pipe(mut self, p: impl Into<PipeRef>) -> Self {
        self.pipes.push(p.into());
        self
    }

    pub fn use_interceptor(mut self, i: impl Into<InterceptorRef>) -> Self {
        self.interceptors.push(i.into());
        self
    }

    pub fn use_filter(mut self, f: impl Into<FilterRef>) -> Self {
        self.filters.push(f.into());
        self
    }
}

/// Per-member route metadata.
#[derive(Default)]
pub struct MethodBuilder {
    verb: Option<Verb>,
    path: String,
    params: Vec<ParamDescriptor>,
    status: Option<u16>,
    middlewares: Vec<MiddlewareRef>,
    guards: Vec<GuardRef>,
    pipes: Vec<PipeRef>,
    interceptors: Vec<InterceptorRef>,
}

impl MethodBuilder {
    pub fn route(mut self, verb: Verb, path: impl Into<String>) -> Self {
        self.verb = Some(verb);
        self.path = path.into();
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.route(Verb::Get, path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.route(Verb::Post, path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.route(Verb::Put, path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.route(Verb::Patch, path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.route(Verb::Delete, path)
    }

    pub fn param(mut self, p: ParamDescriptor) -> Self {
        self.params.push(p);
        self
    }

    /// Fixed success status code.
    pub fn status(mut self, code: u16) -> Self {
        self.status = Some(code);
        self
    }

    pub fn use_middleware(mut self, m: impl Into<MiddlewareRef>) -> Self {
        self.middlewares.push(m.into());
        self
    }

    pub fn use_guard(mut self, g: impl Into<GuardRef>) -> Self {
        self.guards.push(g.into());
        self
    }

    pub fn use_pipe(mut self, p: impl Into<PipeRef>) -> Self {
        self.pipes.push(p.into());
        self
    }

    pub fn use_interceptor(mut self, i: impl Into<InterceptorRef>) -> Self {
        self.interceptors.push(i.into());
        self
    }
}

/// Frozen metadata plus the parsers producing typed descriptors from it.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    store: MetadataStore,
}

impl ProviderRegistry {
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn is_module(&self, ty: TypeRef) -> bool {
        self.store.has(ty, None, MetaKey::Module)
    }

    pub fn is_global(&self, ty: TypeRef) -> bool {
        matches!(
            self.store.get(ty, None, MetaKey::Global),
            Some(MetaValue::Flag(true))
        )
    }

    pub fn factory(&self, ty: TypeRef) -> Option<&Factory> {
        match self.store.get(ty, None, MetaKey::Factory) {
            Some(MetaValue::Factory(f)) => Some(f),
            _ => None,
        }
    }

    pub fn module_descriptor(&self, ty: TypeRef) -> Result<ModuleDescriptor, BootstrapError> {
        let config = match self.store.get(ty, None, MetaKey::Module) {
            Some(MetaValue::Module(config)) => config.clone(),
            _ => return Err(BootstrapError::NotAModule(ty.name())),
        };
        Ok(ModuleDescriptor {
            type_ref: ty,
            controllers: config.controllers,
            providers: config.providers,
            imports: config.imports,
            exports: config.exports,
            is_global: self.is_global(ty),
        })
    }

    pub fn controller_descriptor(
        &self,
        ty: TypeRef,
    ) -> Result<ControllerDescriptor, BootstrapError> {
        let prefix = match self.store.get(ty, None, MetaKey::Controller) {
            Some(MetaValue::Prefix(p)) => p.clone(),
            _ => return Err(BootstrapError::NotAController(ty.name())),
        };
        let members = match self.store.get(ty, None, MetaKey::Members) {
            Some(MetaValue::Members(m)) => m.clone(),
            _ => Vec::new(),
        };

        let mut routes = Vec::new();
        for member in members {
            let slot = Some(member);
            let verb = match self.store.get(ty, slot, MetaKey::RouteVerb) {
                Some(MetaValue::Verb(v)) => *v,
                _ => {
                    tracing::trace!(controller = %ty, member, "Member has no verb; not a route");
                    continue;
                }
            };
            let relative = match self.store.get(ty, slot, MetaKey::RoutePath) {
                Some(MetaValue::Path(p)) => p.as_str(),
                _ => "",
            };
            let handler = match self.store.get(ty, slot, MetaKey::Handler) {
                Some(MetaValue::Handler(h)) => Arc::clone(h),
                _ => {
                    return Err(BootstrapError::MissingHandler {
                        controller: ty.name(),
                        member,
                    })
                }
            };
            let status_code = match self.store.get(ty, slot, MetaKey::HttpStatus) {
                Some(MetaValue::Status(code)) => Some(*code),
                _ => None,
            };

            routes.push(RouteDescriptor {
                member,
                verb,
                path: join_paths(&[prefix.as_str(), relative]),
                params: match self.store.get(ty, slot, MetaKey::Params) {
                    Some(MetaValue::Params(p)) => p.clone(),
                    _ => Vec::new(),
                },
                status_code,
                middlewares: self.middlewares(ty, slot),
                guards: self.guards(ty, slot),
                pipes: self.pipes(ty, slot),
                interceptors: self.interceptors(ty, slot),
                handler,
            });
        }

        Ok(ControllerDescriptor {
            type_ref: ty,
            prefix,
            middlewares: self.middlewares(ty, None),
            guards: self.guards(ty, None),
            pipes: self.pipes(ty, None),
            interceptors: self.interceptors(ty, None),
            filters: match self.store.get(ty, None, MetaKey::Filters) {
                Some(MetaValue::Filters(f)) => f.clone(),
                _ => Vec::new(),
            },
            routes,
        })
    }

    fn middlewares(&self, ty: TypeRef, member: Option<&'static str>) -> Vec<MiddlewareRef> {
        match self.store.get(ty, member, MetaKey::Middlewares) {
            Some(MetaValue::Middlewares(m)) => m.clone(),
            _ => Vec::new(),
        }
    }

    fn guards(&self, ty: TypeRef, member: Option<&'static str>) -> Vec<GuardRef> {
        match self.store.get(ty, member, MetaKey::Guards) {
            Some(MetaValue::Guards(g)) => g.clone(),
            _ => Vec::new(),
        }
    }

    fn pipes(&self, ty: TypeRef, member: Option<&'static str>) -> Vec<PipeRef> {
        match self.store.get(ty, member, MetaKey::Pipes) {
            Some(MetaValue::Pipes(p)) => p.clone(),
            _ => Vec::new(),
        }
    }

    fn interceptors(&self, ty: TypeRef, member: Option<&'static str>) -> Vec<InterceptorRef> {
        match self.store.get(ty, member, MetaKey::Interceptors) {
            Some(MetaValue::Interceptors(i)) => i.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpException, TypeHint};
    use serde_json::Value;

    #[derive(Default)]
    struct Svc;
    impl Injectable for Svc {
        fn construct(_: &mut Deps) -> anyhow::Result<Self> {
            Ok(Svc)
        }
    }

    struct Ctl;
    impl Injectable for Ctl {
        fn construct(_: &mut Deps) -> anyhow::Result<Self> {
            Ok(Ctl)
        }
    }

    impl Ctl {
        async fn list(self: Arc<Self>, _args: Args) -> anyhow::Result<Vec<u32>> {
            Ok(vec![1, 2])
        }

        async fn helper(self: Arc<Self>, _args: Args) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Upper;
    impl Injectable for Upper {
        fn construct(_: &mut Deps) -> anyhow::Result<Self> {
            Ok(Upper)
        }
    }
    impl Pipe for Upper {
        fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
            Ok(value)
        }
    }

    struct ModA;
    struct ModB;

    #[test]
    fn module_descriptor_reflects_declaration() {
        let mut b = RegistryBuilder::new();
        b.injectable::<Svc>();
        b.module::<ModA>(|m| {
            m.provider::<Svc>()
                .provider::<Svc>()
                .import::<ModB>()
                .export::<Svc>()
                .global()
        });
        let reg = b.build().unwrap();

        let d = reg.module_descriptor(TypeRef::of::<ModA>()).unwrap();
        assert!(d.is_global);
        assert_eq!(d.providers.len(), 1, "providers dedup by identity");
        assert_eq!(d.providers[0].kind, ProviderKind::Service);
        assert_eq!(d.imports, vec![TypeRef::of::<ModB>()]);
        assert_eq!(d.exports, vec![TypeRef::of::<Svc>()]);
        assert_eq!(d.name(), "ModA");
    }

    #[test]
    fn missing_module_marker_names_the_type() {
        let reg = RegistryBuilder::new().build().unwrap();
        let err = reg.module_descriptor(TypeRef::of::<ModB>()).unwrap_err();
        match err {
            BootstrapError::NotAModule(name) => assert!(name.ends_with("ModB")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_module_reported_in_configuration_errors() {
        let mut b = RegistryBuilder::new();
        b.module::<ModA>(|m| m);
        b.module::<ModA>(|m| m);

        match b.build().unwrap_err() {
            BootstrapError::InvalidRegistryConfiguration { errors } => {
                assert!(
                    errors.iter().any(|e| e.contains("already registered")),
                    "expected duplicate registration error, got {errors:?}"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_instance_is_rejected() {
        let mut b = RegistryBuilder::new();
        b.instance(Arc::new(Svc));
        b.instance(Arc::new(Svc));
        assert!(matches!(
            b.build(),
            Err(BootstrapError::InvalidRegistryConfiguration { .. })
        ));
    }

    #[test]
    fn duplicate_injectable_is_rejected() {
        let mut b = RegistryBuilder::new();
        b.injectable::<Ctl>();
        b.injectable::<Ctl>();
        match b.build().unwrap_err() {
            BootstrapError::InvalidRegistryConfiguration { errors } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("already registered"), "{errors:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut b = RegistryBuilder::new();
        b.instance(Arc::new(Svc));
        b.injectable::<Svc>();
        assert!(b.build().is_err());
    }

    #[test]
    fn instance_cannot_take_an_enhancer_role() {
        let mut b = RegistryBuilder::new();
        b.instance(Arc::new(Upper));
        b.pipe::<Upper>();
        match b.build().unwrap_err() {
            BootstrapError::InvalidRegistryConfiguration { errors } => {
                assert!(errors[0].contains("cannot be a pipe"), "{errors:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn roles_merge_into_one_injectable_factory() {
        let mut b = RegistryBuilder::new();
        b.injectable::<Upper>().pipe::<Upper>().pipe::<Upper>();
        let reg = b.build().unwrap();
        let factory = reg.factory(TypeRef::of::<Upper>()).unwrap();
        assert!(factory.casts.pipe.is_some());
        assert!(factory.casts.guard.is_none());
    }

    #[test]
    fn members_without_verb_are_not_routes() {
        let mut b = RegistryBuilder::new();
        b.controller::<Ctl>("items", |c| {
            c.method("list", Ctl::list, |m| m.get("/all").status(201))
                .method("helper", Ctl::helper, |m| m)
        });
        let reg = b.build().unwrap();

        let d = reg.controller_descriptor(TypeRef::of::<Ctl>()).unwrap();
        assert_eq!(d.prefix, "/items");
        assert_eq!(d.routes.len(), 1);
        assert_eq!(d.routes[0].member, "list");
        assert_eq!(d.routes[0].path, "/items/all");
        assert_eq!(d.routes[0].status_code, Some(201));
        assert!(reg.factory(TypeRef::of::<Ctl>()).is_some());
    }

    #[test]
    fn duplicate_member_is_rejected() {
        let mut b = RegistryBuilder::new();
        b.controller::<Ctl>("/", |c| {
            c.method("list", Ctl::list, |m| m.get(""))
                .method("list", Ctl::list, |m| m.post(""))
        });
        assert!(b.build().is_err());
    }
}
