use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{HttpException, HttpRequest, HttpResponse, TypeHint};
use crate::entities::Deps;
use crate::type_ref::TypeRef;

/// A type-erased singleton entity as stored in the entity cache.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Component constructed by the entity cache.
///
/// `dependencies` is the author-declared constructor parameter list. Every
/// listed type must be visible to the module that instantiates the component;
/// the resolved instances are handed to `construct` in the same order.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn dependencies() -> Vec<TypeRef> {
        Vec::new()
    }

    fn construct(deps: &mut Deps) -> anyhow::Result<Self>;
}

/// What role a provider plays once instantiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    Service,
    Pipe,
    Middleware,
    Guard,
    Interceptor,
    Filter,
}

/// A provider entry of a module declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub type_ref: TypeRef,
}

impl ProviderDescriptor {
    pub fn new(kind: ProviderKind, type_ref: TypeRef) -> Self {
        Self { kind, type_ref }
    }

    pub fn service(type_ref: TypeRef) -> Self {
        Self::new(ProviderKind::Service, type_ref)
    }
}

impl From<TypeRef> for ProviderDescriptor {
    fn from(type_ref: TypeRef) -> Self {
        Self::service(type_ref)
    }
}

/// Value transformer applied to a handler argument before the handler runs.
pub trait Pipe: Send + Sync + 'static {
    fn transform(&self, value: Value, hint: &TypeHint) -> Result<Value, HttpException>;
}

/// Outcome of a middleware step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The middleware answered the request itself; nothing after it runs.
    Halt,
}

#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: &HttpRequest, res: &HttpResponse) -> anyhow::Result<Flow>;
}

/// Gate evaluated after middlewares; `false` rejects the request with 403.
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    async fn can_activate(&self, req: &HttpRequest) -> anyhow::Result<bool>;
}

/// Post-processes a successful handler result.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, req: &HttpRequest, value: Value) -> anyhow::Result<Value>;
}

/// Translates arbitrary handler errors into HTTP exceptions.
pub trait ExceptionFilter: Send + Sync + 'static {
    fn catch(&self, err: &anyhow::Error) -> Option<HttpException>;
}

/// Reference to an enhancer: either a registered provider type, resolved
/// through the entity cache at bind time, or a ready instance.
pub enum Enhancer<T: ?Sized> {
    Provider(TypeRef),
    Instance(Arc<T>),
}

impl<T: ?Sized> Enhancer<T> {
    pub fn provider<P: 'static>() -> Self {
        Enhancer::Provider(TypeRef::of::<P>())
    }

    pub fn instance(value: Arc<T>) -> Self {
        Enhancer::Instance(value)
    }
}

impl<T: ?Sized> Clone for Enhancer<T> {
    fn clone(&self) -> Self {
        match self {
            Enhancer::Provider(t) => Enhancer::Provider(*t),
            Enhancer::Instance(i) => Enhancer::Instance(Arc::clone(i)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Enhancer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enhancer::Provider(t) => f.debug_tuple("Provider").field(t).finish(),
            Enhancer::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

pub type PipeRef = Enhancer<dyn Pipe>;
pub type MiddlewareRef = Enhancer<dyn Middleware>;
pub type GuardRef = Enhancer<dyn Guard>;
pub type InterceptorRef = Enhancer<dyn Interceptor>;
pub type FilterRef = Enhancer<dyn ExceptionFilter>;

impl<P: Pipe> From<P> for PipeRef {
    fn from(p: P) -> Self {
        Enhancer::Instance(Arc::new(p))
    }
}

impl<M: Middleware> From<M> for MiddlewareRef {
    fn from(m: M) -> Self {
        Enhancer::Instance(Arc::new(m))
    }
}

impl<G: Guard> From<G> for GuardRef {
    fn from(g: G) -> Self {
        Enhancer::Instance(Arc::new(g))
    }
}

impl<I: Interceptor> From<I> for InterceptorRef {
    fn from(i: I) -> Self {
        Enhancer::Instance(Arc::new(i))
    }
}

impl<F: ExceptionFilter> From<F> for FilterRef {
    fn from(f: F) -> Self {
        Enhancer::Instance(Arc::new(f))
    }
}
