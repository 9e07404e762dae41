//! Route binding: compiles controller members into handlers bound to their instance.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{
    build_args, Args, BoundParam, ErrorMapper, HttpException, HttpRequest, HttpResponse, Next,
    ParamDescriptor, Verb,
};
use crate::contracts::{
    ExceptionFilter, FilterRef, Flow, Guard, GuardRef, Instance, Interceptor, InterceptorRef,
    Middleware, MiddlewareRef, Pipe, PipeRef, ProviderDescriptor,
};
use crate::entities::EntityCache;
use crate::error::BootstrapError;
use crate::registry::ProviderRegistry;
use crate::type_ref::TypeRef;

/// Type-erased controller member.
pub type MethodHandler =
    Arc<dyn Fn(Instance, Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Route metadata of one controller member.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub member: &'static str,
    pub verb: Verb,
    /// Full path: controller prefix joined with the member path.
    pub path: String,
    pub params: Vec<ParamDescriptor>,
    pub status_code: Option<u16>,
    pub middlewares: Vec<MiddlewareRef>,
    pub guards: Vec<GuardRef>,
    pub pipes: Vec<PipeRef>,
    pub interceptors: Vec<InterceptorRef>,
    pub handler: MethodHandler,
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("member", &self.member)
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("params", &self.params.len())
            .field("status_code", &self.status_code)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct ControllerDescriptor {
    pub type_ref: TypeRef,
    pub prefix: String,
    pub middlewares: Vec<MiddlewareRef>,
    pub guards: Vec<GuardRef>,
    pub pipes: Vec<PipeRef>,
    pub interceptors: Vec<InterceptorRef>,
    pub filters: Vec<FilterRef>,
    /// Members with verb metadata, in registration order.
    pub routes: Vec<RouteDescriptor>,
}

/// Join path fragments: backslashes become `/`, repeated separators collapse,
/// the result starts with `/` and has no trailing `/` unless it is the root.
pub fn join_paths(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.replace('\\', "/"))
        .collect::<Vec<_>>()
        .join("/");
    let segments: Vec<&str> = joined.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

pub fn normalize_prefix(prefix: &str) -> String {
    join_paths(&[prefix])
}

/// Resolved enhancers of one scope (global modules, a module, ...).
#[derive(Clone, Default)]
pub struct Enhancers {
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub guards: Vec<Arc<dyn Guard>>,
    pub pipes: Vec<Arc<dyn Pipe>>,
    pub interceptors: Vec<Arc<dyn Interceptor>>,
    pub filters: Vec<Arc<dyn ExceptionFilter>>,
}

impl Enhancers {
    /// `self` followed by `other`.
    pub fn chain(&self, other: &Enhancers) -> Enhancers {
        let mut out = self.clone();
        out.middlewares.extend(other.middlewares.iter().cloned());
        out.guards.extend(other.guards.iter().cloned());
        out.pipes.extend(other.pipes.iter().cloned());
        out.interceptors.extend(other.interceptors.iter().cloned());
        out.filters.extend(other.filters.iter().cloned());
        out
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
            && self.guards.is_empty()
            && self.pipes.is_empty()
            && self.interceptors.is_empty()
            && self.filters.is_empty()
    }
}

/// A controller member compiled for dispatch. Built once, reused for every call.
pub struct BoundHandler {
    controller: TypeRef,
    member: &'static str,
    instance: Instance,
    handler: MethodHandler,
    params: Vec<BoundParam>,
    status_code: Option<u16>,
    middlewares: Vec<Arc<dyn Middleware>>,
    guards: Vec<Arc<dyn Guard>>,
    pipes: Vec<Arc<dyn Pipe>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    errors: ErrorMapper,
}

impl BoundHandler {
    pub fn controller(&self) -> TypeRef {
        self.controller
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    /// Serve one request. Errors never escape: they are written to `res`.
    pub async fn handle(&self, req: Arc<HttpRequest>, res: HttpResponse, next: Next) {
        if let Some(code) = self.status_code {
            res.set_status(code);
        }
        if let Err(err) = self.dispatch(&req, &res, &next).await {
            self.errors.respond_error(&res, &err);
        }
    }

    async fn dispatch(
        &self,
        req: &Arc<HttpRequest>,
        res: &HttpResponse,
        next: &Next,
    ) -> anyhow::Result<()> {
        for m in &self.middlewares {
            if m.handle(req, res).await? == Flow::Halt {
                tracing::debug!(controller = %self.controller, member = self.member, "Request halted by middleware");
                return Ok(());
            }
        }
        for g in &self.guards {
            if !g.can_activate(req).await? {
                return Err(HttpException::forbidden("Forbidden resource").into());
            }
        }

        let args = build_args(req, res, next, &self.params, &self.pipes)?;
        let mut value = (self.handler)(Arc::clone(&self.instance), args).await?;
        if next.was_called() && !res.is_sent() {
            tracing::trace!(member = self.member, "Handler passed control on");
            return Ok(());
        }
        for i in &self.interceptors {
            value = i.intercept(req, value).await?;
        }

        self.errors.respond_success(res, value);
        Ok(())
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("controller", &self.controller)
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

/// A (verb, path, handler) triple ready to be mounted on a transport.
#[derive(Clone, Debug)]
pub struct MountedRoute {
    pub verb: Verb,
    pub path: String,
    pub handler: Arc<BoundHandler>,
}

/// Compile every route of `controller` against its living `instance`.
///
/// `inherited` holds the enhancers of enclosing scopes; they run before the
/// controller's and the member's own. Enhancer providers are resolved through
/// `cache` with the owning module's visible list.
pub fn bind(
    registry: &ProviderRegistry,
    cache: &mut EntityCache,
    controller: &ControllerDescriptor,
    instance: Instance,
    inherited: &Enhancers,
    visible: &[ProviderDescriptor],
) -> Result<Vec<MountedRoute>, BootstrapError> {
    let class = resolve_scope(
        registry,
        cache,
        visible,
        &controller.middlewares,
        &controller.guards,
        &controller.pipes,
        &controller.interceptors,
    )?;
    let mut filters = inherited.filters.clone();
    for f in &controller.filters {
        filters.push(cache.filter(registry, f, visible)?);
    }
    // Filters declared closest to the controller are consulted first.
    filters.reverse();
    let errors = ErrorMapper::new(filters);
    let outer = inherited.chain(&class);

    let mut routes = Vec::with_capacity(controller.routes.len());
    for route in &controller.routes {
        let own = resolve_scope(
            registry,
            cache,
            visible,
            &route.middlewares,
            &route.guards,
            &route.pipes,
            &route.interceptors,
        )?;
        let scope = outer.chain(&own);

        let mut params = Vec::with_capacity(route.params.len());
        for p in &route.params {
            let mut pipes = Vec::with_capacity(p.pipes.len());
            for r in &p.pipes {
                pipes.push(cache.pipe(registry, r, visible)?);
            }
            params.push(BoundParam {
                source: p.source,
                index: p.index,
                property_key: p.property_key.clone(),
                type_hint: p.type_hint.clone(),
                pipes,
            });
        }

        tracing::debug!(
            verb = %route.verb,
            path = %route.path,
            controller = %controller.type_ref,
            member = route.member,
            "Route bound"
        );
        routes.push(MountedRoute {
            verb: route.verb,
            path: route.path.clone(),
            handler: Arc::new(BoundHandler {
                controller: controller.type_ref,
                member: route.member,
                instance: Arc::clone(&instance),
                handler: Arc::clone(&route.handler),
                params,
                status_code: route.status_code,
                middlewares: scope.middlewares,
                guards: scope.guards,
                pipes: scope.pipes,
                interceptors: scope.interceptors,
                errors: errors.clone(),
            }),
        });
    }
    Ok(routes)
}

fn resolve_scope(
    registry: &ProviderRegistry,
    cache: &mut EntityCache,
    visible: &[ProviderDescriptor],
    middlewares: &[MiddlewareRef],
    guards: &[GuardRef],
    pipes: &[PipeRef],
    interceptors: &[InterceptorRef],
) -> Result<Enhancers, BootstrapError> {
    let mut out = Enhancers::default();
    for m in middlewares {
        out.middlewares.push(cache.middleware(registry, m, visible)?);
    }
    for g in guards {
        out.guards.push(cache.guard(registry, g, visible)?);
    }
    for p in pipes {
        out.pipes.push(cache.pipe(registry, p, visible)?);
    }
    for i in interceptors {
        out.interceptors.push(cache.interceptor(registry, i, visible)?);
    }
    Ok(out)
}
