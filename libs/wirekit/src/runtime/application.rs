//! Bootstrap orchestration: resolve → instantiate → bind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{bind, ControllerDescriptor, Enhancers, MountedRoute, Verb};
use crate::contracts::{Enhancer, Instance, ProviderDescriptor, ProviderKind};
use crate::entities::EntityCache;
use crate::error::BootstrapError;
use crate::graph::{ModuleGraphResolver, ModuleTree, NodeId};
use crate::registry::ProviderRegistry;
use crate::transport::{check_route_path, route_shape};
use crate::type_ref::TypeRef;

/// A fully wired application: module tree, singleton entities and bound routes.
pub struct Application {
    registry: ProviderRegistry,
    tree: ModuleTree,
    entities: EntityCache,
    routes: Vec<MountedRoute>,
}

impl Application {
    /// Bootstrap with `M` as root module.
    pub fn bootstrap<M: 'static>(registry: ProviderRegistry) -> Result<Self, BootstrapError> {
        Self::bootstrap_root(registry, TypeRef::of::<M>())
    }

    pub fn bootstrap_root(
        registry: ProviderRegistry,
        root: TypeRef,
    ) -> Result<Self, BootstrapError> {
        tracing::info!(root = %root, "Phase: resolve");
        let tree = ModuleGraphResolver::new(&registry).resolve(root)?;
        tracing::info!(
            modules = tree.len(),
            globals = tree.globals().len(),
            "Module graph resolved"
        );

        tracing::info!("Phase: instantiate");
        let mut entities = EntityCache::new();
        let mut controllers: Vec<(NodeId, ControllerDescriptor, Instance)> = Vec::new();
        for id in tree.instantiation_order() {
            let node = tree.node(id);
            for p in &node.descriptor.providers {
                entities.resolve(&registry, p.type_ref, node.visible())?;
            }
            for &c in &node.descriptor.controllers {
                let descriptor = registry.controller_descriptor(c)?;
                let instance = entities.resolve(&registry, c, node.visible())?;
                controllers.push((id, descriptor, instance));
            }
            tracing::debug!(module = %node.type_ref(), "Module instantiated");
        }
        tracing::info!(entities = entities.len(), "Entities instantiated");

        tracing::info!("Phase: bind");
        let mut global = Enhancers::default();
        for &g in tree.globals() {
            let node = tree.node(g);
            let scope = module_enhancers(
                &registry,
                &mut entities,
                &node.descriptor.providers,
                node.visible(),
            )?;
            global = global.chain(&scope);
        }

        let mut routes = Vec::new();
        let mut seen: HashMap<(Verb, String), String> = HashMap::new();
        let mut shapes: HashMap<String, (String, String)> = HashMap::new();
        for (id, descriptor, instance) in controllers {
            let node = tree.node(id);
            let inherited = if node.descriptor.is_global {
                global.clone()
            } else {
                let own = module_enhancers(
                    &registry,
                    &mut entities,
                    &node.descriptor.providers,
                    node.visible(),
                )?;
                global.chain(&own)
            };

            for route in bind(
                &registry,
                &mut entities,
                &descriptor,
                instance,
                &inherited,
                node.visible(),
            )? {
                let owner = format!("{}::{}", descriptor.type_ref, route.handler.member());
                if let Err(reason) = check_route_path(&route.path) {
                    return Err(BootstrapError::InvalidRoutePath {
                        verb: route.verb,
                        path: route.path,
                        owner,
                        reason,
                    });
                }
                // Same shape, any verb: parameter names must match.
                let shape = route_shape(&route.path);
                match shapes.get(&shape) {
                    Some((existing, first)) if *existing != route.path => {
                        return Err(BootstrapError::ConflictingRoute {
                            path: route.path,
                            existing: existing.clone(),
                            first: first.clone(),
                            second: owner,
                        });
                    }
                    Some(_) => {}
                    None => {
                        shapes.insert(shape, (route.path.clone(), owner.clone()));
                    }
                }
                if let Some(first) = seen.insert((route.verb, route.path.clone()), owner.clone()) {
                    return Err(BootstrapError::DuplicateRoute {
                        verb: route.verb,
                        path: route.path,
                        first,
                        second: owner,
                    });
                }
                routes.push(route);
            }
        }
        tracing::info!(routes = routes.len(), "Application bootstrapped");

        Ok(Self {
            registry,
            tree,
            entities,
            routes,
        })
    }

    pub fn routes(&self) -> &[MountedRoute] {
        &self.routes
    }

    pub fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn entities(&self) -> &EntityCache {
        &self.entities
    }

    /// Singleton instance of `T`, if it was instantiated.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entities.get::<T>()
    }

    /// Axum router serving every bound route.
    pub fn router(&self) -> axum::Router {
        crate::transport::router(&self.routes)
    }
}

/// Enhancer providers of one module, by kind.
fn module_enhancers(
    registry: &ProviderRegistry,
    entities: &mut EntityCache,
    providers: &[ProviderDescriptor],
    visible: &[ProviderDescriptor],
) -> Result<Enhancers, BootstrapError> {
    let mut out = Enhancers::default();
    for p in providers {
        let r = p.type_ref;
        match p.kind {
            ProviderKind::Service => {}
            ProviderKind::Pipe => out
                .pipes
                .push(entities.pipe(registry, &Enhancer::Provider(r), visible)?),
            ProviderKind::Middleware => out
                .middlewares
                .push(entities.middleware(registry, &Enhancer::Provider(r), visible)?),
            ProviderKind::Guard => out
                .guards
                .push(entities.guard(registry, &Enhancer::Provider(r), visible)?),
            ProviderKind::Interceptor => out
                .interceptors
                .push(entities.interceptor(registry, &Enhancer::Provider(r), visible)?),
            ProviderKind::Filter => out
                .filters
                .push(entities.filter(registry, &Enhancer::Provider(r), visible)?),
        }
    }
    Ok(out)
}
