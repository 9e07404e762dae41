//! Singleton entity cache with visibility-checked constructor injection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::anyhow;

use crate::contracts::{
    Enhancer, ExceptionFilter, Guard, Instance, Interceptor, Middleware, Pipe,
    ProviderDescriptor, ProviderKind,
};
use crate::error::BootstrapError;
use crate::registry::{Casts, ProviderRegistry};
use crate::type_ref::TypeRef;

/// Resolved constructor dependencies, handed out in declaration order.
pub struct Deps {
    requester: TypeRef,
    items: VecDeque<(TypeRef, Instance)>,
}

impl Deps {
    pub(crate) fn new(requester: TypeRef, items: VecDeque<(TypeRef, Instance)>) -> Self {
        Self { requester, items }
    }

    /// Take the next declared dependency.
    pub fn next<T: Send + Sync + 'static>(&mut self) -> anyhow::Result<Arc<T>> {
        let (ty, instance) = self.items.pop_front().ok_or_else(|| {
            anyhow!(
                "'{}' takes more dependencies than it declares",
                self.requester
            )
        })?;
        instance.downcast::<T>().map_err(|_| {
            anyhow!(
                "dependency '{}' of '{}' is not a '{}'",
                ty,
                self.requester,
                std::any::type_name::<T>()
            )
        })
    }

    /// Take the declared dependency of type `T` regardless of position.
    pub fn get<T: Send + Sync + 'static>(&mut self) -> anyhow::Result<Arc<T>> {
        let wanted = TypeRef::of::<T>();
        let pos = self
            .items
            .iter()
            .position(|(ty, _)| *ty == wanted)
            .ok_or_else(|| anyhow!("'{}' does not declare '{}'", self.requester, wanted))?;
        let (_, instance) = self
            .items
            .remove(pos)
            .ok_or_else(|| anyhow!("dependency slot {pos} vanished"))?;
        instance
            .downcast::<T>()
            .map_err(|_| anyhow!("dependency '{}' has an unexpected type", wanted))
    }

    pub fn requester(&self) -> TypeRef {
        self.requester
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Map from component type to its single instance.
///
/// Filled during bootstrap only; afterwards instances are shared as `Arc`.
#[derive(Default)]
pub struct EntityCache {
    entities: HashMap<TypeRef, Instance>,
    resolving: Vec<TypeRef>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance of `ty`, constructing it and its dependencies on first use.
    ///
    /// Every dependency must appear in `visible`. A cached entity is returned
    /// without re-checking visibility.
    pub fn resolve(
        &mut self,
        registry: &ProviderRegistry,
        ty: TypeRef,
        visible: &[ProviderDescriptor],
    ) -> Result<Instance, BootstrapError> {
        if let Some(instance) = self.entities.get(&ty) {
            return Ok(Arc::clone(instance));
        }

        if let Some(pos) = self.resolving.iter().position(|t| *t == ty) {
            let mut path: Vec<&'static str> =
                self.resolving[pos..].iter().map(|t| t.short_name()).collect();
            path.push(ty.short_name());
            return Err(BootstrapError::CircularDependency { path });
        }

        let factory = registry
            .factory(ty)
            .ok_or(BootstrapError::NoFactory(ty.name()))?;

        self.resolving.push(ty);
        let built = self.construct(registry, ty, factory, visible);
        self.resolving.pop();
        let instance = built?;

        tracing::debug!(entity = %ty, "Entity constructed");
        self.entities.insert(ty, Arc::clone(&instance));
        Ok(instance)
    }

    fn construct(
        &mut self,
        registry: &ProviderRegistry,
        ty: TypeRef,
        factory: &crate::registry::Factory,
        visible: &[ProviderDescriptor],
    ) -> Result<Instance, BootstrapError> {
        let mut items = VecDeque::with_capacity(factory.dependencies.len());
        for dep in &factory.dependencies {
            if !visible.iter().any(|p| p.type_ref == *dep) {
                return Err(BootstrapError::ProviderNotAvailable {
                    requester: ty.short_name(),
                    dependency: dep.short_name(),
                });
            }
            let instance = self.resolve(registry, *dep, visible)?;
            items.push_back((*dep, instance));
        }

        let mut deps = Deps::new(ty, items);
        (factory.construct)(&mut deps).map_err(|source| BootstrapError::Construct {
            type_name: ty.name(),
            source,
        })
    }

    pub fn pipe(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<dyn Pipe>,
        visible: &[ProviderDescriptor],
    ) -> Result<Arc<dyn Pipe>, BootstrapError> {
        self.enhancer(registry, r, visible, ProviderKind::Pipe, |c| c.pipe)
    }

    pub fn middleware(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<dyn Middleware>,
        visible: &[ProviderDescriptor],
    ) -> Result<Arc<dyn Middleware>, BootstrapError> {
        self.enhancer(registry, r, visible, ProviderKind::Middleware, |c| {
            c.middleware
        })
    }

    pub fn guard(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<dyn Guard>,
        visible: &[ProviderDescriptor],
    ) -> Result<Arc<dyn Guard>, BootstrapError> {
        self.enhancer(registry, r, visible, ProviderKind::Guard, |c| c.guard)
    }

    pub fn interceptor(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<dyn Interceptor>,
        visible: &[ProviderDescriptor],
    ) -> Result<Arc<dyn Interceptor>, BootstrapError> {
        self.enhancer(registry, r, visible, ProviderKind::Interceptor, |c| {
            c.interceptor
        })
    }

    pub fn filter(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<dyn ExceptionFilter>,
        visible: &[ProviderDescriptor],
    ) -> Result<Arc<dyn ExceptionFilter>, BootstrapError> {
        self.enhancer(registry, r, visible, ProviderKind::Filter, |c| c.filter)
    }

    fn enhancer<T: ?Sized>(
        &mut self,
        registry: &ProviderRegistry,
        r: &Enhancer<T>,
        visible: &[ProviderDescriptor],
        expected: ProviderKind,
        pick: fn(&Casts) -> Option<fn(&Instance) -> Option<Arc<T>>>,
    ) -> Result<Arc<T>, BootstrapError> {
        let ty = match r {
            Enhancer::Instance(value) => return Ok(Arc::clone(value)),
            Enhancer::Provider(ty) => *ty,
        };
        let instance = self.resolve(registry, ty, visible)?;
        let mismatch = || BootstrapError::KindMismatch {
            type_name: ty.name(),
            expected,
        };
        let cast = registry
            .factory(ty)
            .and_then(|f| pick(&f.casts))
            .ok_or_else(mismatch)?;
        cast(&instance).ok_or_else(mismatch)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entities
            .get(&TypeRef::of::<T>())
            .and_then(|i| Arc::clone(i).downcast::<T>().ok())
    }

    pub fn get_by_ref(&self, ty: TypeRef) -> Option<Instance> {
        self.entities.get(&ty).cloned()
    }

    pub fn contains(&self, ty: TypeRef) -> bool {
        self.entities.contains_key(&ty)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
