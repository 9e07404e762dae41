//! # Wirekit - declarative module runtime
//!
//! Modules, providers and controllers are declared at load time through a
//! [`RegistryBuilder`]. [`Application::bootstrap`] then resolves the module
//! graph, instantiates every singleton in dependency order and compiles each
//! controller member into a request handler.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wirekit::{Application, Args, Deps, Injectable, ParamDescriptor, RegistryBuilder};
//!
//! struct UserService;
//! impl Injectable for UserService {
//!     fn construct(_: &mut Deps) -> anyhow::Result<Self> {
//!         Ok(UserService)
//!     }
//! }
//!
//! struct UserController {
//!     users: Arc<UserService>,
//! }
//!
//! impl UserController {
//!     async fn find(self: Arc<Self>, args: Args) -> anyhow::Result<String> {
//!         let id: String = args.parse(0)?;
//!         Ok(format!("user {id}"))
//!     }
//! }
//!
//! struct UserModule;
//!
//! fn register(b: &mut RegistryBuilder) {
//!     b.injectable::<UserService>();
//!     b.controller::<UserController>("/user", |c| {
//!         c.method("find", UserController::find, |m| {
//!             m.get("/:id").param(ParamDescriptor::path(0).key("id"))
//!         })
//!     });
//!     b.module::<UserModule>(|m| m.provider::<UserService>().controller::<UserController>());
//! }
//!
//! wirekit::inventory::submit! { wirekit::Registrator(register) }
//!
//! let app = Application::bootstrap::<UserModule>(RegistryBuilder::discover().build()?)?;
//! let router = app.router();
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Re-export inventory for user convenience
pub use inventory;

pub mod api;
pub mod contracts;
pub mod entities;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod type_ref;

pub use api::{
    Arg, Args, ErrorEnvelope, HttpException, HttpRequest, HttpResponse, MountedRoute, Next,
    ParamDescriptor, ParamSource, Payload, TypeHint, Verb,
};
pub use contracts::*;
pub use entities::{Deps, EntityCache};
pub use error::BootstrapError;
pub use graph::{ModuleGraphResolver, ModuleNode, ModuleTree};
pub use metadata::{MetaKey, MetaValue, MetadataStore};
pub use registry::{
    ControllerBuilder, MethodBuilder, ModuleBuilder, ModuleDescriptor, ProviderRegistry,
    Registrator, RegistryBuilder,
};
pub use runtime::{serve, Application, ShutdownOptions};
pub use type_ref::TypeRef;
