use thiserror::Error;

use crate::api::Verb;
use crate::contracts::ProviderKind;

/// Structured bootstrap errors. Every variant is fatal: the application must not start.
#[derive(Debug, Error)]
pub enum BootstrapError {
    // Registration errors
    #[error("invalid registry configuration:\n{errors:#?}")]
    InvalidRegistryConfiguration { errors: Vec<String> },
    #[error("'{0}' is not a module")]
    NotAModule(&'static str),
    #[error("'{0}' is not a controller")]
    NotAController(&'static str),
    #[error("no factory registered for '{0}'")]
    NoFactory(&'static str),
    #[error("module '{module}' exports '{export}' which it neither provides nor imports")]
    UnknownExport {
        module: &'static str,
        export: &'static str,
    },

    // Entity resolution errors
    #[error("{dependency} not in providers of {requester}: provider not available")]
    ProviderNotAvailable {
        requester: &'static str,
        dependency: &'static str,
    },
    #[error("circular constructor dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<&'static str> },
    #[error("construction of '{type_name}' failed")]
    Construct {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("entity '{type_name}' cannot be used as {expected:?}")]
    KindMismatch {
        type_name: &'static str,
        expected: ProviderKind,
    },

    // Route binding errors
    #[error("route {verb} {path} is bound twice ('{first}' and '{second}')")]
    DuplicateRoute {
        verb: Verb,
        path: String,
        first: String,
        second: String,
    },
    #[error("route {path} of '{second}' clashes with {existing} of '{first}': parameter names differ")]
    ConflictingRoute {
        path: String,
        existing: String,
        first: String,
        second: String,
    },
    #[error("route {verb} {path} of '{owner}' cannot be mounted: {reason}")]
    InvalidRoutePath {
        verb: Verb,
        path: String,
        owner: String,
        reason: String,
    },
    #[error("controller '{controller}' has no handler for member '{member}'")]
    MissingHandler {
        controller: &'static str,
        member: &'static str,
    },
}
