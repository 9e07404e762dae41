//! Request-side API: request/response handles, the parameter pipeline,
//! built-in pipes, error mapping and route binding.

pub mod error_mapper;
pub mod exception;
pub mod http;
pub mod params;
pub mod pipes;
pub mod route_binder;

pub use error_mapper::{ErrorEnvelope, ErrorMapper, UNKNOWN_ERROR_MESSAGE};
pub use exception::HttpException;
pub use self::http::{HttpRequest, HttpResponse, Next, Payload, ResponseState, Verb};
pub use params::{build_args, Arg, Args, BoundParam, ParamDescriptor, ParamSource, TypeHint};
pub use pipes::{DefaultValuePipe, ParseBoolPipe, ParseIntPipe, ValidationPipe};
pub use route_binder::{
    bind, join_paths, normalize_prefix, BoundHandler, ControllerDescriptor, Enhancers,
    MethodHandler, MountedRoute, RouteDescriptor,
};
