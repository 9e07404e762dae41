use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HttpException, HttpResponse, Payload};
use crate::contracts::ExceptionFilter;

/// Message of the envelope produced for unrecognized errors.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Uniform error body: `{code, msg, data: null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub msg: String,
    pub data: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn unknown() -> Self {
        Self::new(500, UNKNOWN_ERROR_MESSAGE)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "code": self.code,
            "msg": self.msg,
            "data": self.data,
        })
    }
}

impl From<&HttpException> for ErrorEnvelope {
    fn from(e: &HttpException) -> Self {
        Self::new(e.status, e.message.clone())
    }
}

/// Converts handler outcomes into responses.
#[derive(Clone, Default)]
pub struct ErrorMapper {
    filters: Vec<Arc<dyn ExceptionFilter>>,
}

impl ErrorMapper {
    pub fn new(filters: Vec<Arc<dyn ExceptionFilter>>) -> Self {
        Self { filters }
    }

    /// Filters get the first chance; then [`HttpException`] is recognized;
    /// anything else is masked as a 500.
    pub fn map(&self, err: &anyhow::Error) -> ErrorEnvelope {
        for filter in &self.filters {
            if let Some(e) = filter.catch(err) {
                return ErrorEnvelope::from(&e);
            }
        }
        if let Some(e) = err.downcast_ref::<HttpException>() {
            return ErrorEnvelope::from(e);
        }
        tracing::error!(error = ?err, "Unhandled error while serving request");
        ErrorEnvelope::unknown()
    }

    pub fn respond_error(&self, res: &HttpResponse, err: &anyhow::Error) {
        let envelope = self.map(err);
        if res.is_sent() {
            tracing::warn!(code = envelope.code, "Error after response was sent; dropped");
            return;
        }
        res.set_status(envelope.code);
        res.send(Payload::Json(envelope.to_value()));
    }

    /// Send a handler's result unless the handler already answered.
    pub fn respond_success(&self, res: &HttpResponse, value: Value) {
        if res.is_sent() {
            return;
        }
        res.send(Payload::from_value(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Teapot;
    impl ExceptionFilter for Teapot {
        fn catch(&self, err: &anyhow::Error) -> Option<HttpException> {
            err.downcast_ref::<std::io::Error>()
                .map(|_| HttpException::new(418, "teapot"))
        }
    }

    #[test]
    fn http_exception_maps_one_to_one() {
        let res = HttpResponse::new();
        let err = anyhow::Error::new(HttpException::not_found("X"));
        ErrorMapper::default().respond_error(&res, &err);

        let state = res.snapshot();
        assert_eq!(state.status(), 404);
        assert_eq!(
            state.payload,
            Some(Payload::Json(json!({"code": 404, "msg": "X", "data": null})))
        );
    }

    #[test]
    fn other_errors_are_masked() {
        let env = ErrorMapper::default().map(&anyhow::anyhow!("db password leaked"));
        assert_eq!(env, ErrorEnvelope::unknown());
        assert_eq!(
            env.to_value(),
            json!({"code": 500, "msg": "unknown error", "data": null})
        );
    }

    #[test]
    fn filters_run_first() {
        let mapper = ErrorMapper::new(vec![Arc::new(Teapot)]);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(mapper.map(&anyhow::Error::new(io)).code, 418);
        assert_eq!(
            mapper
                .map(&anyhow::Error::new(HttpException::conflict("dup")))
                .code,
            409
        );
    }

    #[test]
    fn strings_are_sent_as_text() {
        let res = HttpResponse::new();
        ErrorMapper::default().respond_success(&res, json!("hello"));
        assert_eq!(res.snapshot().payload, Some(Payload::Text("hello".into())));
    }
}
