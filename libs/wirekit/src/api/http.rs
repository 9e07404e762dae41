//! Transport-neutral request, response and continuation handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::Method;
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// HTTP verb a controller member is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request as seen by the parameter pipeline.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    /// Header names are lowercase.
    pub headers: Map<String, Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: Value::Null,
            query: Map::new(),
            params: Map::new(),
            headers: Map::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), Value::String(value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    /// Named request property, as selected by a keyed `Request` parameter.
    pub fn property(&self, key: &str) -> Option<Value> {
        match key {
            "method" => Some(Value::String(self.method.to_string())),
            "path" | "url" => Some(Value::String(self.path.clone())),
            "body" => Some(self.body.clone()),
            "query" => Some(Value::Object(self.query.clone())),
            "params" => Some(Value::Object(self.params.clone())),
            "headers" => Some(Value::Object(self.headers.clone())),
            _ => None,
        }
    }
}

/// Response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Strings are sent as text, everything else as JSON.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Payload::Text(s),
            other => Payload::Json(other),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResponseState {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub payload: Option<Payload>,
}

impl ResponseState {
    pub fn status(&self) -> u16 {
        self.status.unwrap_or(200)
    }
}

/// Shared response handle. Clones refer to the same response; the first
/// `send` wins and later sends are ignored.
#[derive(Clone, Default)]
pub struct HttpResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, code: u16) {
        self.state.lock().status = Some(code);
    }

    pub fn status(&self) -> u16 {
        self.state.lock().status()
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.state.lock().headers.push((name.into(), value.into()));
    }

    /// Returns `false` if a payload had already been sent.
    pub fn send(&self, payload: Payload) -> bool {
        let mut state = self.state.lock();
        if state.payload.is_some() {
            return false;
        }
        state.payload = Some(payload);
        true
    }

    pub fn json(&self, value: Value) -> bool {
        self.send(Payload::Json(value))
    }

    pub fn text(&self, body: impl Into<String>) -> bool {
        self.send(Payload::Text(body.into()))
    }

    pub fn is_sent(&self) -> bool {
        self.state.lock().payload.is_some()
    }

    pub fn snapshot(&self) -> ResponseState {
        self.state.lock().clone()
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        match key {
            "status" | "statusCode" => Some(Value::from(self.status())),
            "sent" | "headersSent" => Some(Value::Bool(self.is_sent())),
            _ => None,
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HttpResponse").field(&*self.state.lock()).finish()
    }
}

/// Continuation passing control back to the transport. Records whether it was called.
#[derive(Clone)]
pub struct Next {
    f: Arc<dyn Fn() + Send + Sync>,
    called: Arc<AtomicBool>,
}

impl Next {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            f: Arc::new(f),
            called: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn call(&self) {
        self.called.store(true, Ordering::SeqCst);
        (self.f)()
    }

    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_send_wins() {
        let res = HttpResponse::new();
        let alias = res.clone();
        assert!(res.json(json!({"a": 1})));
        assert!(!alias.text("late"));
        assert_eq!(
            res.snapshot().payload,
            Some(Payload::Json(json!({"a": 1})))
        );
        assert_eq!(res.status(), 200);
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = HttpRequest::new(Method::GET, "/").with_header("Token", "abc");
        assert_eq!(req.header("TOKEN"), Some("abc"));
        assert_eq!(req.property("method"), Some(json!("GET")));
        assert_eq!(req.property("nope"), None);
    }
}
