//! axum adapter: mounts bound routes and translates requests and responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{Json, Router};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde_json::{Map, Value};

use crate::api::{
    BoundHandler, ErrorEnvelope, HttpException, HttpRequest, HttpResponse, MountedRoute, Next,
    Payload, ResponseState, Verb,
};

enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

// A bare `*` captures under the name `wildcard`.
fn segment(seg: &str) -> Segment<'_> {
    match (seg.strip_prefix(':'), seg.strip_prefix('*')) {
        (Some(name), _) if !name.is_empty() => Segment::Param(name),
        (_, Some("")) => Segment::Wildcard("wildcard"),
        (_, Some(name)) => Segment::Wildcard(name),
        _ => Segment::Static(seg),
    }
}

/// Convert `:param` segments to axum's `{param}` and `*rest` to `{*rest}`.
pub fn to_axum_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match segment(seg) {
            Segment::Param(name) => format!("{{{name}}}"),
            Segment::Wildcard(name) => format!("{{*{name}}}"),
            Segment::Static(s) => s.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `path` with parameter names erased. Routes of one shape share a router node,
/// so they must agree on parameter names.
pub fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|seg| match segment(seg) {
            Segment::Param(_) => ":",
            Segment::Wildcard(_) => "*",
            Segment::Static(s) => s,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject paths the router cannot mount. A wildcard must be the last segment.
pub fn check_route_path(path: &str) -> Result<(), String> {
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, seg) in segments.iter().enumerate() {
        match segment(seg) {
            Segment::Wildcard(_) if i != last => {
                return Err(format!("wildcard '{seg}' must be the last segment"));
            }
            Segment::Static(s) if s.contains(['{', '}']) => {
                return Err(format!("segment '{s}' contains a brace"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn method_filter(verb: Verb) -> MethodFilter {
    match verb {
        Verb::Get => MethodFilter::GET,
        Verb::Post => MethodFilter::POST,
        Verb::Put => MethodFilter::PUT,
        Verb::Patch => MethodFilter::PATCH,
        Verb::Delete => MethodFilter::DELETE,
    }
}

/// Build a router serving `routes`. Unmatched requests get a 404 envelope.
pub fn router(routes: &[MountedRoute]) -> Router {
    let mut by_path: BTreeMap<String, Vec<&MountedRoute>> = BTreeMap::new();
    for route in routes {
        by_path
            .entry(to_axum_path(&route.path))
            .or_default()
            .push(route);
    }

    let mut router = Router::new();
    for (path, group) in by_path {
        let mut methods = MethodRouter::new();
        for route in group {
            let handler = Arc::clone(&route.handler);
            methods = methods.on(
                method_filter(route.verb),
                move |method: Method,
                      uri: Uri,
                      headers: HeaderMap,
                      params: Option<Path<BTreeMap<String, String>>>,
                      body: Bytes| async move {
                    let params = params.map(|Path(p)| p).unwrap_or_default();
                    dispatch(handler, method, uri, headers, params, body).await
                },
            );
        }
        router = router.route(&path, methods);
    }
    router.fallback(|| async {
        envelope_response(&HttpException::not_found("Not Found"))
    })
}

async fn dispatch(
    handler: Arc<BoundHandler>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: BTreeMap<String, String>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&headers, &body) {
        Ok(v) => v,
        Err(e) => return envelope_response(&e),
    };

    let mut req = HttpRequest::new(method, uri.path()).with_body(body);
    if let Some(q) = uri.query() {
        for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
            req.query.insert(k.into_owned(), Value::String(v.into_owned()));
        }
    }
    for (k, v) in params {
        req.params.insert(k, Value::String(v));
    }
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            req.headers
                .insert(name.as_str().to_owned(), Value::String(v.to_owned()));
        }
    }

    let next = Next::noop();
    let res = HttpResponse::new();

    handler.handle(Arc::new(req), res.clone(), next.clone()).await;
    render(res.snapshot(), next.was_called())
}

fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, HttpException> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let form: Map<String, Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        return Ok(Value::Object(form));
    }
    if content_type.contains("json") {
        return serde_json::from_slice(body)
            .map_err(|e| HttpException::bad_request(format!("malformed JSON body: {e}")));
    }
    Ok(serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())))
}

fn render(state: ResponseState, next_called: bool) -> Response {
    let status = StatusCode::from_u16(state.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match state.payload {
        Some(Payload::Json(v)) => (status, Json(v)).into_response(),
        Some(Payload::Text(t)) => (status, t).into_response(),
        None if next_called => return envelope_response(&HttpException::not_found("Not Found")),
        None => status.into_response(),
    };
    for (name, value) in state.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn envelope_response(e: &HttpException) -> Response {
    let status = StatusCode::from_u16(e.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorEnvelope::from(e).to_value())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_params_become_braces() {
        assert_eq!(to_axum_path("/user/:id"), "/user/{id}");
        assert_eq!(to_axum_path("/a/:x/b/:y"), "/a/{x}/b/{y}");
        assert_eq!(to_axum_path("/"), "/");
        assert_eq!(to_axum_path("/plain/:"), "/plain/:");
        assert_eq!(to_axum_path("/files/*rest"), "/files/{*rest}");
        assert_eq!(to_axum_path("/files/*"), "/files/{*wildcard}");
    }

    #[test]
    fn shape_erases_parameter_names() {
        assert_eq!(route_shape("/item/:id"), route_shape("/item/:key"));
        assert_eq!(route_shape("/files/*rest"), "/files/*");
        assert_ne!(route_shape("/item/:id"), route_shape("/item/all"));
    }

    #[test]
    fn wildcard_must_close_the_path() {
        assert!(check_route_path("/files/*rest").is_ok());
        assert!(check_route_path("/files/*rest/meta").is_err());
        assert!(check_route_path("/a/{b}").is_err());
        assert!(check_route_path("/").is_ok());
    }

    #[test]
    fn body_parsing_by_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(
            parse_body(&headers, &Bytes::from_static(br#"{"a":1}"#)).unwrap(),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            parse_body(&headers, &Bytes::from_static(b"{oops")).unwrap_err().status,
            400
        );

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        assert_eq!(
            parse_body(&headers, &Bytes::from_static(b"name=ann&age=3")).unwrap(),
            serde_json::json!({"name": "ann", "age": "3"})
        );

        assert_eq!(
            parse_body(&HeaderMap::new(), &Bytes::new()).unwrap(),
            Value::Null
        );
    }
}
