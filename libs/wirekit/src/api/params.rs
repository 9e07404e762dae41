//! Parameter pipeline: builds the positional argument list of a handler call.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{HttpException, HttpRequest, HttpResponse, Next};
use crate::contracts::{Pipe, PipeRef};

/// Where a handler argument is taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Request,
    Response,
    Next,
    Body,
    Query,
    Path,
    Headers,
}

/// Declared type of a parameter, passed to every pipe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TypeHint {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// A named DTO type.
    Named(&'static str),
}

#[derive(Clone, Debug)]
pub struct ParamDescriptor {
    pub source: ParamSource,
    pub index: usize,
    pub property_key: Option<String>,
    pub type_hint: TypeHint,
    pub pipes: Vec<PipeRef>,
}

impl ParamDescriptor {
    pub fn new(source: ParamSource, index: usize) -> Self {
        Self {
            source,
            index,
            property_key: None,
            type_hint: TypeHint::Any,
            pipes: Vec::new(),
        }
    }

    pub fn request(index: usize) -> Self {
        Self::new(ParamSource::Request, index)
    }

    pub fn response(index: usize) -> Self {
        Self::new(ParamSource::Response, index)
    }

    pub fn next(index: usize) -> Self {
        Self::new(ParamSource::Next, index)
    }

    pub fn body(index: usize) -> Self {
        Self::new(ParamSource::Body, index)
    }

    pub fn query(index: usize) -> Self {
        Self::new(ParamSource::Query, index)
    }

    pub fn path(index: usize) -> Self {
        Self::new(ParamSource::Path, index)
    }

    pub fn headers(index: usize) -> Self {
        Self::new(ParamSource::Headers, index)
    }

    /// Narrow the raw value to one property.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.property_key = Some(key.into());
        self
    }

    pub fn hint(mut self, hint: TypeHint) -> Self {
        self.type_hint = hint;
        self
    }

    pub fn pipe(mut self, pipe: impl Into<PipeRef>) -> Self {
        self.pipes.push(pipe.into());
        self
    }
}

/// A [`ParamDescriptor`] whose pipes have been resolved at bind time.
#[derive(Clone)]
pub struct BoundParam {
    pub source: ParamSource,
    pub index: usize,
    pub property_key: Option<String>,
    pub type_hint: TypeHint,
    pub pipes: Vec<Arc<dyn Pipe>>,
}

/// One handler argument.
#[derive(Clone, Debug, Default)]
pub enum Arg {
    /// No parameter was declared at this position, or the keyed property is missing.
    #[default]
    Undefined,
    Value(Value),
    Request(Arc<HttpRequest>),
    Response(HttpResponse),
    Next(Next),
}

impl Arg {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Arg::Undefined)
    }
}

/// Positional handler arguments.
#[derive(Clone, Debug, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(args: Vec<Arg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index) {
            Some(Arg::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Deserialize the argument at `index`. An undefined argument deserializes from `null`.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Result<T, HttpException> {
        let raw = self.value(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(raw)
            .map_err(|e| HttpException::bad_request(format!("invalid argument {index}: {e}")))
    }

    pub fn request(&self, index: usize) -> Option<Arc<HttpRequest>> {
        match self.0.get(index) {
            Some(Arg::Request(r)) => Some(Arc::clone(r)),
            _ => None,
        }
    }

    pub fn response(&self, index: usize) -> Option<HttpResponse> {
        match self.0.get(index) {
            Some(Arg::Response(r)) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn next(&self, index: usize) -> Option<Next> {
        match self.0.get(index) {
            Some(Arg::Next(n)) => Some(n.clone()),
            _ => None,
        }
    }
}

impl IntoIterator for Args {
    type Item = Arg;
    type IntoIter = std::vec::IntoIter<Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build the argument list for one call.
///
/// The list has `max(index) + 1` slots; undeclared slots stay [`Arg::Undefined`].
/// Data values run through `base_pipes` and then the parameter's own pipes;
/// the first pipe error aborts the call.
pub fn build_args(
    req: &Arc<HttpRequest>,
    res: &HttpResponse,
    next: &Next,
    params: &[BoundParam],
    base_pipes: &[Arc<dyn Pipe>],
) -> Result<Args, HttpException> {
    let len = params.iter().map(|p| p.index + 1).max().unwrap_or(0);
    let mut args = vec![Arg::Undefined; len];

    for param in params {
        let raw = select(req, res, next, param);
        args[param.index] = apply_pipes(raw, param, base_pipes)?;
    }
    Ok(Args(args))
}

fn select(req: &Arc<HttpRequest>, res: &HttpResponse, next: &Next, param: &BoundParam) -> Arg {
    let key = param.property_key.as_deref();
    match param.source {
        ParamSource::Request => match key {
            None => Arg::Request(Arc::clone(req)),
            Some(k) => req.property(k).map_or(Arg::Undefined, Arg::Value),
        },
        ParamSource::Response => match key {
            None => Arg::Response(res.clone()),
            Some(k) => res.property(k).map_or(Arg::Undefined, Arg::Value),
        },
        ParamSource::Next => Arg::Next(next.clone()),
        ParamSource::Body => narrow(&req.body, key),
        ParamSource::Query => narrow_map(&req.query, key),
        ParamSource::Path => narrow_map(&req.params, key),
        ParamSource::Headers => {
            let lowered = key.map(str::to_ascii_lowercase);
            narrow_map(&req.headers, lowered.as_deref())
        }
    }
}

fn narrow(container: &Value, key: Option<&str>) -> Arg {
    match (key, container) {
        (None, v) => Arg::Value(v.clone()),
        (Some(k), Value::Object(map)) => map.get(k).cloned().map_or(Arg::Undefined, Arg::Value),
        (Some(_), _) => Arg::Undefined,
    }
}

fn narrow_map(map: &serde_json::Map<String, Value>, key: Option<&str>) -> Arg {
    match key {
        None => Arg::Value(Value::Object(map.clone())),
        Some(k) => map.get(k).cloned().map_or(Arg::Undefined, Arg::Value),
    }
}

fn apply_pipes(
    raw: Arg,
    param: &BoundParam,
    base_pipes: &[Arc<dyn Pipe>],
) -> Result<Arg, HttpException> {
    if base_pipes.is_empty() && param.pipes.is_empty() {
        return Ok(raw);
    }
    let mut value = match raw {
        Arg::Value(v) => v,
        Arg::Undefined => Value::Null,
        handle => return Ok(handle),
    };
    for pipe in base_pipes.iter().chain(param.pipes.iter()) {
        value = pipe.transform(value, &param.type_hint)?;
    }
    Ok(Arg::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use parking_lot::Mutex;
    use serde_json::json;

    fn bound(source: ParamSource, index: usize, key: Option<&str>) -> BoundParam {
        BoundParam {
            source,
            index,
            property_key: key.map(str::to_owned),
            type_hint: TypeHint::Any,
            pipes: Vec::new(),
        }
    }

    fn request() -> Arc<HttpRequest> {
        Arc::new(
            HttpRequest::new(Method::POST, "/users/7")
                .with_param("id", "7")
                .with_query("page", "2")
                .with_header("X-Trace", "t1")
                .with_body(json!({"name": "ann"})),
        )
    }

    /// Records its tag into a shared log; fails when `fail` is set.
    struct Tag {
        tag: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Pipe for Tag {
        fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
            self.log.lock().push(self.tag);
            if self.fail {
                return Err(HttpException::bad_request(self.tag));
            }
            Ok(value)
        }
    }

    #[test]
    fn args_length_follows_max_index() {
        let req = request();
        let args = build_args(
            &req,
            &HttpResponse::new(),
            &Next::noop(),
            &[bound(ParamSource::Path, 2, Some("id"))],
            &[],
        )
        .unwrap();
        assert_eq!(args.len(), 3);
        assert!(args.get(0).unwrap().is_undefined());
        assert!(args.get(1).unwrap().is_undefined());
        assert_eq!(args.value(2), Some(&json!("7")));

        let none = build_args(&req, &HttpResponse::new(), &Next::noop(), &[], &[]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn sources_and_narrowing() {
        let req = request();
        let params = vec![
            bound(ParamSource::Body, 0, Some("name")),
            bound(ParamSource::Query, 1, None),
            bound(ParamSource::Headers, 2, Some("x-trace")),
            bound(ParamSource::Body, 3, Some("missing")),
            bound(ParamSource::Request, 4, None),
            bound(ParamSource::Request, 5, Some("method")),
            bound(ParamSource::Response, 6, None),
            bound(ParamSource::Next, 7, None),
        ];
        let args = build_args(&req, &HttpResponse::new(), &Next::noop(), &params, &[]).unwrap();

        assert_eq!(args.value(0), Some(&json!("ann")));
        assert_eq!(args.value(1), Some(&json!({"page": "2"})));
        assert_eq!(args.value(2), Some(&json!("t1")));
        assert!(args.get(3).unwrap().is_undefined());
        assert!(Arc::ptr_eq(&args.request(4).unwrap(), &req));
        assert_eq!(args.value(5), Some(&json!("POST")));
        assert!(args.response(6).is_some());
        assert!(args.next(7).is_some());
    }

    #[test]
    fn keyed_non_object_is_undefined() {
        let req = Arc::new(HttpRequest::new(Method::POST, "/").with_body(json!("plain")));
        let args = build_args(
            &req,
            &HttpResponse::new(),
            &Next::noop(),
            &[bound(ParamSource::Body, 0, Some("a"))],
            &[],
        )
        .unwrap();
        assert!(args.get(0).unwrap().is_undefined());
    }

    #[test]
    fn base_pipes_run_before_param_pipes_and_stop_on_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tag = |tag: &'static str, fail: bool| -> Arc<dyn Pipe> {
            Arc::new(Tag {
                tag,
                fail,
                log: Arc::clone(&log),
            })
        };

        let mut param = bound(ParamSource::Path, 0, Some("id"));
        param.pipes = vec![tag("C", false)];

        let base = vec![tag("A", false), tag("B", false)];
        let args = build_args(
            &request(),
            &HttpResponse::new(),
            &Next::noop(),
            std::slice::from_ref(&param),
            &base,
        )
        .unwrap();
        assert_eq!(args.value(0), Some(&json!("7")));
        assert_eq!(std::mem::take(&mut *log.lock()), vec!["A", "B", "C"]);

        let base = vec![tag("A", false), tag("B", true)];
        let err = build_args(&request(), &HttpResponse::new(), &Next::noop(), &[param], &base)
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "B");
        assert_eq!(*log.lock(), vec!["A", "B"]);
    }

    #[test]
    fn pipes_skip_raw_handles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipe: Arc<dyn Pipe> = Arc::new(Tag {
            tag: "A",
            fail: true,
            log: Arc::clone(&log),
        });
        let args = build_args(
            &request(),
            &HttpResponse::new(),
            &Next::noop(),
            &[bound(ParamSource::Request, 0, None)],
            &[pipe],
        )
        .unwrap();
        assert!(args.request(0).is_some());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn parse_reports_bad_request() {
        let args = Args::new(vec![Arg::Value(json!("x"))]);
        let err = args.parse::<u32>(0).unwrap_err();
        assert_eq!(err.status, 400);
        let missing: Option<u32> = args.parse(5).unwrap();
        assert_eq!(missing, None);
    }
}
