//! End-to-end dispatch through the axum adapter.

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use wirekit::api::ParseIntPipe;
use wirekit::{
    async_trait, Application, Args, Deps, Flow, Guard, HttpException, HttpRequest, HttpResponse,
    Injectable, Interceptor, InterceptorRef, Middleware, MiddlewareRef, ParamDescriptor, Pipe,
    PipeRef,
    RegistryBuilder, TypeHint, TypeRef,
};

// ---------- Fixtures ----------

/// Records the order in which enhancers and handlers run.
#[derive(Default)]
struct Journal(Mutex<Vec<&'static str>>);

impl Journal {
    fn push(&self, step: &'static str) {
        self.0.lock().push(step);
    }

    fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Injectable for Journal {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

macro_rules! with_journal {
    ($name:ident) => {
        struct $name {
            journal: Arc<Journal>,
        }

        impl Injectable for $name {
            fn dependencies() -> Vec<TypeRef> {
                vec![TypeRef::of::<Journal>()]
            }
            fn construct(deps: &mut Deps) -> anyhow::Result<Self> {
                Ok(Self {
                    journal: deps.next()?,
                })
            }
        }
    };
}

with_journal!(Audit);
with_journal!(TokenGuard);
with_journal!(Trace);
with_journal!(Wrap);
with_journal!(ItemsController);

#[async_trait]
impl Middleware for Audit {
    async fn handle(&self, req: &HttpRequest, res: &HttpResponse) -> anyhow::Result<Flow> {
        self.journal.push("middleware");
        if req.header("x-halt").is_some() {
            res.set_status(202);
            res.text("halted");
            return Ok(Flow::Halt);
        }
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl Guard for TokenGuard {
    async fn can_activate(&self, req: &HttpRequest) -> anyhow::Result<bool> {
        self.journal.push("guard");
        Ok(req.header("token") == Some("secret"))
    }
}

impl Pipe for Trace {
    fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
        self.journal.push("pipe");
        Ok(value)
    }
}

#[async_trait]
impl Interceptor for Wrap {
    async fn intercept(&self, _req: &HttpRequest, value: Value) -> anyhow::Result<Value> {
        self.journal.push("interceptor");
        Ok(json!({ "data": value }))
    }
}

impl ItemsController {
    async fn show(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        self.journal.push("handler");
        Ok(args.value(0).cloned().unwrap_or(Value::Null))
    }

    async fn raw(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        Ok(args.value(0).cloned().unwrap_or(Value::Null))
    }

    async fn missing(self: Arc<Self>, _args: Args) -> anyhow::Result<Value> {
        Err(HttpException::not_found("X").into())
    }

    async fn boom(self: Arc<Self>, _args: Args) -> anyhow::Result<Value> {
        Err(anyhow::anyhow!("connection string leaked"))
    }

    async fn create(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        Ok(args.value(0).cloned().unwrap_or(Value::Null))
    }

    async fn pass(self: Arc<Self>, args: Args) -> anyhow::Result<()> {
        if let Some(next) = args.next(0) {
            next.call();
        }
        Ok(())
    }
}

macro_rules! journaling_middleware {
    ($name:ident, $label:literal) => {
        with_journal!($name);

        #[async_trait]
        impl Middleware for $name {
            async fn handle(&self, _req: &HttpRequest, _res: &HttpResponse) -> anyhow::Result<Flow> {
                self.journal.push($label);
                Ok(Flow::Continue)
            }
        }
    };
}

macro_rules! journaling_pipe {
    ($name:ident, $label:literal) => {
        with_journal!($name);

        impl Pipe for $name {
            fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
                self.journal.push($label);
                Ok(value)
            }
        }
    };
}

journaling_middleware!(GlobalLog, "global");
journaling_middleware!(ModuleLog, "module");
journaling_middleware!(ClassLog, "class");
journaling_middleware!(MethodLog, "method");

journaling_pipe!(GlobalTrim, "global pipe");
journaling_pipe!(ModuleTrim, "module pipe");
journaling_pipe!(ClassTrim, "class pipe");
journaling_pipe!(MethodTrim, "method pipe");
journaling_pipe!(ParamTrim, "param pipe");

with_journal!(ShopController);
with_journal!(FilesController);

impl ShopController {
    async fn item(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        self.journal.push("handler");
        Ok(args.value(0).cloned().unwrap_or(Value::Null))
    }
}

impl FilesController {
    async fn fetch(self: Arc<Self>, args: Args) -> anyhow::Result<Value> {
        Ok(args.value(0).cloned().unwrap_or(Value::Null))
    }
}

struct AppModule;
struct CommonModule;
struct ShopModule;
struct FilesModule;
struct StoreModule;

fn app() -> Application {
    let mut b = RegistryBuilder::new();
    b.injectable::<Journal>()
        .middleware::<Audit>()
        .guard::<TokenGuard>()
        .pipe::<Trace>()
        .interceptor::<Wrap>();

    b.controller::<ItemsController>("/items", |c| {
        c.method("show", ItemsController::show, |m| {
            m.get("/:id")
                .param(
                    ParamDescriptor::path(0)
                        .key("id")
                        .pipe(PipeRef::provider::<Trace>()),
                )
                .use_guard(wirekit::GuardRef::provider::<TokenGuard>())
                .use_interceptor(InterceptorRef::provider::<Wrap>())
        })
        .method("raw", ItemsController::raw, |m| {
            m.get("/raw/:id").param(ParamDescriptor::path(0).key("id"))
        })
        .method("number", ItemsController::raw, |m| {
            m.get("/num/:id")
                .param(ParamDescriptor::path(0).key("id").pipe(ParseIntPipe::new()))
        })
        .method("missing", ItemsController::missing, |m| m.get("/x/missing"))
        .method("boom", ItemsController::boom, |m| m.get("/x/boom"))
        .method("create", ItemsController::create, |m| {
            m.post("").status(201).param(ParamDescriptor::body(0))
        })
        .method("pass", ItemsController::pass, |m| {
            m.get("/x/pass").param(ParamDescriptor::next(0))
        })
    });

    b.module::<AppModule>(|m| {
        m.provider::<Journal>()
            .middleware::<Audit>()
            .controller::<ItemsController>()
    });

    Application::bootstrap::<AppModule>(b.build().unwrap()).unwrap()
}

/// Enhancers on every scope: a global module, the owning module, the class and the method.
/// `FilesModule` imports nothing and only sees the global scope.
fn scoped_app() -> Application {
    let mut b = RegistryBuilder::new();
    b.injectable::<Journal>()
        .middleware::<GlobalLog>()
        .middleware::<ModuleLog>()
        .middleware::<ClassLog>()
        .middleware::<MethodLog>()
        .pipe::<GlobalTrim>()
        .pipe::<ModuleTrim>()
        .pipe::<ClassTrim>()
        .pipe::<MethodTrim>()
        .pipe::<ParamTrim>();

    b.controller::<ShopController>("/shop", |c| {
        c.use_middleware(MiddlewareRef::provider::<ClassLog>())
            .use_pipe(PipeRef::provider::<ClassTrim>())
            .method("item", ShopController::item, |m| {
                m.get("/:id")
                    .use_middleware(MiddlewareRef::provider::<MethodLog>())
                    .use_pipe(PipeRef::provider::<MethodTrim>())
                    .param(
                        ParamDescriptor::path(0)
                            .key("id")
                            .pipe(PipeRef::provider::<ParamTrim>()),
                    )
            })
    });
    b.controller::<FilesController>("/files", |c| {
        c.method("fetch", FilesController::fetch, |m| {
            m.get("/*rest").param(ParamDescriptor::path(0).key("rest"))
        })
    });

    b.module::<CommonModule>(|m| {
        m.middleware::<GlobalLog>()
            .pipe::<GlobalTrim>()
            .global()
    });
    b.module::<ShopModule>(|m| {
        m.middleware::<ModuleLog>()
            .pipe::<ModuleTrim>()
            .controller::<ShopController>()
    });
    b.module::<FilesModule>(|m| m.controller::<FilesController>());
    b.module::<StoreModule>(|m| {
        m.provider::<Journal>()
            .import::<ShopModule>()
            .import::<FilesModule>()
            .import::<CommonModule>()
    });

    Application::bootstrap::<StoreModule>(b.build().unwrap()).unwrap()
}

async fn call(app: &Application, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.router().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

// ---------- Tests ----------

#[tokio::test]
async fn enhancers_run_in_fixed_order() {
    let app = app();
    let journal = app.get::<Journal>().unwrap();

    let req = Request::builder()
        .uri("/items/7")
        .header("token", "secret")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"data": "7"}));
    assert_eq!(
        journal.take(),
        vec!["middleware", "guard", "pipe", "handler", "interceptor"]
    );
}

#[tokio::test]
async fn guard_denial_is_403_before_pipes() {
    let app = app();
    let journal = app.get::<Journal>().unwrap();

    let (status, body) = call(&app, get("/items/7")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["code"], json!(403));
    assert_eq!(journal.take(), vec!["middleware", "guard"]);
}

#[tokio::test]
async fn middleware_halt_answers_request() {
    let app = app();
    let journal = app.get::<Journal>().unwrap();

    let req = Request::builder()
        .uri("/items/7")
        .header("x-halt", "1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, b"halted");
    assert_eq!(journal.take(), vec!["middleware"]);
}

#[tokio::test]
async fn path_param_arrives_as_string_without_pipes() {
    let app = app();
    let (status, body) = call(&app, get("/items/raw/7")).await;
    assert_eq!(status, StatusCode::OK);
    // Strings are sent as text.
    assert_eq!(body, b"7");

    let (_, body) = call(&app, get("/items/num/7")).await;
    assert_eq!(json_body(&body), json!(7));
    let (_, body) = call(&app, get("/items/num/seven")).await;
    assert_eq!(json_body(&body), json!(-1));
}

#[tokio::test]
async fn http_exception_maps_to_envelope() {
    let (status, body) = call(&app(), get("/items/x/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(&body),
        json!({"code": 404, "msg": "X", "data": null})
    );
}

#[tokio::test]
async fn unknown_error_is_masked() {
    let (status, body) = call(&app(), get("/items/x/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(&body),
        json!({"code": 500, "msg": "unknown error", "data": null})
    );
}

#[tokio::test]
async fn declared_status_and_json_body() {
    let app = app();
    let req = Request::builder()
        .method("POST")
        .uri("/items")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"name":"pen"}"#))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json_body(&body), json!({"name": "pen"}));

    let bad = Request::builder()
        .method("POST")
        .uri("/items")
        .header("content-type", "application/json")
        .body(Body::from("{nope"))
        .unwrap();
    let (status, body) = call(&app, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["code"], json!(400));
}

#[tokio::test]
async fn next_without_response_falls_through_to_404() {
    let (status, body) = call(&app(), get("/items/x/pass")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["code"], json!(404));
}

#[tokio::test]
async fn unmatched_route_gets_envelope() {
    let (status, body) = call(&app(), get("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["msg"], json!("Not Found"));
}

#[tokio::test]
async fn handlers_are_compiled_once_per_route() {
    let app = app();
    let first: Vec<_> = app.routes().iter().map(|r| Arc::as_ptr(&r.handler)).collect();
    let router = app.router();
    drop(router);
    let second: Vec<_> = app.routes().iter().map(|r| Arc::as_ptr(&r.handler)).collect();
    assert_eq!(first, second);
    assert_eq!(app.routes().len(), 7);
}

#[tokio::test]
async fn enhancer_scopes_run_outermost_first() {
    let app = scoped_app();
    let journal = app.get::<Journal>().unwrap();

    let (status, body) = call(&app, get("/shop/7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"7");
    assert_eq!(
        journal.take(),
        vec![
            "global",
            "module",
            "class",
            "method",
            "global pipe",
            "module pipe",
            "class pipe",
            "method pipe",
            "param pipe",
            "handler",
        ]
    );
}

#[tokio::test]
async fn global_module_enhancers_reach_modules_that_do_not_import_it() {
    let app = scoped_app();
    let journal = app.get::<Journal>().unwrap();

    let (status, body) = call(&app, get("/files/docs/a.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"docs/a.txt");
    assert_eq!(journal.take(), vec!["global", "global pipe"]);
}
