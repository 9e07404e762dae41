use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use wirekit::{serve, Application, RegistryBuilder, ShutdownOptions};
use wirekit_bootstrap::{AppConfig, AppConfigProvider, CliArgs};

mod enhancers;
mod modules;

use modules::AppModule;

/// Wirekit demo server
#[derive(Parser)]
#[command(name = "wirekit-server")]
#[command(about = "Wirekit demo server: user, article and tags modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // defaults -> YAML (if provided) -> env (APP__*) -> CLI overrides
    let config = AppConfig::load_from_cli(&args)?;

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let logging = config.logging.clone().unwrap_or_default();
    let base_dir = std::env::current_dir().context("Cannot resolve working directory")?;
    wirekit_bootstrap::init_logging(&logging, &base_dir);

    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_addr()))?;

    tracing::info!("Wirekit server starting");
    let app = build_app(config)?;
    tracing::info!(routes = app.routes().len(), "Application bootstrapped");

    serve(app, addr, ShutdownOptions::Signals).await
}

fn build_app(config: AppConfig) -> Result<Application> {
    let mut builder = RegistryBuilder::discover();
    wirekit_config::register(&mut builder, AppConfigProvider::new(config));
    let registry = builder.build()?;
    Ok(Application::bootstrap::<AppModule>(registry)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

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

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn discovered_modules_form_the_route_table() {
        let app = build_app(AppConfig::default()).unwrap();
        let mut paths: Vec<_> = app
            .routes()
            .iter()
            .map(|r| format!("{} {}", r.verb, r.path))
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "GET /articles/create",
                "GET /health",
                "GET /tags/random",
                "GET /user/:id",
                "GET /user/articles",
                "GET /user/login",
                "GET /user/version",
                "POST /user/info",
            ]
        );
    }

    #[tokio::test]
    async fn login_and_article_counts() {
        let app = build_app(AppConfig::default()).unwrap();

        let (status, body) = call(&app, get("/user/login?name=test&pwd=123")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_of(&body);
        assert_eq!(body["msg"], json!("success"));
        assert_eq!(body["count"], json!(0));

        let (status, body) = call(&app, get("/user/login?name=error")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_of(&body)["msg"], json!("Not Found User!"));

        let (_, body) = call(&app, get("/user/articles?name=admin")).await;
        assert_eq!(json_of(&body)["articles"], json!(33));

        let (status, body) = call(&app, get("/user/articles?name=ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_of(&body)["msg"], json!("user ghost not found"));
    }

    #[tokio::test]
    async fn token_guard_protects_lookup() {
        let app = build_app(AppConfig::default()).unwrap();

        let (status, _) = call(&app, get("/user/42")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = Request::builder()
            .uri("/user/42")
            .header("token", "123456")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"id": 42}));
    }

    #[tokio::test]
    async fn body_must_be_an_object() {
        let app = build_app(AppConfig::default()).unwrap();
        let post = |body: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/user/info")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let (status, body) = call(&app, post(r#"{"name":"ann"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"userInfo": {"name": "ann"}}));

        let (status, _) = call(&app, post("[1,2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
