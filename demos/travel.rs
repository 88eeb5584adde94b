//! Travel UI: index page, static assets, health and per-city data.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example travel -- [config.toml]
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/assets/css/site.css
//!   curl http://localhost:3000/health
//!   curl http://localhost:3000/data/paris
//!   curl http://localhost:3000/data/atlantis     # 400
//!   curl -X POST http://localhost:3000/health    # 405

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use kiln::{
    App, ContentType, Context, Error, Metrics, Request, Response, ResponseSink, Server,
    ServerConfig, StatusCode, health, shutdown,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let build = std::env::var("BUILD").unwrap_or_else(|_| "dev".to_owned());
    let maps_key = std::env::var("MAPS_KEY").unwrap_or_default();

    let (handle, signal) = shutdown::channel(config.shutdown_buffer);
    let metrics = Metrics::new();
    let mut app = App::standard(handle, metrics.clone());
    if let Some(timeout) = config.request_timeout() {
        app = app.request_timeout(timeout);
    }

    let index = Arc::new(render_index(&maps_key));
    let assets = Arc::new(PathBuf::from("assets"));

    let app = app
        .get("/", move |_: Context, sink: ResponseSink, _: Request| {
            let page = Arc::clone(&index);
            async move { sink.write(Response::html(page.as_str())) }
        })?
        .get("/assets/*", move |ctx: Context, sink: ResponseSink, req: Request| {
            serve_asset(Arc::clone(&assets), ctx, sink, req)
        })?
        .get("/health", health::Check::new(build).handler())?
        .get("/data/:city", data)?;

    Server::from_config(&config)?.serve(app, signal).await?;

    let snap = metrics.snapshot();
    tracing::info!(requests = snap.requests, errors = snap.errors, "final counters");
    Ok(())
}

fn render_index(maps_key: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head><title>Travel</title>\
         <link rel=\"stylesheet\" href=\"/assets/css/site.css\"></head>\n\
         <body data-maps-key=\"{maps_key}\"><div id=\"map\"></div>\
         <script src=\"/assets/js/app.js\"></script></body>\n</html>\n"
    )
}

async fn serve_asset(
    root: Arc<PathBuf>,
    ctx: Context,
    sink: ResponseSink,
    req: Request,
) -> Result<(), Error> {
    let rel = Path::new(req.wildcard().unwrap_or_default());
    if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(Error::NotFound);
    }
    ctx.check()?;

    let path = root.join(rel);
    let body = match tokio::fs::read(&path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::NotFound),
        Err(e) => return Err(Error::internal_with(format!("reading {}", path.display()), e)),
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    sink.write(Response::builder().bytes(ContentType::from_extension(ext), body))
}

async fn data(ctx: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
    let city = req.param("city").unwrap_or_default().to_lowercase();
    let Some((lat, lng, forecast)) = lookup(&city) else {
        return Err(Error::validation(format!("unknown city `{city}`")));
    };
    ctx.check()?;

    let body = format!(r#"{{"city":"{city}","lat":{lat},"lng":{lng},"forecast":"{forecast}"}}"#);
    sink.write(
        Response::builder()
            .status(StatusCode::OK)
            .header("cache-control", "max-age=60")
            .bytes(ContentType::Json, body),
    )
}

fn lookup(city: &str) -> Option<(f64, f64, &'static str)> {
    match city {
        "paris" => Some((48.8566, 2.3522, "sunny")),
        "london" => Some((51.5072, -0.1276, "rain")),
        "tokyo" => Some((35.6762, 139.6503, "cloudy")),
        "sydney" => Some((-33.8688, 151.2093, "windy")),
        _ => None,
    }
}
