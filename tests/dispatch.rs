mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{app, get, request, text};
use kiln::{
    CancellationToken, Context, Error, Method, Request, ResponseSink, ShutdownReason, StatusCode,
};

async fn city(_: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
    match req.param("city") {
        Some("atlantis") => Err(Error::validation("unknown city `atlantis`")),
        Some(city) => sink.write(format!("forecast for {city}")),
        None => Err(Error::internal("route without :city")),
    }
}

async fn asset(_: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
    sink.write(format!("asset {}", req.wildcard().unwrap_or_default()))
}

async fn boom(_: Context, sink: ResponseSink, req: Request) -> Result<(), Error> {
    if req.path() == "/boom" {
        panic!("lost the map");
    }
    sink.write("fine")
}

#[tokio::test]
async fn binds_city_param() {
    let (app, metrics, _signal) = app();
    let app = app.get("/data/:city", city).unwrap();

    let res = app.dispatch(get("/data/Paris"), CancellationToken::new()).await.unwrap();

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "forecast for Paris");
    assert_eq!(metrics.snapshot().success, 1);
}

#[tokio::test]
async fn decodes_params() {
    let (app, _, _signal) = app();
    let app = app.get("/data/:city", city).unwrap();

    let res = app.dispatch(get("/data/S%C3%A3o%20Paulo"), CancellationToken::new()).await.unwrap();

    assert_eq!(text(&res), "forecast for São Paulo");
}

#[tokio::test]
async fn wildcard_serves_nested_paths() {
    let (app, _, _signal) = app();
    let app = app.get("/assets/*", asset).unwrap();

    let res = app.dispatch(get("/assets/css/site.css"), CancellationToken::new()).await.unwrap();
    assert_eq!(text(&res), "asset css/site.css");

    let res = app.dispatch(get("/assets"), CancellationToken::new()).await.unwrap();
    assert_eq!(text(&res), "asset ");
}

#[tokio::test]
async fn unmatched_is_404_without_calling_any_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let (app, metrics, _signal) = app();
    let app = app
        .get("/data/:city", move |_: Context, sink: ResponseSink, _: Request| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { sink.write("never") }
        })
        .unwrap();

    for path in ["/", "/data", "/data/Paris/extra", "/nowhere"] {
        let res = app.dispatch(get(path), CancellationToken::new()).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND, "{path}");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.snapshot().client_errors, 4);
}

#[tokio::test]
async fn wrong_method_lists_allowed_methods() {
    let (app, _, _signal) = app();
    let app = app.get("/data/:city", city).unwrap().delete("/data/:city", city).unwrap();

    let res = app
        .dispatch(request(http::Method::POST, "/data/Paris"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET, DELETE");
}

#[tokio::test]
async fn validation_message_reaches_the_client() {
    let (app, metrics, _signal) = app();
    let app = app.get("/data/:city", city).unwrap();

    let res = app.dispatch(get("/data/atlantis"), CancellationToken::new()).await.unwrap();

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(text(&res), "unknown city `atlantis`");
    let snap = metrics.snapshot();
    assert_eq!((snap.client_errors, snap.errors), (1, 1));
}

#[tokio::test]
async fn panic_becomes_500_and_the_app_keeps_serving() {
    let (app, metrics, _signal) = app();
    let app = app
        .get("/boom", boom)
        .unwrap()
        .get("/data/:city", city)
        .unwrap();

    let res = app.dispatch(get("/boom"), CancellationToken::new()).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!text(&res).contains("lost the map"));

    let res = app.dispatch(get("/data/Paris"), CancellationToken::new()).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::OK);

    let snap = metrics.snapshot();
    assert_eq!((snap.server_errors, snap.success, snap.in_flight), (1, 1, 0));
}

#[tokio::test]
async fn concurrent_requests_are_all_counted() {
    const N: usize = 64;
    let (app, metrics, _signal) = app();
    let app = Arc::new(
        app.get("/data/:city", |_: Context, sink: ResponseSink, req: Request| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            sink.write(req.param("city").unwrap_or_default().to_owned())
        })
        .unwrap(),
    );

    let requests = (0..N).map(|i| {
        let app = Arc::clone(&app);
        async move { app.dispatch(get(&format!("/data/city{i}")), CancellationToken::new()).await }
    });
    let responses = futures_util::future::join_all(requests).await;

    for (i, res) in responses.into_iter().enumerate() {
        assert_eq!(text(&res.unwrap()), format!("city{i}"));
    }
    let snap = metrics.snapshot();
    assert_eq!(snap.requests, N as u64);
    assert_eq!(snap.success, N as u64);
    assert_eq!(snap.in_flight, 0);
}

#[tokio::test]
async fn shutdown_error_signals_exactly_once() {
    let (app, _, mut signal) = app();
    let app = app
        .get("/fatal", |_: Context, _: ResponseSink, _: Request| async {
            Err::<(), _>(Error::shutdown("data source unreachable"))
        })
        .unwrap();

    let res = app.dispatch(get("/fatal"), CancellationToken::new()).await.unwrap();

    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        signal.try_recv(),
        Some(ShutdownReason::Requested("data source unreachable".into()))
    );
    assert_eq!(signal.try_recv(), None);
}

#[tokio::test]
async fn cancellation_reaches_the_handler_and_nothing_is_written() {
    let saw_cancel = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&saw_cancel);
    let (app, metrics, _signal) = app();
    let app = app
        .get("/slow", move |ctx: Context, _: ResponseSink, _: Request| {
            let seen = Arc::clone(&seen);
            async move {
                ctx.cancelled().await;
                seen.fetch_add(1, Ordering::SeqCst);
                ctx.check()
            }
        })
        .unwrap();

    let client = CancellationToken::new();
    let disconnect = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        disconnect.cancel();
    });

    let result = app.dispatch(get("/slow"), client).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.snapshot().cancelled, 1);
}

#[tokio::test]
async fn rejects_bad_and_duplicate_routes() {
    let (app, _, _signal) = app();
    assert!(matches!(app.get("data", city), Err(kiln::ConfigError::InvalidPattern { .. })));

    let (app, _, _signal) = common::app();
    let app = app.on(Method::Get, "/data/:city", city).unwrap();
    assert!(matches!(
        app.on(Method::Get, "/data/:name", city),
        Err(kiln::ConfigError::DuplicateRoute { method: Method::Get, .. })
    ));
}
