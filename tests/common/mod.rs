#![allow(dead_code)]

use bytes::Bytes;
use kiln::{App, Metrics, Request, Response, ShutdownSignal, shutdown};

pub fn app() -> (App, Metrics, ShutdownSignal) {
    let (handle, signal) = shutdown::channel(shutdown::DEFAULT_BUFFER);
    let metrics = Metrics::new();
    (App::standard(handle, metrics.clone()), metrics, signal)
}

pub fn request(method: http::Method, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .expect("valid request")
        .into()
}

pub fn get(path: &str) -> Request {
    request(http::Method::GET, path)
}

pub fn text(res: &Response) -> String {
    String::from_utf8(res.body().to_vec()).expect("utf-8 body")
}
