//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use route_dispatcher::config::AppConfig;
use route_dispatcher::security::{Claims, JwtVerifier};
use route_dispatcher::store::MemoryStore;
use route_dispatcher::{AppState, Application, Routes};

pub const SECRET: &[u8] = b"integration-test-secret";

/// Defaults with debug mode set as requested.
pub fn config(debug_mode: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.debug_mode = debug_mode;
    config
}

/// State with a JWT verifier and, optionally, a store.
pub fn state(debug_mode: bool, store: Option<Arc<MemoryStore>>) -> AppState {
    let state = AppState::new(config(debug_mode))
        .with_verifier(Arc::new(JwtVerifier::from_secret(SECRET)));
    match store {
        Some(store) => state.with_resources(store),
        None => state,
    }
}

/// Register `routes` and return the finished router.
pub fn app(routes: Routes, state: AppState) -> Router {
    Application::new(&routes, state)
        .expect("routes should register")
        .router()
}

/// A bearer token for `sub` holding `roles`.
pub fn token(sub: &str, roles: &[&str]) -> String {
    JwtVerifier::from_secret(SECRET)
        .issue(&Claims::new(sub, roles.iter().copied(), 3600))
        .expect("token should sign")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    request
}

/// A response with its body decoded as JSON (`Null` when it is not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    }
}

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's events into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
