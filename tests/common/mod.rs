//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use ingress_auth::clock::ManualClock;
use ingress_auth::config::ServiceConfig;
use ingress_auth::http::HttpServer;
use ingress_auth::lifecycle::startup;
use ingress_auth::DecisionPipeline;

pub const RULES: &str = "\
# host              path      methods  ips         action
public.example.com  *         *        *           public
*                   /admin/*  *        *           restrict groups=admins
*                   /blocked  *        *           forbidden
internal.example.com *        GET      10.0.0.0/8  public
";

pub const GROUPS: &str = "admins: alice\nstaff: alice bob\n";

pub const OVERRIDE_SECRET: &str = "ingress-shared-secret";

/// A fully wired service backed by files in a temporary directory.
pub struct TestService {
    pub router: Router,
    pub pipeline: Arc<DecisionPipeline>,
    pub clock: ManualClock,
    pub config: ServiceConfig,
    pub dir: TempDir,
}

pub fn sha_entry(user: &str, password: &str) -> String {
    format!("{}:{{SHA}}{}", user, STANDARD.encode(Sha1::digest(password.as_bytes())))
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

/// Build a service with alice (bcrypt) and bob ({SHA}); `configure` may adjust the config.
pub fn service(configure: impl FnOnce(&mut ServiceConfig)) -> TestService {
    let dir = tempfile::tempdir().unwrap();
    let htpasswd = format!(
        "alice:{}\n{}\n",
        bcrypt::hash("wonderland", 4).unwrap(),
        sha_entry("bob", "builder")
    );

    let mut config = ServiceConfig::default();
    config.htpasswd.file_path = write(dir.path(), ".htpasswd", &htpasswd);
    config.htpasswd.group_file_path = Some(write(dir.path(), ".htgroups", GROUPS));
    config.rules.path = write(dir.path(), "rules.conf", RULES);
    config.rules.ingress_rules_secret = OVERRIDE_SECRET.to_string();
    config.metrics.enabled = false;
    configure(&mut config);

    let clock = ManualClock::new();
    let pipeline = Arc::new(startup::build_pipeline(&config, Arc::new(clock.clone())).unwrap());
    let router = HttpServer::new(pipeline.clone(), &config.listener).router();

    TestService {
        router,
        pipeline,
        clock,
        config,
        dir,
    }
}

pub fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

/// A decision request for `original_url` from `ip`.
pub fn decision_request(original_url: &str, ip: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(Method::GET)
        .uri("/")
        .header("x-original-url", original_url)
        .header("x-real-ip", ip)
}

pub fn with_credentials(builder: axum::http::request::Builder, user: &str, password: &str) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, basic(user, password))
}

pub async fn send(router: &Router, request: axum::http::request::Builder) -> Response<Body> {
    router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
