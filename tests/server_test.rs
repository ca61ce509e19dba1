//! Real-socket tests: the server as the ingress sees it.

use std::time::Duration;
use tokio::net::TcpListener;

use ingress_auth::lifecycle::Shutdown;
use ingress_auth::HttpServer;

mod common;

#[tokio::test]
async fn test_serves_decisions_and_health_over_tcp() {
    let svc = common::service(|_| {});
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(svc.pipeline.clone(), &svc.config.listener);
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let res = client
        .get(format!("http://{}/", addr))
        .header("x-original-url", "https://app.example.com/admin/panel")
        .basic_auth("alice", Some("wonderland"))
        .send()
        .await
        .expect("service unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-user"], "alice");
    assert_eq!(res.headers()["x-groups"], "admins");

    // Without forwarding headers the socket peer is the client
    let res = client
        .get(format!("http://{}/", addr))
        .header("x-original-url", "https://internal.example.com/")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client.get(format!("http://{}/health", addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backends"][0]["name"], "htpasswd");

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_health_degrades_when_credentials_vanish() {
    let svc = common::service(|_| {});
    std::fs::remove_file(&svc.config.htpasswd.file_path).unwrap();

    let response = common::send(
        &svc.router,
        axum::http::Request::builder().uri("/health"),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["backends"][0]["healthy"], false);
}
