//! Socket-level tests for the redirect listener and TLS configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::LOCATION, redirect::Policy, StatusCode};

use autotls::acme::CertificateManager;
use autotls::http::{new_redirect_server, Server};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn redirect_listener_answers_with_301() {
    let server = Arc::new(new_redirect_server(SocketAddr::from(([127, 0, 0, 1], 0))));
    let spinning = tokio::spawn({
        let server = server.clone();
        async move { server.spin().await }
    });
    let addr = server.listening().await.expect("redirect server did not bind");

    let client = client();
    for (target, method) in [
        ("/", reqwest::Method::GET),
        ("/a/b?x=1&y=two%20words", reqwest::Method::GET),
        ("/form", reqwest::Method::POST),
    ] {
        let response = client
            .request(method, format!("http://{}{}", addr, target))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[LOCATION].to_str().unwrap(),
            format!("https://{}{}", addr, target)
        );
    }

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    spinning.await.unwrap().unwrap();
}

#[tokio::test]
async fn build_tls_config_is_usable() {
    let config = autotls::build_tls_config(["example.com"]).unwrap();
    assert!(config
        .alpn_protocols()
        .iter()
        .any(|p| p.as_slice() == b"acme-tls/1"));
    assert!(config.alpn_protocols().iter().any(|p| p.as_slice() == b"h2"));
}

#[tokio::test]
async fn uncached_manager_builds_config() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let manager = CertificateManager::builder()
        .cache_dir(file.path().join("unusable"))
        .build();

    assert!(manager.cache_dir().is_none());
    assert!(manager.tls_config().is_ok());
    assert!(manager.authorize("any.example.org").is_ok());
}

#[tokio::test]
async fn crate_root_run_reports_bind_failure() {
    let taken = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let manager = CertificateManager::builder().no_cache().build();
    let secure = autotls::new_secure_server(
        axum::Router::new(),
        &manager,
        &autotls::TlsSettings::default(),
        autotls::http::ServerOptions::default().with_addr(taken.local_addr().unwrap()),
    )
    .unwrap();

    let (ctx, _token) = autotls::LifecycleContext::cancellable();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        autotls::run_with_context(ctx, Arc::new(secure)),
    )
    .await
    .expect("run did not return after a bind failure");

    assert!(
        matches!(result, Err(autotls::ServerError::Listener { .. })),
        "unexpected result: {result:?}"
    );
}
