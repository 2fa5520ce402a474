//! Proxy discovery against real sockets.

use super::{address_of, closed_port, init_test_env, VERIFY_URL};
use collection_replay::proxy::{ProxyError, ProxyLocator};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn locator(fallback: Vec<(String, u16)>) -> ProxyLocator {
    ProxyLocator::new(
        Duration::from_millis(500),
        VERIFY_URL,
        Duration::from_secs(2),
        fallback,
    )
}

#[tokio::test]
async fn test_selects_first_verified_fallback() {
    init_test_env();

    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&proxy)
        .await;

    let closed = ("127.0.0.1".to_string(), closed_port());
    let selected = locator(vec![closed.clone(), address_of(&proxy)])
        .discover(None)
        .await
        .unwrap();

    assert_eq!((selected.host.clone(), selected.port), address_of(&proxy));
    assert!(selected.verified);
}

#[tokio::test]
async fn test_explicit_candidate_tried_first() {
    init_test_env();

    let explicit = MockServer::start().await;
    let fallback = MockServer::start().await;
    Mock::given(path("/get"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&explicit)
        .await;
    Mock::given(path("/get"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fallback)
        .await;

    let selected = locator(vec![address_of(&fallback)])
        .discover(Some(address_of(&explicit)))
        .await
        .unwrap();

    assert_eq!(selected.port, explicit.address().port());
}

#[tokio::test]
async fn test_reachable_but_broken_proxy_is_rejected() {
    init_test_env();

    let broken = MockServer::start().await;
    Mock::given(path("/get"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&broken)
        .await;

    let err = locator(Vec::new())
        .discover(Some(address_of(&broken)))
        .await
        .unwrap_err();

    let ProxyError::NotFound { tried } = err else {
        panic!("expected NotFound");
    };
    assert_eq!(tried.len(), 1);
    assert!(tried[0].reachable);
    assert!(!tried[0].verified);
}
