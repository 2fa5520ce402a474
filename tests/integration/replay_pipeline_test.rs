//! End-to-end runs: collection and scope documents on disk, a mock proxy,
//! a mock token endpoint.

use super::{address_of, closed_port, init_test_env, test_config, write_json};
use collection_replay::collection::Collection;
use collection_replay::credentials::{load_profiles, CredentialProvider, CredentialState};
use collection_replay::pipeline::{run, JsonFileSink, ReplayContext, ReplayError};
use collection_replay::variables::load_scope;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn proxy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn collection_doc() -> serde_json::Value {
    json!({
        "info": {"_postman_id": "c-1", "name": "users api"},
        "item": [
            {"name": "Users", "item": [
                {"name": "Get user", "request": {
                    "method": "GET",
                    "url": "{{base_url}}/users/{{id}}",
                    "header": [
                        {"key": "Authorization", "value": "Bearer {{token}}"},
                        {"key": "X-Disabled", "value": "1", "disabled": true}
                    ]
                }},
                {"name": "Broken", "request": {
                    "method": "GET",
                    "url": {"path": ["nowhere"]}
                }}
            ]},
            {"name": "Create user", "request": {
                "method": "POST",
                "url": {
                    "protocol": "http",
                    "host": ["api", "test"],
                    "path": ["users"],
                    "query": [
                        {"key": "notify", "value": "true"},
                        {"key": "debug", "value": "1", "disabled": true}
                    ]
                },
                "header": [{"key": "Content-Type", "value": "application/json"}],
                "body": {"mode": "raw", "raw": "{\"name\": \"{{name}}\"}"}
            }},
            {"name": "Explode", "request": {"method": "GET", "url": "{{base_url}}/explode"}}
        ],
        "variable": [
            {"key": "id", "value": "7"},
            {"key": "name", "value": "ann"}
        ]
    })
}

fn scope_doc() -> serde_json::Value {
    json!({
        "name": "staging",
        "values": [
            {"key": "base_url", "value": "http://api.test", "enabled": true},
            {"key": "id", "value": "42", "enabled": true},
            {"key": "token", "value": "abc", "enabled": true},
            {"key": "unused", "value": "x", "enabled": false}
        ]
    })
}

#[tokio::test]
async fn test_replay_collection_through_proxy() {
    init_test_env();
    let temp = TempDir::new().unwrap();
    let proxy = proxy_server().await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("Authorization", "Bearer abc"))
        .and(header_exists("X-Replay-Request-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": 42}"#))
        .expect(1)
        .mount(&proxy)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&proxy)
        .await;
    Mock::given(method("GET"))
        .and(path("/explode"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&proxy)
        .await;

    let collection_path = write_json(temp.path(), "collection.json", &collection_doc());
    let scope_path = write_json(temp.path(), "scope.json", &scope_doc());

    let config = test_config(address_of(&proxy));
    let collection = Collection::load(&collection_path).unwrap();
    let scope = load_scope(&scope_path, &config.anchor_variable).unwrap();
    let ctx = ReplayContext::new(config).with_scope(scope);

    let outcome = run(&ctx, &collection, None).await.unwrap();
    let results = &outcome.results;

    let names: Vec<&str> = results.requests.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Get user", "Broken", "Create user", "Explode"]);
    assert_eq!(results.total, 4);
    assert_eq!(results.succeeded, 2);
    assert_eq!(results.failed, 2);

    let get_user = &results.requests[0];
    assert_eq!(get_user.folder, "Users");
    assert_eq!(get_user.url, "http://api.test/users/42");
    assert_eq!(get_user.status_code, Some(200));
    assert_eq!(get_user.response_body, r#"{"id": 42}"#);

    let broken = &results.requests[1];
    assert_eq!(broken.status_code, None);
    assert!(broken.error.is_some());

    let create = &results.requests[2];
    assert_eq!(create.url, "http://api.test/users?notify=true");
    assert_eq!(create.request_body.as_deref(), Some(r#"{"name": "ann"}"#));

    // 500 is recorded, not retried
    let explode = &results.requests[3];
    assert_eq!(explode.status_code, Some(500));
    assert_eq!(explode.attempts, 1);
    assert!(!explode.success);

    let output = temp.path().join("out/results.json");
    outcome.write_to(&mut JsonFileSink::new(&output)).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["metadata"]["collection"], "users api");
    assert_eq!(written["metadata"]["total_requests"], 4);
    assert_eq!(written["metadata"]["successful_requests"], 2);
    assert_eq!(written["requests"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_dynamic_token_refreshed_once_per_lifetime() {
    init_test_env();
    let temp = TempDir::new().unwrap();
    let proxy = proxy_server().await;

    let auth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "fresh-1"}})),
        )
        .expect(1)
        .mount(&auth)
        .await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer fresh-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&proxy)
        .await;

    let credentials_dir = temp.path().join("credentials");
    write_json(
        &credentials_dir,
        "bearer/session.json",
        &json!({
            "label": "session",
            "is_dynamic": true,
            "auth_url": format!("{}/token", auth.uri()),
            "token_location": "data.token",
            "token_refresh_interval": 600
        }),
    );

    let collection = Collection::from_json(
        &json!({
            "info": {"name": "two"},
            "item": [
                {"name": "one", "request": {"url": "http://api.test/one"}},
                {"name": "two", "request": {"url": "http://api.test/two"}}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let mut provider = CredentialProvider::new(load_profiles(&credentials_dir).unwrap()).unwrap();
    provider.set_active("session").unwrap();
    let ctx = ReplayContext::new(test_config(address_of(&proxy))).with_credentials(provider);

    let outcome = run(&ctx, &collection, None).await.unwrap();
    assert_eq!(outcome.results.succeeded, 2);

    let provider = ctx.credentials.as_ref().unwrap();
    let profile = provider.snapshot("session").await.unwrap();
    assert_eq!(profile.state(chrono::Utc::now()), CredentialState::Valid);
}

#[tokio::test]
async fn test_failed_refresh_does_not_stop_the_run() {
    init_test_env();
    let proxy = proxy_server().await;

    let auth = MockServer::start().await;
    Mock::given(path("/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&auth)
        .await;
    Mock::given(path("/open"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&proxy)
        .await;

    let profile = serde_json::from_value(json!({
        "label": "session",
        "type": "bearer",
        "is_dynamic": true,
        "auth_url": format!("{}/token", auth.uri())
    }))
    .unwrap();
    let mut provider = CredentialProvider::new(vec![profile]).unwrap();
    provider.set_active("session").unwrap();

    let collection = Collection::from_json(
        &json!({"item": [{"name": "open", "request": {"url": "http://api.test/open"}}]})
            .to_string(),
    )
    .unwrap();
    let ctx = ReplayContext::new(test_config(address_of(&proxy))).with_credentials(provider);

    let outcome = run(&ctx, &collection, None).await.unwrap();
    let result = &outcome.results.requests[0];

    assert!(result.success);
    assert!(result
        .annotations
        .iter()
        .any(|note| note.starts_with("credential refresh failed") && note.contains("401")));
    assert!(!result
        .request_headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("Authorization")));
}

#[tokio::test]
async fn test_no_proxy_found_dispatches_nothing() {
    init_test_env();

    let collection = Collection::from_json(&collection_doc().to_string()).unwrap();
    let ctx = ReplayContext::new(test_config(("127.0.0.1".to_string(), closed_port())));

    let err = run(&ctx, &collection, None).await.unwrap_err();
    assert!(matches!(err, ReplayError::ProxyNotFound(_)));
}

#[tokio::test]
async fn test_malformed_scope_is_config_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scope.json");
    std::fs::write(&path, "[1, 2").unwrap();

    let err: ReplayError = load_scope(&path, "base_url").unwrap_err().into();
    assert!(matches!(err, ReplayError::Config(_)));
}
