//! Secret fetching against a mocked vault.

use async_trait::async_trait;
use kvconf_keyvault::{
    AccessToken, KeyVaultError, KeyVaultProvider, RetryConfig, SecretClient, SecretProvider,
    TokenCredential,
};
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
struct StaticCredential;

#[async_trait]
impl TokenCredential for StaticCredential {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_token(&self, _scope: &str) -> kvconf_keyvault::Result<AccessToken> {
        Ok(AccessToken::new("test-token", Duration::from_secs(3600)))
    }
}

fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        backoff_multiplier: 2.0,
    }
}

fn client(server: &MockServer) -> SecretClient {
    let endpoint = Url::parse(&format!("{}/", server.uri())).unwrap();
    SecretClient::new(endpoint, Arc::new(StaticCredential))
        .unwrap()
        .with_retry(fast_retry(3))
}

fn item(server: &MockServer, name: &str, enabled: bool) -> serde_json::Value {
    json!({
        "id": format!("{}/secrets/{name}", server.uri()),
        "attributes": { "enabled": enabled }
    })
}

async fn mount_secret(server: &MockServer, name: &str, value: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/secrets/{name}")))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": value,
            "id": format!("{}/secrets/{name}/0123", server.uri()),
            "attributes": { "enabled": true }
        })))
        .mount(server)
        .await;
}

async fn mount_list(server: &MockServer, items: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param("api-version", "7.4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": items,
            "nextLink": null
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_all_normalizes_enabled_secrets() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![
            item(&server, "Database--ConnectionString", true),
            item(&server, "ApiKey", true),
            item(&server, "Retired", false),
        ],
    )
    .await;
    mount_secret(&server, "Database--ConnectionString", "Server=db").await;
    mount_secret(&server, "ApiKey", "k-123").await;

    let provider = KeyVaultProvider::new(client(&server));
    let secrets = provider.get_secrets(None, true).await.unwrap();

    let keys: Vec<&str> = secrets.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["Database:ConnectionString", "ApiKey"]);
    assert_eq!(secrets["Database:ConnectionString"], "Server=db");
    assert_eq!(secrets["ApiKey"], "k-123");
}

#[tokio::test]
async fn fetch_all_without_normalization_keeps_names() {
    let server = MockServer::start().await;
    mount_list(&server, vec![item(&server, "Logging--Level", true)]).await;
    mount_secret(&server, "Logging--Level", "Debug").await;

    let provider = KeyVaultProvider::new(client(&server));
    let secrets = provider.get_secrets(None, false).await.unwrap();
    assert_eq!(secrets.get("Logging--Level").map(String::as_str), Some("Debug"));
}

#[tokio::test]
async fn fetch_all_follows_next_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param_is_missing("$skiptoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [item(&server, "First", true)],
            "nextLink": format!("{}/secrets?api-version=7.4&$skiptoken=page2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [item(&server, "Second", true)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_secret(&server, "First", "1").await;
    mount_secret(&server, "Second", "2").await;

    let names = client(&server).list_enabled_secret_names().await.unwrap();
    assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
}

#[tokio::test]
async fn named_fetch_skips_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(0)
        .mount(&server)
        .await;
    mount_secret(&server, "Cache--Host", "redis").await;
    mount_secret(&server, "Unrequested", "x").await;

    let provider = KeyVaultProvider::new(client(&server));
    let names = vec!["Cache--Host".to_string()];
    let secrets = provider.get_secrets(Some(&names), true).await.unwrap();

    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets["Cache:Host"], "redis");
}

#[tokio::test]
async fn missing_named_secret_fails_whole_call() {
    let server = MockServer::start().await;
    mount_secret(&server, "Present", "here").await;
    Mock::given(method("GET"))
        .and(path("/secrets/Absent"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "SecretNotFound", "message": "A secret with (name/id) Absent was not found" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = KeyVaultProvider::new(client(&server));
    let names = vec!["Present".to_string(), "Absent".to_string()];
    let err = provider.get_secrets(Some(&names), true).await.unwrap_err();

    assert!(matches!(err, KeyVaultError::SecretNotFound { ref name } if name == "Absent"));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets/Flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_secret(&server, "Flaky", "eventually").await;

    let value = client(&server).get_secret_value("Flaky").await.unwrap();
    assert_eq!(value, "eventually");
}

#[tokio::test]
async fn retries_exhausted_reports_vault_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .list_enabled_secret_names()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyVaultError::VaultUnavailable { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn rejected_credential_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets/Locked"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Forbidden", "message": "Caller is not authorized" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).get_secret_value("Locked").await.unwrap_err();
    assert!(matches!(err, KeyVaultError::Authentication { .. }));
    assert!(err.to_string().contains("Caller is not authorized"));
}

#[tokio::test]
async fn colliding_names_fail() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![item(&server, "Db--Host", true), item(&server, "db--host", true)],
    )
    .await;
    mount_secret(&server, "Db--Host", "a").await;
    mount_secret(&server, "db--host", "b").await;

    let provider = KeyVaultProvider::new(client(&server));
    let err = provider.get_secrets(None, true).await.unwrap_err();
    assert!(matches!(err, KeyVaultError::SecretNameCollision { .. }));
}

#[tokio::test]
async fn repeated_fetches_requery_the_vault() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [item(&server, "A--B", true), item(&server, "C", true)]
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_secret(&server, "A--B", "1").await;
    mount_secret(&server, "C", "2").await;

    let provider = KeyVaultProvider::new(client(&server)).with_concurrency(1);
    let first = provider.get_secrets(None, true).await.unwrap();
    let second = provider.get_secrets(None, true).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn next_link_to_another_origin_is_rejected() {
    let server = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secrets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [item(&server, "First", true)],
            "nextLink": format!("{}/secrets?api-version=7.4&$skiptoken=page2", elsewhere.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(0)
        .mount(&elsewhere)
        .await;

    let err = client(&server).list_enabled_secret_names().await.unwrap_err();
    assert!(matches!(err, KeyVaultError::VaultRequest { .. }));
    assert!(err.to_string().contains("leaves the vault origin"));
}
