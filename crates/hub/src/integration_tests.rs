// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use sonde_packs::{FakeFetch, FetchError};
use sonde_storage::Store;

fn executor_with(fetch: Arc<FakeFetch>) -> (IntegrationExecutor, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory(None).unwrap());
    let registry = Arc::new(PackRegistry::builtin());
    (IntegrationExecutor::new(registry, Arc::clone(&store), fetch), store)
}

fn oauth_creds() -> Credentials {
    Credentials::OAuth2 {
        access_token: "old".into(),
        refresh_token: "r".into(),
        token_url: "https://login.example/token".into(),
    }
}

#[tokio::test]
async fn successful_probe_carries_hub_metadata() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let (executor, _store) = executor_with(fetch);

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Success);
    assert_eq!(resp.data["origin"], "1.2.3.4");
    assert_eq!(resp.metadata.agent_version, "hub");
    assert_eq!(resp.metadata.pack_name, "httpbin");
}

#[tokio::test]
async fn unknown_pack_and_probe_are_structured_errors() {
    let (executor, _store) = executor_with(Arc::new(FakeFetch::new()));

    let resp = executor.execute("ghost.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert!(resp.data["error"].as_str().unwrap().contains("ghost"));

    let resp = executor.execute("httpbin.ghost", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);

    let resp = executor.execute("system.uptime", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert!(resp.data["error"].as_str().unwrap().contains("not an integration pack"));
}

#[tokio::test(start_paused = true)]
async fn transient_statuses_retry_twice_with_backoff() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_error(FetchError::Status { status: 503, body: "bad gateway".into() });
    fetch.push_error(FetchError::Status { status: 502, body: "bad gateway".into() });
    fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let (executor, _store) = executor_with(Arc::clone(&fetch));

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Success);
    assert_eq!(fetch.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_exhausts_retries_and_surfaces_error() {
    let fetch = Arc::new(FakeFetch::new());
    for _ in 0..3 {
        fetch.push_error(FetchError::Status { status: 500, body: "boom".into() });
    }
    let (executor, _store) = executor_with(Arc::clone(&fetch));

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert_eq!(fetch.requests().len(), 3);
}

#[tokio::test]
async fn non_transient_http_failure_does_not_retry() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_error(FetchError::Status { status: 404, body: "missing".into() });
    let (executor, _store) = executor_with(Arc::clone(&fetch));

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert_eq!(fetch.requests().len(), 1);
}

#[tokio::test]
async fn oauth_401_refreshes_once_and_retries() {
    // A 401 triggers one POST to the token URL, the handler is retried
    // once, and the new token lands in place.
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_error(FetchError::Status { status: 401, body: "expired".into() });
    fetch.push_json(200, json!({"access_token": "new", "expires_in": 3600}));
    fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let (executor, store) = executor_with(Arc::clone(&fetch));

    store
        .create_integration("httpbin", "httpbin", "Httpbin", &json!({}), Some(&oauth_creds()), 1_000)
        .unwrap();

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Success);

    let requests = fetch.requests();
    assert_eq!(requests.len(), 3);
    // Exactly one refresh POST, to the configured token URL.
    let refreshes: Vec<_> =
        requests.iter().filter(|r| r.url == "https://login.example/token").collect();
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].method, "POST");
    let form = refreshes[0].form.as_ref().unwrap();
    assert!(form.contains(&("grant_type".to_string(), "refresh_token".to_string())));
    assert!(form.contains(&("refresh_token".to_string(), "r".to_string())));

    // The retried handler call carried the refreshed token.
    let last = requests.last().unwrap();
    assert!(last
        .headers
        .iter()
        .any(|(k, v)| k == "Authorization" && v == "Bearer new"));

    // And the stored credentials were updated in place.
    let rec = store.integration("httpbin").unwrap().unwrap();
    match rec.credentials.unwrap() {
        Credentials::OAuth2 { access_token, refresh_token, .. } => {
            assert_eq!(access_token, "new");
            assert_eq!(refresh_token, "r");
        }
        other => panic!("unexpected credentials: {other:?}"),
    }
}

#[tokio::test]
async fn second_401_after_refresh_surfaces_error() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_error(FetchError::Status { status: 401, body: "expired".into() });
    fetch.push_json(200, json!({"access_token": "new"}));
    fetch.push_error(FetchError::Status { status: 401, body: "still expired".into() });
    let (executor, store) = executor_with(Arc::clone(&fetch));
    store
        .create_integration("httpbin", "httpbin", "Httpbin", &json!({}), Some(&oauth_creds()), 1_000)
        .unwrap();

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert_eq!(fetch.requests().len(), 3);
}

#[tokio::test]
async fn non_oauth_401_does_not_refresh() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_error(FetchError::Status { status: 401, body: "nope".into() });
    let (executor, _store) = executor_with(Arc::clone(&fetch));

    let resp = executor.execute("httpbin.ip", &json!({})).await;
    assert_eq!(resp.status, ProbeStatus::Error);
    assert_eq!(fetch.requests().len(), 1);
}

#[tokio::test]
async fn test_connection_runs_the_declared_handler() {
    let fetch = Arc::new(FakeFetch::new());
    fetch.push_json(200, json!({"origin": "1.2.3.4"}));
    let (executor, _store) = executor_with(fetch);

    let resp = executor.test_connection("httpbin").await;
    assert_eq!(resp.status, ProbeStatus::Success);
    assert_eq!(resp.probe, "httpbin.testConnection");

    let resp = executor.test_connection("ghost").await;
    assert_eq!(resp.status, ProbeStatus::Error);
}
