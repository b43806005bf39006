//! JSON-RPC round trips through the provider against a mocked API
//!
//! Run with: cargo test --test protocol_tests

mod common;

use common::*;
use kowabunga_common::Kind;
use serde_json::{json, Value};
use terraform_provider_kowabunga::KowabungaProvider;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn call(provider: &KowabungaProvider, id: i64, method: &str, params: Value) -> Value {
    let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
    let response = provider.handle_request(&request.to_string()).await;
    serde_json::from_str(&response).expect("response must be JSON")
}

async fn configured(server: &MockServer) -> KowabungaProvider {
    let provider = KowabungaProvider::new();
    let response = call(
        &provider,
        1,
        "ConfigureProvider",
        json!({"config": {"uri": server.uri(), "token": TOKEN}}),
    )
    .await;
    assert_eq!(response["result"]["diagnostics"], json!([]));
    provider
}

#[tokio::test]
async fn test_region_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("/region")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "r-1",
            "name": "eu-west",
            "description": "Western Europe"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(api_path("/region/r-1")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let provider = configured(&server).await;

    let planned = call(
        &provider,
        2,
        "PlanResourceChange",
        json!({
            "type_name": "kowabunga_region",
            "prior_state": null,
            "proposed_new_state": {"id": null, "name": "eu-west", "desc": "Western Europe", "timeouts": null}
        }),
    )
    .await;
    let planned_state = planned["result"]["planned_state"].clone();
    assert!(planned_state["id"].is_null());

    let applied = call(
        &provider,
        3,
        "ApplyResourceChange",
        json!({
            "type_name": "kowabunga_region",
            "prior_state": null,
            "planned_state": planned_state
        }),
    )
    .await;
    assert_eq!(applied["id"], 3);
    let new_state = applied["result"]["new_state"].clone();
    assert_eq!(new_state["id"], "r-1");

    let destroyed = call(
        &provider,
        4,
        "ApplyResourceChange",
        json!({
            "type_name": "kowabunga_region",
            "prior_state": new_state,
            "planned_state": null
        }),
    )
    .await;
    assert!(destroyed["result"]["new_state"].is_null());
    assert_eq!(destroyed["result"]["diagnostics"], json!([]));

    let read = call(
        &provider,
        5,
        "ReadResource",
        json!({"type_name": "kowabunga_region", "current_state": {"id": "r-1", "name": "eu-west"}}),
    )
    .await;
    assert!(read["result"]["new_state"].is_null());
}

#[tokio::test]
async fn test_read_data_source() {
    let server = MockServer::start().await;
    mount_listing(&server, Kind::Zone, &["z-1"]).await;
    mount_object(&server, Kind::Zone, json!({"id": "z-1", "name": "eu-west-a"})).await;

    let provider = configured(&server).await;
    let response = call(
        &provider,
        2,
        "ReadDataSource",
        json!({"type_name": "kowabunga_zone", "config": {"name": "eu-west-a", "id": null}}),
    )
    .await;

    assert_eq!(response["result"]["state"]["id"], "z-1");
    assert_eq!(response["result"]["state"]["name"], "eu-west-a");
}

#[tokio::test]
async fn test_read_data_source_unknown_name() {
    let server = MockServer::start().await;
    mount_listing(&server, Kind::Zone, &[]).await;

    let provider = configured(&server).await;
    let response = call(
        &provider,
        2,
        "ReadDataSource",
        json!({"type_name": "kowabunga_zone", "config": {"name": "nowhere"}}),
    )
    .await;

    let diag = &response["result"]["diagnostics"][0];
    assert_eq!(diag["summary"], "Failed to read zone");
    assert_eq!(diag["detail"], "Unknown zone");
}

#[tokio::test]
async fn test_unauthorized_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = configured(&server).await;
    let response = call(
        &provider,
        2,
        "ReadResource",
        json!({"type_name": "kowabunga_zone", "current_state": {"id": "z-1"}}),
    )
    .await;

    let diag = &response["result"]["diagnostics"][0];
    assert_eq!(diag["summary"], "Failed to read zone");
    assert_eq!(diag["detail"], "Authentication failed");
}

#[tokio::test]
async fn test_malformed_request() {
    let provider = KowabungaProvider::new();
    let response: Value =
        serde_json::from_str(&provider.handle_request("{not json").await).unwrap();
    assert_eq!(response["error"]["code"], -32700);
}
