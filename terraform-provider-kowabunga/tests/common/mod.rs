//! Common test utilities and helpers

#![allow(dead_code)]

use kowabunga_common::Kind;
use serde_json::Value;
use terraform_provider_kowabunga::client::{KowabungaClient, API_PREFIX, TOKEN_HEADER};
use terraform_provider_kowabunga::resources::ResourceState;
use terraform_provider_kowabunga::session::Session;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Full API path of `path`
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

/// Client pointed at the mock server
pub fn create_test_client(server: &MockServer) -> KowabungaClient {
    KowabungaClient::new(&server.uri())
        .expect("Failed to create API client")
        .with_token(TOKEN)
}

pub fn create_test_session(server: &MockServer) -> Session {
    Session::new(create_test_client(server))
}

pub fn state(value: Value) -> ResourceState {
    ResourceState::from_value(&value).expect("state must be a JSON object")
}

/// Serve `object` at its item path; the body must carry an `id`
pub async fn mount_object(server: &MockServer, kind: Kind, object: Value) {
    let id = object["id"].as_str().expect("object needs an id").to_string();
    Mock::given(method("GET"))
        .and(path(api_path(&kind.item_path(&id))))
        .and(header(TOKEN_HEADER, TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(object))
        .mount(server)
        .await;
}

/// Serve the ID listing of `kind`
pub async fn mount_listing(server: &MockServer, kind: Kind, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path(api_path(&kind.list_path())))
        .and(header(TOKEN_HEADER, TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(ids))
        .mount(server)
        .await;
}

/// Methods and paths received so far, in arrival order
pub async fn request_log(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| format!("{} {}", r.method, r.url.path()))
        .collect()
}
