//! Serialization of concurrent operations on one provider session
//!
//! Run with: cargo test --test concurrency_tests

mod common;

use common::*;
use kowabunga_common::Kind;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use terraform_provider_kowabunga::data_sources::{DataSource, NamedLookup};
use terraform_provider_kowabunga::engine::Managed;
use terraform_provider_kowabunga::resources::{Resource, Zone};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SLOW: Duration = Duration::from_millis(300);

async fn mount_slow_zone_create(server: &MockServer, name: &str, id: &str) {
    Mock::given(method("POST"))
        .and(path(api_path("/region/r-1/zone")))
        .and(body_partial_json(json!({"name": name})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"id": id, "name": name}))
                .set_delay(SLOW),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_creates_do_not_interleave() {
    let server = MockServer::start().await;
    mount_object(&server, Kind::Region, json!({"id": "r-1", "name": "eu-west"})).await;
    mount_slow_zone_create(&server, "eu-west-a", "z-a").await;
    mount_slow_zone_create(&server, "eu-west-b", "z-b").await;

    let session = Arc::new(create_test_session(&server));
    let zone = Arc::new(Managed::<Zone>::new());

    let tasks: Vec<_> = ["eu-west-a", "eu-west-b"]
        .into_iter()
        .map(|name| {
            let session = Arc::clone(&session);
            let zone = Arc::clone(&zone);
            tokio::spawn(async move {
                let planned = state(json!({"region": "r-1", "name": name}));
                zone.create(&session, &planned).await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    // each operation resolves its parent then posts, with nothing in between
    let methods: Vec<String> = request_log(&server)
        .await
        .into_iter()
        .map(|entry| entry.split(' ').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(methods, vec!["GET", "POST", "GET", "POST"]);
}

#[tokio::test]
async fn test_data_source_waits_for_running_operation() {
    let server = MockServer::start().await;
    mount_object(&server, Kind::Region, json!({"id": "r-1", "name": "eu-west"})).await;
    mount_slow_zone_create(&server, "eu-west-a", "z-a").await;

    let session = Arc::new(create_test_session(&server));

    let create = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let planned = state(json!({"region": "r-1", "name": "eu-west-a"}));
            Managed::<Zone>::new().create(&session, &planned).await
        })
    };

    // let the create take the lock first
    tokio::time::sleep(Duration::from_millis(50)).await;

    let lookup = NamedLookup::new("kowabunga_region", Kind::Region);
    let found = lookup
        .read(&session, &state(json!({"name": "r-1"})))
        .await
        .unwrap();
    assert_eq!(found.get_string("id"), Some("r-1".to_string()));

    assert!(create.await.unwrap().is_ok());

    let log = request_log(&server).await;
    let post = log.iter().position(|e| e.starts_with("POST")).unwrap();
    assert_eq!(post, 1, "lookup ran while the create held the lock: {:?}", log);
    assert_eq!(log.len(), 3);
}
