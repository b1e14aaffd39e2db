//! Capability cache synchronisation against a mocked backend.

use comfymcp_comfyui::api::ComfyUIApi;
use comfymcp_comfyui::sync::sync_capability_cache;
use comfymcp_core::capability::CapabilityStore;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn object_info() -> serde_json::Value {
    json!({
        "CheckpointLoaderSimple": {
            "input": { "required": { "ckpt_name": [["sd_xl_base_1.0.safetensors"], { "tooltip": "Checkpoint" }] } }
        }
    })
}

#[tokio::test]
async fn missing_cache_is_fetched_and_written() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/object_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object_info()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CapabilityStore::new(dir.path().join("object_info"), "127.0.0.1", 8188);
    let api = ComfyUIApi::new(server.uri());

    assert!(sync_capability_cache(&api, &store).await);
    let map = store.load().await.expect("cache should be readable");
    let opts = map.checkpoint_options().unwrap();
    assert_eq!(opts.models, vec!["sd_xl_base_1.0.safetensors"]);
}

#[tokio::test]
async fn existing_cache_is_not_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/object_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object_info()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CapabilityStore::new(dir.path(), "127.0.0.1", 8188);
    store.save(&json!({ "KSampler": {} })).await.unwrap();

    assert!(sync_capability_cache(&ComfyUIApi::new(server.uri()), &store).await);
    assert!(store.load().await.unwrap().get("KSampler").is_some());
}

#[tokio::test]
async fn backend_failure_leaves_no_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/object_info"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CapabilityStore::new(dir.path(), "127.0.0.1", 8188);

    assert!(!sync_capability_cache(&ComfyUIApi::new(server.uri()), &store).await);
    assert!(!store.exists().await);
}
