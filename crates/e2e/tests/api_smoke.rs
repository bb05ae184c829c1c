//! HTTP API client against a mocked backend

use httpmock::prelude::*;
use serde_json::json;
use test_case::test_case;

use datalens_e2e::api::{ApiClient, WALKTHROUGH_KEYS};
use datalens_e2e::E2eError;

#[tokio::test]
async fn get_table_returns_generation_id() {
    let server = MockServer::start_async().await;
    let table = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/table/");
            then.status(200)
                .json_body(json!({ "generation_id": 42, "uid": "tallymarks", "columns": [] }));
        })
        .await;

    let api = ApiClient::new(server.base_url()).unwrap();
    let summary = api.get_table().await.unwrap();

    table.assert_async().await;
    assert_eq!(summary.generation_id, 42);
    assert_eq!(summary.extra["uid"], "tallymarks");
}

#[test_case("image" ; "image column")]
#[test_case("embedding" ; "embedding column")]
#[test_case("tallymarks" ; "tallymark column")]
#[tokio::test]
async fn get_cell_passes_generation_id(column: &str) {
    let server = MockServer::start_async().await;
    let cell = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(format!("/api/table/{}/0", column))
                .query_param("generation_id", "7");
            then.status(200).body("cell-bytes");
        })
        .await;

    let api = ApiClient::new(server.base_url()).unwrap();
    let payload = api.get_cell(column, 0, 7).await.unwrap();

    cell.assert_async().await;
    assert_eq!(payload, b"cell-bytes");
}

#[tokio::test]
async fn open_table_posts_dataset_path() {
    let server = MockServer::start_async().await;
    let open = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/table/open/build/datasets/tallymarks_dataset_small.h5");
            then.status(200);
        })
        .await;

    let api = ApiClient::new(server.base_url()).unwrap();
    api.open_table("build/datasets/tallymarks_dataset_small.h5").await.unwrap();

    open.assert_async().await;
}

#[tokio::test]
async fn skip_and_restore_tours() {
    let server = MockServer::start_async().await;

    let mut skipped = Vec::new();
    let mut restored = Vec::new();
    for key in WALKTHROUGH_KEYS {
        skipped.push(
            server
                .mock_async(|when, then| {
                    when.method(PUT)
                        .path(format!("/api/config/{}", key))
                        .json_body(json!({ "value": true }));
                    then.status(200);
                })
                .await,
        );
        restored.push(
            server
                .mock_async(|when, then| {
                    when.method(PUT)
                        .path(format!("/api/config/{}", key))
                        .json_body(json!({ "value": false }));
                    then.status(200);
                })
                .await,
        );
    }

    let api = ApiClient::new(server.base_url()).unwrap();
    api.skip_tours().await.unwrap();
    api.restore_tours().await.unwrap();

    for mock in skipped.iter().chain(restored.iter()) {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/config/walkthrough.main_tour.did_run");
            then.status(500);
        })
        .await;

    let api = ApiClient::new(server.base_url()).unwrap();
    let err = api.set_config("walkthrough.main_tour.did_run", true).await.unwrap_err();
    assert!(matches!(err, E2eError::Http(_)));
}

#[tokio::test]
async fn smoke_collects_column_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/table/");
            then.status(200).json_body(json!({ "generation_id": 3 }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/table/image/0").query_param("generation_id", "3");
            then.status(200).body("png");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/table/broken/0");
            then.status(422);
        })
        .await;

    let api = ApiClient::new(server.base_url()).unwrap();
    let report = api
        .smoke(&["image".to_string(), "broken".to_string()])
        .await
        .unwrap();

    assert_eq!(report.generation_id, 3);
    assert_eq!(report.passed, ["image"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].column, "broken");
    assert!(!report.success());
}
