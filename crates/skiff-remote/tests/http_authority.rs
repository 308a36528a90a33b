//! HTTP authority integration tests against a mock server.

use std::collections::BTreeMap;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skiff_core::{Command, CommandKind};
use skiff_remote::{HttpAuthority, RemoteAuthority, RemoteError};

fn update_command(entity_id: &str) -> Command {
    Command::new(
        "u1",
        entity_id,
        CommandKind::Update {
            changed_fields: BTreeMap::from([("title".to_string(), json!("Buy oat milk"))]),
        },
    )
}

#[tokio::test]
async fn submit_commands_posts_batch_and_decodes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/commands"))
        .and(body_partial_json(json!({"userId": "u1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "succeeded": [{"commandId": "c1", "entityId": "t1"}],
            "conflicts": [],
            "serverChanges": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let response = authority
        .submit_commands("u1", &[update_command("t1")])
        .await
        .unwrap();

    assert_eq!(response.succeeded.len(), 1);
    assert_eq!(response.succeeded[0].entity_id, "t1");
}

#[tokio::test]
async fn fetch_task_returns_none_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let row = authority.fetch_task("u1", "ghost").await.unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn fetch_task_decodes_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/t1"))
        .and(query_param("userId", "u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1",
            "title": "Buy milk",
            "status": "completed",
        })))
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let row = authority.fetch_task("u1", "t1").await.unwrap().unwrap();
    assert_eq!(row.id, "t1");
    assert_eq!(row.to_task().unwrap().title, "Buy milk");
}

#[tokio::test]
async fn pull_changes_omits_since_for_full_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/changes"))
        .and(query_param("userId", "u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "t1", "title": "Buy milk"},
            {"id": "t2", "title": "Call the bank", "deleted": true},
        ])))
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let rows = authority.pull_changes("u1", None).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].deleted);
}

#[tokio::test]
async fn pull_changes_sends_since_when_present() {
    let server = MockServer::start().await;
    let since = chrono::Utc::now();
    Mock::given(method("GET"))
        .and(path("/v1/changes"))
        .and(query_param("since", since.to_rfc3339()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let rows = authority.pull_changes("u1", Some(since)).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn notifications_pull_and_ack() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "notificationId": "n1",
            "eventType": "task.updated",
            "entityId": "t1",
            "entityType": "task",
            "eventData": {},
        }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/notifications/ack"))
        .and(body_partial_json(json!({"notificationIds": ["n1"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let notifications = authority.pull_notifications("u1", None).await.unwrap();
    assert_eq!(notifications.len(), 1);

    authority
        .acknowledge_notifications("u1", &["n1".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn list_folders_decodes_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/folders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "folders": [{"id": "f1", "name": "Groceries", "createdAt": "2026-01-01T00:00:00Z"}],
            "version": "v7",
        })))
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let listing = authority.list_folders("u1").await.unwrap();
    assert_eq!(listing.folders.len(), 1);
    assert_eq!(listing.version.as_deref(), Some("v7"));
}

#[tokio::test]
async fn server_error_surfaces_as_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/changes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let authority = HttpAuthority::new(server.uri());
    let result = authority.pull_changes("u1", None).await;
    assert!(matches!(
        result,
        Err(RemoteError::UnexpectedStatus { status }) if status.as_u16() == 500
    ));
}
