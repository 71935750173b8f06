use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pandrive_core::{PanClient, PanErrorClass, PanResourceType};

#[tokio::test]
async fn get_resource_sends_bearer_token_and_drive_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("drive_id", "drive-1"))
        .and(query_param("path", "/Backup/Hello World.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "path": "/Backup/Hello World.txt",
            "name": "Hello World.txt",
            "type": "file",
            "file_id": "f-1",
            "size": 12,
            "content_hash": "aabbcc",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    let resource = client.get_resource("/Backup/Hello World.txt").await.unwrap();

    assert_eq!(resource.resource_type, PanResourceType::File);
    assert_eq!(resource.size, Some(12));
    assert_eq!(resource.updated_at.as_deref(), Some("2024-01-01T00:00:00Z"));
}

#[tokio::test]
async fn create_folder_uses_put() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/files/folder"))
        .and(query_param("path", "/Backup/Docs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "path": "/Backup/Docs",
            "name": "Docs",
            "type": "folder"
        })))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    let resource = client.create_folder("/Backup/Docs").await.unwrap();

    assert_eq!(resource.resource_type, PanResourceType::Folder);
    assert_eq!(resource.name, "Docs");
}

#[tokio::test]
async fn delete_resource_accepts_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/files"))
        .and(query_param("path", "/Backup/old.bin"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    client.delete_resource("/Backup/old.bin").await.unwrap();
}

#[tokio::test]
async fn download_link_carries_internal_url_family() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files/download"))
        .and(query_param("path", "/Backup/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://cdn.pandrive.net/a.txt",
            "internal_url": "https://cdn-internal.pandrive.net/a.txt",
            "method": "GET"
        })))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    let link = client.get_download_link("/Backup/a.txt").await.unwrap();

    assert_eq!(link.pick(false).as_str(), "https://cdn.pandrive.net/a.txt");
    assert_eq!(
        link.pick(true).as_str(),
        "https://cdn-internal.pandrive.net/a.txt"
    );
}

#[tokio::test]
async fn upload_link_sends_overwrite_flag_and_falls_back_without_internal_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files/upload"))
        .and(query_param("path", "/Backup/a.txt"))
        .and(query_param("overwrite", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://up.pandrive.net/a.txt",
            "method": "PUT"
        })))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    let link = client.get_upload_link("/Backup/a.txt", true).await.unwrap();

    assert_eq!(link.method, "PUT");
    assert_eq!(link.pick(true).as_str(), "https://up.pandrive.net/a.txt");
}

#[tokio::test]
async fn classifies_not_found_rate_limit_and_legal_block() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files"))
        .and(query_param("path", "/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/files"))
        .and(query_param("path", "/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/files"))
        .and(query_param("path", "/blocked"))
        .respond_with(ResponseTemplate::new(451).set_body_string("IllegalContent"))
        .mount(&server)
        .await;

    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();

    let err = client.get_resource("/gone").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_retryable());

    let err = client.get_resource("/busy").await.unwrap_err();
    assert_eq!(err.classification(), Some(PanErrorClass::RateLimit));
    assert!(err.is_retryable());

    let err = client.get_resource("/blocked").await.unwrap_err();
    assert!(err.is_illegal());
}
