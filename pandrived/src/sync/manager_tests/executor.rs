fn file_resource_json(path: &str, name: &str, hash: &str) -> serde_json::Value {
    serde_json::json!({
        "path": path,
        "name": name,
        "type": "file",
        "file_id": "f-9",
        "size": 3,
        "content_hash": hash,
        "updated_at": "2024-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn upload_worker_transfers_file_and_mirrors_metadata() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::UploadOnly, &local_root, "/R").await;

    let source = dir.path().join("a.txt");
    std::fs::write(&source, b"abc").unwrap();

    Mock::given(method("GET"))
        .and(url_path("/v1/files/upload"))
        .and(query_param("path", "/R/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/put-a", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/put-a"))
        .and(body_bytes(b"abc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1/files"))
        .and(query_param("path", "/R/a.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_resource_json("/R/a.txt", "a.txt", "h1")),
        )
        .mount(&server)
        .await;

    mgr.emit(
        ActionKind::Upload,
        Some(local_file(
            source.to_str().unwrap(),
            "h1",
            100,
            ScanStatus::Normal,
        )),
        None,
    )
    .await
    .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Success);
    let mirrored = mgr.pan_db.get("/R/a.txt").await.unwrap().unwrap();
    assert_eq!(mirrored.sha1, "h1");
    assert_eq!(mirrored.scan_status, ScanStatus::Normal);
}

#[tokio::test]
async fn upload_worker_creates_missing_parent_folders_first() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::UploadOnly, &local_root, "/R").await;

    std::fs::create_dir_all(dir.path().join("docs")).unwrap();
    let source = dir.path().join("docs/a.txt");
    std::fs::write(&source, b"abc").unwrap();

    Mock::given(method("GET"))
        .and(url_path("/v1/files"))
        .and(query_param("path", "/R/docs"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such folder"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/v1/files/folder"))
        .and(query_param("path", "/R/docs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "path": "/R/docs",
            "name": "docs",
            "type": "folder",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1/files/upload"))
        .and(query_param("path", "/R/docs/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/put-docs-a", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/put-docs-a"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1/files"))
        .and(query_param("path", "/R/docs/a.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_resource_json("/R/docs/a.txt", "a.txt", "h1")),
        )
        .mount(&server)
        .await;

    mgr.emit(
        ActionKind::Upload,
        Some(local_file(
            source.to_str().unwrap(),
            "h1",
            100,
            ScanStatus::Normal,
        )),
        None,
    )
    .await
    .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    // the created folder landed in the pan inventory
    let folder = mgr.pan_db.get("/R/docs").await.unwrap().unwrap();
    assert!(folder.is_folder);
    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Success);
}

#[tokio::test]
async fn upload_worker_flags_vanished_source_as_not_existed() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::UploadOnly, &local_root, "/R").await;

    let missing = dir.path().join("vanished.txt");
    mgr.emit(
        ActionKind::Upload,
        Some(local_file(
            missing.to_str().unwrap(),
            "h1",
            100,
            ScanStatus::Normal,
        )),
        None,
    )
    .await
    .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::NotExisted);
}

#[tokio::test]
async fn download_worker_fetches_verifies_and_records_the_file() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::DownloadOnly, &local_root, "/R").await;

    Mock::given(method("GET"))
        .and(url_path("/v1/files/download"))
        .and(query_param("path", "/R/b.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/file-b", server.uri()),
            "method": "GET"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/file-b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .mount(&server)
        .await;

    mgr.emit(
        ActionKind::Download,
        None,
        Some(pan_file(
            "/R/b.txt",
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d",
            100,
            ScanStatus::Normal,
        )),
    )
    .await
    .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    let target = dir.path().join("b.txt");
    assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Success);
    let recorded = mgr
        .local_db
        .get(target.to_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recorded.sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
}

#[tokio::test]
async fn download_worker_flags_missing_remote_as_not_existed() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::DownloadOnly, &local_root, "/R").await;

    Mock::given(method("GET"))
        .and(url_path("/v1/files/download"))
        .and(query_param("path", "/R/gone.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;

    mgr.emit(
        ActionKind::Download,
        None,
        Some(pan_file("/R/gone.txt", "aa", 100, ScanStatus::Normal)),
    )
    .await
    .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::NotExisted);
}

#[tokio::test]
async fn delete_remote_worker_noops_when_remote_is_already_absent() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;
    let tombstone = local_file("/L/c.txt", "h", 100, ScanStatus::Discard);
    mgr.local_db.upsert(&tombstone).await.unwrap();

    Mock::given(method("DELETE"))
        .and(url_path("/v1/files"))
        .and(query_param("path", "/R/c.txt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;

    mgr.emit(ActionKind::DeleteRemote, Some(tombstone), None)
        .await
        .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Success);
    // the tombstone that justified the action is retired
    assert!(mgr.local_db.get("/L/c.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_local_worker_removes_file_and_retires_tombstone() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::DownloadOnly, &local_root, "/R").await;

    let doomed = dir.path().join("d.txt");
    std::fs::write(&doomed, b"bye").unwrap();
    let tombstone = pan_file("/R/d.txt", "h", 100, ScanStatus::Discard);
    mgr.pan_db.upsert(&tombstone).await.unwrap();

    mgr.emit(ActionKind::DeleteLocal, None, Some(tombstone))
        .await
        .unwrap();
    let action = pending_actions(&mgr).await.remove(0);
    mgr.run_file_action(&action, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!doomed.exists());
    assert!(mgr.pan_db.get("/R/d.txt").await.unwrap().is_none());
    let stored = mgr.actions.get(&action.id()).await.unwrap().unwrap();
    assert_eq!(stored.status, ActionStatus::Success);
}

#[tokio::test]
async fn start_twice_errors_and_stop_is_idempotent() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;

    Arc::clone(&mgr).start().unwrap();
    assert!(matches!(
        Arc::clone(&mgr).start(),
        Err(SyncError::AlreadyRunning)
    ));

    mgr.stop().await.unwrap();
    mgr.stop().await.unwrap();

    // a stopped manager can be started again
    Arc::clone(&mgr).start().unwrap();
    mgr.stop().await.unwrap();
}

#[tokio::test]
async fn end_to_end_upload_only_converges_to_success() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let local_root = dir.path().to_str().unwrap().to_string();
    let mgr = make_manager(&server, SyncMode::UploadOnly, &local_root, "/R").await;

    let source = dir.path().join("a.txt");
    std::fs::write(&source, b"abc").unwrap();
    mgr.local_db
        .upsert(&local_folder(&local_root))
        .await
        .unwrap();
    mgr.local_db
        .upsert(&local_file(
            source.to_str().unwrap(),
            "h1",
            100,
            ScanStatus::Normal,
        ))
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(url_path("/v1/files/upload"))
        .and(query_param("path", "/R/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/put-a", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/put-a"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1/files"))
        .and(query_param("path", "/R/a.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(file_resource_json("/R/a.txt", "a.txt", "h1")),
        )
        .mount(&server)
        .await;

    Arc::clone(&mgr).start().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    loop {
        let done = mgr
            .actions
            .list_by_status(ActionStatus::Success)
            .await
            .unwrap();
        if done.len() == 1 {
            assert_eq!(done[0].kind, ActionKind::Upload);
            assert_eq!(done[0].rel_path, "/a.txt");
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "upload did not converge in time"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    mgr.stop().await.unwrap();
    assert!(mgr
        .in_process
        .lock()
        .expect("in-process set mutex poisoned")
        .is_empty());

    // a fresh sweep over identical trees admits nothing new
    let root = mgr.local_db.get(&local_root).await.unwrap().unwrap();
    let mut queue = FolderQueue::new();
    mgr.diff_local_folder(&root, &mut queue).await.unwrap();
    assert!(pending_actions(&mgr).await.is_empty());
}
