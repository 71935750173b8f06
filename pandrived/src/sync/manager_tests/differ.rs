#[tokio::test]
async fn upload_only_new_local_file_emits_exactly_one_upload() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;
    let children = [local_file("/L/a.txt", "h1", 100, ScanStatus::Normal)];

    let mut queue = FolderQueue::new();
    mgr.diff_folder_pair(&children, &[], Some(&mut queue), None)
        .await
        .unwrap();

    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::Upload);
    assert_eq!(pending[0].rel_path, "/a.txt");

    // the same sweep again collapses onto the queued action
    let mut queue = FolderQueue::new();
    mgr.diff_folder_pair(&children, &[], Some(&mut queue), None)
        .await
        .unwrap();
    assert_eq!(pending_actions(&mgr).await.len(), 1);
}

#[tokio::test]
async fn download_only_never_uploads_local_files() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::DownloadOnly, "/L", "/R").await;

    let mut queue = FolderQueue::new();
    mgr.diff_folder_pair(
        &[local_file("/L/a.txt", "h1", 100, ScanStatus::Normal)],
        &[],
        Some(&mut queue),
        None,
    )
    .await
    .unwrap();

    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn two_way_mtime_tiebreak_picks_the_newer_side() {
    let server = MockServer::start().await;

    // local newer: expect one upload, no download
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    mgr.diff_folder_pair(
        &[local_file("/L/b.txt", "aa", 200, ScanStatus::Normal)],
        &[pan_file("/R/b.txt", "bb", 150, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();
    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::Upload);

    // remote newer: expect one download only
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    mgr.diff_folder_pair(
        &[local_file("/L/b.txt", "aa", 150, ScanStatus::Normal)],
        &[pan_file("/R/b.txt", "bb", 200, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();
    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::Download);

    // equal mtimes: nothing to do
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    mgr.diff_folder_pair(
        &[local_file("/L/b.txt", "aa", 150, ScanStatus::Normal)],
        &[pan_file("/R/b.txt", "bb", 150, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();
    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn equal_hashes_compare_case_insensitively() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;

    mgr.diff_folder_pair(
        &[local_file("/L/b.txt", "ABCDEF", 200, ScanStatus::Normal)],
        &[pan_file("/R/b.txt", "abcdef", 100, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();

    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn download_only_purges_local_tombstone_without_network_action() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::DownloadOnly, "/L", "/R").await;
    let tombstone = local_file("/L/c.txt", "h", 100, ScanStatus::Discard);
    mgr.local_db.upsert(&tombstone).await.unwrap();

    mgr.diff_folder_pair(
        &[tombstone],
        &[pan_file("/R/c.txt", "h", 100, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();

    assert!(mgr.local_db.get("/L/c.txt").await.unwrap().is_none());
    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn upload_only_emits_delete_remote_for_matching_tombstone() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;

    mgr.diff_folder_pair(
        &[local_file("/L/c.txt", "h", 100, ScanStatus::Discard)],
        &[pan_file("/R/c.txt", "h", 100, ScanStatus::Normal)],
        None,
        None,
    )
    .await
    .unwrap();

    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::DeleteRemote);
}

#[tokio::test]
async fn tombstones_on_both_sides_retire_both_records() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    let local = local_file("/L/d.txt", "h", 100, ScanStatus::Discard);
    let pan = pan_file("/R/d.txt", "h", 100, ScanStatus::Discard);
    mgr.local_db.upsert(&local).await.unwrap();
    mgr.pan_db.upsert(&pan).await.unwrap();

    mgr.diff_folder_pair(&[local], &[pan], None, None)
        .await
        .unwrap();

    assert!(mgr.local_db.get("/L/d.txt").await.unwrap().is_none());
    assert!(mgr.pan_db.get("/R/d.txt").await.unwrap().is_none());
    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn local_only_tombstone_emits_defensive_delete_remote() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;

    mgr.diff_folder_pair(
        &[local_file("/L/gone.txt", "h", 100, ScanStatus::Discard)],
        &[],
        None,
        None,
    )
    .await
    .unwrap();

    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::DeleteRemote);
}

#[tokio::test]
async fn pan_only_tombstone_is_purged_in_upload_only_mode() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;
    let tombstone = pan_file("/R/old.txt", "h", 100, ScanStatus::Discard);
    mgr.pan_db.upsert(&tombstone).await.unwrap();

    mgr.diff_folder_pair(&[], &[tombstone], None, None)
        .await
        .unwrap();

    assert!(mgr.pan_db.get("/R/old.txt").await.unwrap().is_none());
    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn success_hysteresis_suppresses_rediscovery_for_five_minutes() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;
    let local = [local_file("/L/e.txt", "aa", 200, ScanStatus::Normal)];
    let pan = [pan_file("/R/e.txt", "bb", 100, ScanStatus::Normal)];

    mgr.diff_folder_pair(&local, &pan, None, None).await.unwrap();
    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    let id = pending[0].id();
    mgr.actions
        .update_status(&id, ActionStatus::Success)
        .await
        .unwrap();

    // identical inputs shortly after completion: nothing is re-admitted
    mgr.diff_folder_pair(&local, &pan, None, None).await.unwrap();
    assert!(pending_actions(&mgr).await.is_empty());

    // six minutes later the next sweep may admit again
    sqlx::query("UPDATE sync_actions SET status_updated = ?1 WHERE id = ?2")
        .bind(now_unix() - 6 * 60)
        .bind(&id)
        .execute(mgr.actions.pool())
        .await
        .unwrap();
    mgr.diff_folder_pair(&local, &pan, None, None).await.unwrap();
    assert_eq!(pending_actions(&mgr).await.len(), 1);
}

#[tokio::test]
async fn bfs_reaches_nested_files_and_folders_emit_nothing() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::UploadOnly, "/L", "/R").await;
    mgr.local_db.upsert(&local_folder("/L")).await.unwrap();
    mgr.local_db.upsert(&local_folder("/L/x")).await.unwrap();
    mgr.local_db.upsert(&local_folder("/L/x/y")).await.unwrap();
    mgr.local_db
        .upsert(&local_file("/L/x/y/f.txt", "h1", 100, ScanStatus::Normal))
        .await
        .unwrap();

    let root = mgr.local_db.get("/L").await.unwrap().unwrap();
    let mut queue = FolderQueue::new();
    queue.push(root);
    while let Some(folder) = queue.pop() {
        mgr.diff_local_folder(&folder, &mut queue).await.unwrap();
    }

    let pending = pending_actions(&mgr).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, ActionKind::Upload);
    assert_eq!(pending[0].rel_path, "/x/y/f.txt");
}

#[tokio::test]
async fn zero_size_files_hash_to_the_empty_content_constant() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    let mut local = local_file("/L/zero.bin", "", 100, ScanStatus::Normal);
    local.size = 0;
    mgr.local_db.upsert(&local).await.unwrap();
    let pan = pan_file("/R/zero.bin", EMPTY_CONTENT_SHA1, 100, ScanStatus::Normal);

    mgr.diff_folder_pair(&[local], &[pan], None, None)
        .await
        .unwrap();

    assert!(pending_actions(&mgr).await.is_empty());
    let stored = mgr.local_db.get("/L/zero.bin").await.unwrap().unwrap();
    assert_eq!(stored.sha1, EMPTY_CONTENT_SHA1);
}

#[tokio::test]
async fn unreadable_local_file_is_skipped_this_sweep() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    let local = local_file("/L/no-such-file.bin", "", 200, ScanStatus::Normal);
    let pan = pan_file("/R/no-such-file.bin", "bb", 100, ScanStatus::Normal);

    mgr.diff_folder_pair(&[local], &[pan], None, None)
        .await
        .unwrap();

    assert!(pending_actions(&mgr).await.is_empty());
}

#[tokio::test]
async fn matched_folders_are_queued_on_both_sides() {
    let server = MockServer::start().await;
    let mgr = make_manager(&server, SyncMode::TwoWay, "/L", "/R").await;
    let local = local_folder("/L/docs");
    let mut pan = pan_file("/R/docs", "", 0, ScanStatus::Normal);
    pan.is_folder = true;

    let mut local_queue = FolderQueue::new();
    let mut pan_queue = FolderQueue::new();
    mgr.diff_folder_pair(
        &[local],
        &[pan],
        Some(&mut local_queue),
        Some(&mut pan_queue),
    )
    .await
    .unwrap();

    assert_eq!(local_queue.len(), 1);
    assert_eq!(pan_queue.len(), 1);
    assert!(pending_actions(&mgr).await.is_empty());
}
