use sqlx::sqlite::SqlitePoolOptions;
use tempfile::tempdir;
use wiremock::matchers::{body_bytes, method, path as url_path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

async fn make_manager(
    server: &MockServer,
    mode: SyncMode,
    local_root: &str,
    pan_root: &str,
) -> Arc<FileActionTaskManager> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let local_db = LocalFileDb::from_pool(pool.clone());
    local_db.init().await.unwrap();
    let pan_db = PanFileDb::from_pool(pool.clone());
    let actions = ActionStore::from_pool(pool);
    let client = PanClient::with_base_url(&server.uri(), "drive-1", "test-token").unwrap();
    let config = SyncConfig {
        local_folder_path: local_root.to_string(),
        pan_folder_path: pan_root.to_string(),
        drive_id: "drive-1".to_string(),
        mode,
        file_download_parallel: 2,
        file_upload_parallel: 2,
        file_download_block_size: 64 * 1024,
        file_upload_block_size: 64 * 1024,
        max_download_rate: 0,
        max_upload_rate: 0,
        use_internal_url: false,
    };
    Arc::new(FileActionTaskManager::new(
        config, local_db, pan_db, actions, client,
    ))
}

fn local_file(path: &str, sha1: &str, modified: i64, scan_status: ScanStatus) -> LocalFileItem {
    LocalFileItem {
        path: path.to_string(),
        is_folder: false,
        size: 3,
        modified,
        sha1: sha1.to_string(),
        scan_status,
        updated_at: "lt1".to_string(),
    }
}

fn local_folder(path: &str) -> LocalFileItem {
    LocalFileItem {
        path: path.to_string(),
        is_folder: true,
        size: 0,
        modified: 0,
        sha1: String::new(),
        scan_status: ScanStatus::Normal,
        updated_at: "lt1".to_string(),
    }
}

fn pan_file(path: &str, sha1: &str, modified: i64, scan_status: ScanStatus) -> PanFileItem {
    PanFileItem {
        path: path.to_string(),
        file_id: "f-1".to_string(),
        is_folder: false,
        size: 3,
        modified,
        sha1: sha1.to_string(),
        scan_status,
        updated_at: "pt1".to_string(),
    }
}

async fn pending_actions(mgr: &FileActionTaskManager) -> Vec<SyncAction> {
    mgr.actions
        .list_by_status(ActionStatus::Create)
        .await
        .unwrap()
}

include!("differ.rs");
include!("executor.rs");
