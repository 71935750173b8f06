use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use pandrive_core::{PanClient, PanError, PanResource, PanResourceType};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::action::{now_unix, ActionKind, ActionStatus, SyncAction};
use super::counters::ModificationCounters;
use super::hasher::{sha1_of_file, EMPTY_CONTENT_SHA1};
use super::inventory::{InventoryError, LocalFileDb, PanFileDb};
use super::item::{LocalFileItem, PanFileItem, ScanStatus};
use super::paths::{parent_chain, relative_of, PathMapper};
use super::queue::FolderQueue;
use super::set_algebra::diff_children;
use super::store::{ActionStore, ActionStoreError};
use super::transfer::{TransferClient, TransferConfig, TransferError};

const ROOT_RETRY_DELAY: Duration = Duration::from_secs(1);
const IDLE_DELAY: Duration = Duration::from_secs(1);
const SWEEP_RESTART_DELAY: Duration = Duration::from_secs(3);
const EMPTY_FOLDER_DELAY: Duration = Duration::from_millis(100);
const PAN_FOLDER_PACE: Duration = Duration::from_millis(500);
const EXECUTOR_DELAY: Duration = Duration::from_secs(1);
const COMPACT_EVERY_ITERATIONS: u64 = 3600;
const COMPACT_OLDER_THAN_SECS: i64 = 24 * 3600;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync task is already running")]
    AlreadyRunning,
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("action store error: {0}")]
    Store(#[from] ActionStoreError),
    #[error("cloud api error: {0}")]
    Api(#[from] PanError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    UploadOnly,
    DownloadOnly,
    TwoWay,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::UploadOnly => "upload_only",
            SyncMode::DownloadOnly => "download_only",
            SyncMode::TwoWay => "two_way",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upload_only" => Some(SyncMode::UploadOnly),
            "download_only" => Some(SyncMode::DownloadOnly),
            "two_way" => Some(SyncMode::TwoWay),
            _ => None,
        }
    }

    pub fn uploads(&self) -> bool {
        matches!(self, SyncMode::UploadOnly | SyncMode::TwoWay)
    }

    pub fn downloads(&self) -> bool {
        matches!(self, SyncMode::DownloadOnly | SyncMode::TwoWay)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub local_folder_path: String,
    pub pan_folder_path: String,
    pub drive_id: String,
    pub mode: SyncMode,
    pub file_download_parallel: usize,
    pub file_upload_parallel: usize,
    pub file_download_block_size: i64,
    pub file_upload_block_size: i64,
    /// Bytes per second; 0 means unlimited.
    pub max_download_rate: u64,
    pub max_upload_rate: u64,
    pub use_internal_url: bool,
}

struct RunningTask {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Reconciles the local and remote inventories into executed sync actions.
/// Owns the action store gate, the BFS state of both differ loops, the
/// in-process set, the folder-create mutex and the modification counters;
/// several managers for distinct sync pairs share nothing.
pub struct FileActionTaskManager {
    config: SyncConfig,
    mapper: PathMapper,
    local_db: LocalFileDb,
    pan_db: PanFileDb,
    actions: ActionStore,
    client: PanClient,
    transfer: TransferClient,
    counters: ModificationCounters,
    in_process: StdMutex<HashSet<String>>,
    folder_create: Mutex<()>,
    running: StdMutex<Option<RunningTask>>,
}

impl FileActionTaskManager {
    pub fn new(
        config: SyncConfig,
        local_db: LocalFileDb,
        pan_db: PanFileDb,
        actions: ActionStore,
        client: PanClient,
    ) -> Self {
        let mapper = PathMapper::new(&config.local_folder_path, &config.pan_folder_path);
        let transfer = TransferClient::new(TransferConfig {
            download_block_size: config.file_download_block_size.max(1) as usize,
            upload_block_size: config.file_upload_block_size.max(1) as usize,
            max_download_rate: config.max_download_rate,
            max_upload_rate: config.max_upload_rate,
        });
        Self {
            config,
            mapper,
            local_db,
            pan_db,
            actions,
            client,
            transfer,
            counters: ModificationCounters::new(),
            in_process: StdMutex::new(HashSet::new()),
            folder_create: Mutex::new(()),
            running: StdMutex::new(None),
        }
    }

    /// Spawns the two differ loops and the executor. Errors if the manager
    /// is already running.
    pub fn start(self: Arc<Self>) -> Result<(), SyncError> {
        let mut running = self.running.lock().expect("run state mutex poisoned");
        if running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        let handles = vec![
            tokio::spawn(Arc::clone(&self).local_diff_loop(cancel.clone())),
            tokio::spawn(Arc::clone(&self).pan_diff_loop(cancel.clone())),
            tokio::spawn(Arc::clone(&self).executor_loop(cancel.clone())),
        ];
        info!(
            local_root = %self.mapper.local_root(),
            pan_root = %self.mapper.pan_root(),
            mode = self.config.mode.as_str(),
            "sync task started"
        );
        *running = Some(RunningTask { cancel, handles });
        Ok(())
    }

    /// Idempotent. Cancels all loops and blocks until every started task,
    /// including in-flight workers, has finished.
    pub async fn stop(&self) -> Result<(), SyncError> {
        let task = {
            let mut running = self.running.lock().expect("run state mutex poisoned");
            running.take()
        };
        let Some(task) = task else {
            return Ok(());
        };
        task.cancel.cancel();
        for handle in task.handles {
            let _ = handle.await;
        }
        info!("sync task stopped");
        Ok(())
    }

    /// Called by the local walker after a scan that observed change.
    pub fn add_local_folder_modify_count(&self) {
        self.counters.add_local_changed();
    }

    /// Called by the cloud scanner after a scan that observed change.
    pub fn add_pan_folder_modify_count(&self) {
        self.counters.add_pan_changed();
    }
}

include!("manager_impl_differ.rs");
include!("manager_impl_executor.rs");

async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn parse_modified(value: Option<&str>) -> i64 {
    value
        .and_then(|v| OffsetDateTime::parse(v, &Rfc3339).ok())
        .map(|t| t.unix_timestamp())
        .unwrap_or(0)
}

fn pan_item_from_resource(resource: &PanResource) -> PanFileItem {
    PanFileItem {
        path: resource.path.clone(),
        file_id: resource.file_id.clone().unwrap_or_default(),
        is_folder: resource.resource_type == PanResourceType::Folder,
        size: resource.size.unwrap_or(0) as i64,
        modified: parse_modified(resource.updated_at.as_deref()),
        sha1: resource
            .content_hash
            .clone()
            .unwrap_or_default()
            .to_ascii_lowercase(),
        scan_status: ScanStatus::Normal,
        updated_at: resource.updated_at.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
#[path = "manager_tests/mod.rs"]
mod tests;
