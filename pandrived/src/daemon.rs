use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tracing::info;

use pandrive_core::PanClient;

use crate::sync::inventory::{LocalFileDb, PanFileDb};
use crate::sync::manager::{FileActionTaskManager, SyncConfig, SyncMode};
use crate::sync::paths::{clean_path, normalize_separators};
use crate::sync::store::ActionStore;

const DEFAULT_DOWNLOAD_PARALLEL: u64 = 2;
const DEFAULT_UPLOAD_PARALLEL: u64 = 2;
const DEFAULT_BLOCK_SIZE: u64 = 256 * 1024;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub api_base_url: Option<String>,
    pub token: String,
    pub sync: SyncConfig,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let local_folder_path =
            std::env::var("PANDRIVE_LOCAL_DIR").context("PANDRIVE_LOCAL_DIR is not set")?;
        let pan_folder_path =
            std::env::var("PANDRIVE_REMOTE_DIR").context("PANDRIVE_REMOTE_DIR is not set")?;
        if !remote_root_is_valid(&pan_folder_path) {
            anyhow::bail!("PANDRIVE_REMOTE_DIR must not be the drive root");
        }
        let drive_id = std::env::var("PANDRIVE_DRIVE_ID").context("PANDRIVE_DRIVE_ID is not set")?;
        let token = std::env::var("PANDRIVE_TOKEN").context("PANDRIVE_TOKEN is not set")?;
        let mode = match std::env::var("PANDRIVE_MODE") {
            Ok(value) => {
                SyncMode::parse(&value).with_context(|| format!("unknown sync mode: {value}"))?
            }
            Err(_) => SyncMode::TwoWay,
        };

        let sync = SyncConfig {
            local_folder_path,
            pan_folder_path,
            drive_id,
            mode,
            file_download_parallel: read_u64_env(
                "PANDRIVE_DOWNLOAD_PARALLEL",
                DEFAULT_DOWNLOAD_PARALLEL,
            ) as usize,
            file_upload_parallel: read_u64_env("PANDRIVE_UPLOAD_PARALLEL", DEFAULT_UPLOAD_PARALLEL)
                as usize,
            file_download_block_size: read_u64_env(
                "PANDRIVE_DOWNLOAD_BLOCK_SIZE",
                DEFAULT_BLOCK_SIZE,
            ) as i64,
            file_upload_block_size: read_u64_env("PANDRIVE_UPLOAD_BLOCK_SIZE", DEFAULT_BLOCK_SIZE)
                as i64,
            max_download_rate: read_u64_env("PANDRIVE_MAX_DOWNLOAD_RATE", 0),
            max_upload_rate: read_u64_env("PANDRIVE_MAX_UPLOAD_RATE", 0),
            use_internal_url: read_bool_env("PANDRIVE_USE_INTERNAL_URL", false),
        };

        let db_path = match std::env::var("PANDRIVE_DB") {
            Ok(value) => PathBuf::from(value),
            Err(_) => default_db_path()?,
        };
        let api_base_url = std::env::var("PANDRIVE_API_BASE").ok();

        Ok(Self {
            db_path,
            api_base_url,
            token,
            sync,
        })
    }
}

pub struct DaemonRuntime {
    manager: Arc<FileActionTaskManager>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create data directory at {parent:?}"))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("failed to open sync database")?;

        let local_db = LocalFileDb::from_pool(pool.clone());
        local_db
            .init()
            .await
            .context("failed to run database migrations")?;
        let pan_db = PanFileDb::from_pool(pool.clone());
        let actions = ActionStore::from_pool(pool);

        let client = match &config.api_base_url {
            Some(base) => PanClient::with_base_url(base, &config.sync.drive_id, &config.token),
            None => PanClient::new(&config.sync.drive_id, &config.token),
        }
        .context("failed to build drive client")?;

        let manager = Arc::new(FileActionTaskManager::new(
            config.sync,
            local_db,
            pan_db,
            actions,
            client,
        ));
        Ok(Self { manager })
    }

    pub fn manager(&self) -> &Arc<FileActionTaskManager> {
        &self.manager
    }

    pub async fn run(self) -> anyhow::Result<()> {
        Arc::clone(&self.manager).start()?;
        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        info!("shutdown requested");
        self.manager.stop().await?;
        Ok(())
    }
}

fn remote_root_is_valid(path: &str) -> bool {
    clean_path(&normalize_separators(path)) != "/"
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let mut path = dirs::data_dir().context("XDG data directory is unavailable")?;
    path.push("pandrive");
    path.push("sync.db");
    Ok(path)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_limits_from_env_or_default() {
        assert_eq!(read_u64_env("NO_SUCH_ENV_FOR_TEST", 42), 42);
    }

    #[test]
    fn internal_url_family_is_off_by_default() {
        assert!(!read_bool_env("NO_SUCH_BOOL_ENV_FOR_TEST", false));
    }

    #[test]
    fn rejects_the_drive_root_as_remote_sync_root() {
        assert!(!remote_root_is_valid("/"));
        assert!(!remote_root_is_valid("//"));
        assert!(!remote_root_is_valid("/Backup/.."));
        assert!(remote_root_is_valid("/Backup"));
    }

    #[test]
    fn parses_sync_modes() {
        assert_eq!(SyncMode::parse("upload_only"), Some(SyncMode::UploadOnly));
        assert_eq!(SyncMode::parse("download_only"), Some(SyncMode::DownloadOnly));
        assert_eq!(SyncMode::parse("two_way"), Some(SyncMode::TwoWay));
        assert_eq!(SyncMode::parse("sideways"), None);
    }
}
