use std::collections::HashSet;

use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::Mutex;

use super::action::{now_unix, ActionKind, ActionStatus, SyncAction};
use super::inventory::MIGRATOR;
use super::item::{LocalFileItem, PanFileItem};

/// A completed action is not re-admitted for five minutes, a rejected one
/// for an hour. The hysteresis keeps rediscovery by the next sweep from
/// oscillating.
const READMIT_SUCCESS_SECS: i64 = 5 * 60;
const READMIT_ILLEGAL_SECS: i64 = 60 * 60;

#[derive(Debug, Error)]
pub enum ActionStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid action kind: {0}")]
    InvalidKind(String),
    #[error("invalid action status: {0}")]
    InvalidStatus(String),
}

/// Persistent, deduplicating queue of pending sync actions. Admissions and
/// claims serialize on one async mutex so the differ and executor never
/// interleave their read-check-write sequences.
pub struct ActionStore {
    pool: SqlitePool,
    gate: Mutex<()>,
}

impl ActionStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            gate: Mutex::new(()),
        }
    }

    pub async fn init(&self) -> Result<(), ActionStoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Admission contract. Returns true when the action was inserted (or an
    /// expired terminal record replaced) and false when the emission was
    /// dropped as a duplicate.
    pub async fn admit(&self, action: &SyncAction) -> Result<bool, ActionStoreError> {
        let _gate = self.gate.lock().await;
        let id = action.id();
        if let Some(existing) = self.fetch(&id).await? {
            let age = now_unix() - existing.status_updated;
            match existing.status {
                ActionStatus::Create | ActionStatus::Uploading | ActionStatus::Downloading => {
                    return Ok(false);
                }
                ActionStatus::Success => {
                    if age < READMIT_SUCCESS_SECS {
                        return Ok(false);
                    }
                }
                ActionStatus::Illegal => {
                    if age < READMIT_ILLEGAL_SECS {
                        return Ok(false);
                    }
                }
                ActionStatus::NotExisted => {
                    if !updated_at_token_moved(&existing, action) {
                        return Ok(false);
                    }
                }
            }
        }

        let now = now_unix();
        let mut admitted = action.clone();
        admitted.status = ActionStatus::Create;
        admitted.status_updated = now;
        admitted.created = now;
        self.put(&admitted).await?;
        Ok(true)
    }

    /// Claim contract: first an in-flight action of this kind nobody holds
    /// (crash recovery), then the oldest `Create` of the kind. Claiming does
    /// not mutate status; the executor flips it after the claim succeeds.
    pub async fn claim(
        &self,
        kind: ActionKind,
        in_process: &HashSet<String>,
    ) -> Result<Option<SyncAction>, ActionStoreError> {
        let _gate = self.gate.lock().await;

        for action in self.list_by_status(kind.in_flight_status()).await? {
            if action.kind == kind && !in_process.contains(&action.id()) {
                return Ok(Some(action));
            }
        }
        for action in self.list_by_status(ActionStatus::Create).await? {
            if action.kind == kind && !in_process.contains(&action.id()) {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    pub async fn get(&self, id: &str) -> Result<Option<SyncAction>, ActionStoreError> {
        self.fetch(id).await
    }

    pub async fn list_by_status(
        &self,
        status: ActionStatus,
    ) -> Result<Vec<SyncAction>, ActionStoreError> {
        let rows = sqlx::query(
            "SELECT id, kind, rel_path, status, status_updated, local_file, pan_file,
                    drive_id, download_block_size, upload_block_size, use_internal_url, created
             FROM sync_actions WHERE status = ?1 ORDER BY created ASC, rel_path ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(action_from_row(&row)?);
        }
        Ok(out)
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: ActionStatus,
    ) -> Result<(), ActionStoreError> {
        sqlx::query("UPDATE sync_actions SET status = ?1, status_updated = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(now_unix())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Best-effort compaction: drops completed records older than the
    /// threshold. Terminal failure records are kept so their hysteresis
    /// windows stay observable.
    pub async fn clean_records(&self, older_than_secs: i64) -> Result<u64, ActionStoreError> {
        let cutoff = now_unix() - older_than_secs;
        let result =
            sqlx::query("DELETE FROM sync_actions WHERE status = 'success' AND status_updated < ?1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, id: &str) -> Result<Option<SyncAction>, ActionStoreError> {
        let row = sqlx::query(
            "SELECT id, kind, rel_path, status, status_updated, local_file, pan_file,
                    drive_id, download_block_size, upload_block_size, use_internal_url, created
             FROM sync_actions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(action_from_row(&row)?))
    }

    async fn put(&self, action: &SyncAction) -> Result<(), ActionStoreError> {
        let local_file = action
            .local_file
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let pan_file = action
            .pan_file
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT OR REPLACE INTO sync_actions
                (id, kind, rel_path, status, status_updated, local_file, pan_file,
                 drive_id, download_block_size, upload_block_size, use_internal_url, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(action.id())
        .bind(action.kind.as_str())
        .bind(&action.rel_path)
        .bind(action.status.as_str())
        .bind(action.status_updated)
        .bind(local_file)
        .bind(pan_file)
        .bind(&action.drive_id)
        .bind(action.download_block_size)
        .bind(action.upload_block_size)
        .bind(if action.use_internal_url { 1 } else { 0 })
        .bind(action.created)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// `NotExisted` re-admission requires the relevant side's updated-at token
/// to have moved on since the failure was recorded.
fn updated_at_token_moved(existing: &SyncAction, candidate: &SyncAction) -> bool {
    match existing.kind {
        ActionKind::Download => {
            let old = existing.pan_file.as_ref().map(|f| f.updated_at.as_str());
            let new = candidate.pan_file.as_ref().map(|f| f.updated_at.as_str());
            old != new
        }
        ActionKind::Upload => {
            let old = existing.local_file.as_ref().map(|f| f.updated_at.as_str());
            let new = candidate.local_file.as_ref().map(|f| f.updated_at.as_str());
            old != new
        }
        _ => true,
    }
}

fn action_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SyncAction, ActionStoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let local_file: Option<String> = row.try_get("local_file")?;
    let pan_file: Option<String> = row.try_get("pan_file")?;
    let use_internal_url: i64 = row.try_get("use_internal_url")?;

    let local_file: Option<LocalFileItem> = local_file
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let pan_file: Option<PanFileItem> = pan_file.as_deref().map(serde_json::from_str).transpose()?;

    Ok(SyncAction {
        kind: ActionKind::parse(&kind).ok_or(ActionStoreError::InvalidKind(kind))?,
        rel_path: row.try_get("rel_path")?,
        status: ActionStatus::parse(&status).ok_or(ActionStoreError::InvalidStatus(status))?,
        status_updated: row.try_get("status_updated")?,
        local_file,
        pan_file,
        drive_id: row.try_get("drive_id")?,
        download_block_size: row.try_get("download_block_size")?,
        upload_block_size: row.try_get("upload_block_size")?,
        use_internal_url: use_internal_url != 0,
        created: row.try_get("created")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::item::ScanStatus;

    async fn make_store() -> (ActionStore, SqlitePool) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = ActionStore::from_pool(pool.clone());
        store.init().await.unwrap();
        (store, pool)
    }

    fn local_snapshot(path: &str, token: &str) -> LocalFileItem {
        LocalFileItem {
            path: path.to_string(),
            is_folder: false,
            size: 3,
            modified: 100,
            sha1: "aa".to_string(),
            scan_status: ScanStatus::Normal,
            updated_at: token.to_string(),
        }
    }

    fn upload_action(rel: &str, token: &str) -> SyncAction {
        SyncAction {
            kind: ActionKind::Upload,
            rel_path: rel.to_string(),
            status: ActionStatus::Create,
            status_updated: 0,
            local_file: Some(local_snapshot(&format!("/L{rel}"), token)),
            pan_file: None,
            drive_id: "drive-1".to_string(),
            download_block_size: 1024,
            upload_block_size: 1024,
            use_internal_url: false,
            created: 0,
        }
    }

    async fn backdate_status(pool: &SqlitePool, id: &str, secs_ago: i64) {
        sqlx::query("UPDATE sync_actions SET status_updated = ?1 WHERE id = ?2")
            .bind(now_unix() - secs_ago)
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn admit_is_idempotent_while_queued() {
        let (store, _pool) = make_store().await;
        let action = upload_action("/a.txt", "t1");

        assert!(store.admit(&action).await.unwrap());
        assert!(!store.admit(&action).await.unwrap());

        let pending = store.list_by_status(ActionStatus::Create).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].rel_path, "/a.txt");
    }

    #[tokio::test]
    async fn admit_drops_in_flight_duplicates() {
        let (store, _pool) = make_store().await;
        let action = upload_action("/a.txt", "t1");
        store.admit(&action).await.unwrap();
        store
            .update_status(&action.id(), ActionStatus::Uploading)
            .await
            .unwrap();

        assert!(!store.admit(&action).await.unwrap());
    }

    #[tokio::test]
    async fn success_hysteresis_expires_after_five_minutes() {
        let (store, pool) = make_store().await;
        let action = upload_action("/e.txt", "t1");
        store.admit(&action).await.unwrap();
        store
            .update_status(&action.id(), ActionStatus::Success)
            .await
            .unwrap();

        // one minute later the emission is still suppressed
        backdate_status(&pool, &action.id(), 60).await;
        assert!(!store.admit(&action).await.unwrap());

        // six minutes later a fresh admission is permitted
        backdate_status(&pool, &action.id(), 6 * 60).await;
        assert!(store.admit(&action).await.unwrap());
        let stored = store.get(&action.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Create);
    }

    #[tokio::test]
    async fn illegal_hysteresis_lasts_an_hour() {
        let (store, pool) = make_store().await;
        let action = upload_action("/bad.bin", "t1");
        store.admit(&action).await.unwrap();
        store
            .update_status(&action.id(), ActionStatus::Illegal)
            .await
            .unwrap();

        backdate_status(&pool, &action.id(), 30 * 60).await;
        assert!(!store.admit(&action).await.unwrap());

        backdate_status(&pool, &action.id(), 61 * 60).await;
        assert!(store.admit(&action).await.unwrap());
    }

    #[tokio::test]
    async fn not_existed_readmits_only_when_token_moves() {
        let (store, _pool) = make_store().await;
        let action = upload_action("/gone.txt", "t1");
        store.admit(&action).await.unwrap();
        store
            .update_status(&action.id(), ActionStatus::NotExisted)
            .await
            .unwrap();

        // same updated-at token: the file has not changed, keep suppressing
        assert!(!store.admit(&upload_action("/gone.txt", "t1")).await.unwrap());
        // a new token means the source moved on
        assert!(store.admit(&upload_action("/gone.txt", "t2")).await.unwrap());
    }

    #[tokio::test]
    async fn claim_prefers_abandoned_in_flight_actions() {
        let (store, _pool) = make_store().await;
        let stuck = upload_action("/stuck.txt", "t1");
        let fresh = upload_action("/fresh.txt", "t1");
        store.admit(&stuck).await.unwrap();
        store.admit(&fresh).await.unwrap();
        store
            .update_status(&stuck.id(), ActionStatus::Uploading)
            .await
            .unwrap();

        // nobody holds the uploading action: crash recovery hands it back
        let claimed = store
            .claim(ActionKind::Upload, &HashSet::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.rel_path, "/stuck.txt");

        // once a worker holds it, the oldest Create is next
        let mut held = HashSet::new();
        held.insert(stuck.id());
        let claimed = store
            .claim(ActionKind::Upload, &held)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.rel_path, "/fresh.txt");

        held.insert(fresh.id());
        assert!(store.claim(ActionKind::Upload, &held).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_filters_by_kind() {
        let (store, _pool) = make_store().await;
        store.admit(&upload_action("/a.txt", "t1")).await.unwrap();

        assert!(store
            .claim(ActionKind::Download, &HashSet::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn clean_records_drops_only_old_successes() {
        let (store, pool) = make_store().await;
        let done = upload_action("/done.txt", "t1");
        let pending = upload_action("/pending.txt", "t1");
        store.admit(&done).await.unwrap();
        store.admit(&pending).await.unwrap();
        store
            .update_status(&done.id(), ActionStatus::Success)
            .await
            .unwrap();
        backdate_status(&pool, &done.id(), 48 * 3600).await;

        let removed = store.clean_records(24 * 3600).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&done.id()).await.unwrap().is_none());
        assert!(store.get(&pending.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn snapshots_survive_the_round_trip() {
        let (store, _pool) = make_store().await;
        let action = upload_action("/a.txt", "token-9");
        store.admit(&action).await.unwrap();

        let stored = store.get(&action.id()).await.unwrap().unwrap();
        assert_eq!(
            stored.local_file.as_ref().unwrap().updated_at,
            "token-9"
        );
        assert_eq!(stored.drive_id, "drive-1");
        assert_eq!(stored.upload_block_size, 1024);
    }
}
