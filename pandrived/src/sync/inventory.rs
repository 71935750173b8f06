use sqlx::migrate::Migrator;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use super::item::{LocalFileItem, PanFileItem, ScanStatus};
use super::paths::parent_dir;

pub(crate) static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid scan status: {0}")]
    InvalidScanStatus(String),
}

fn parse_scan_status(value: &str) -> Result<ScanStatus, InventoryError> {
    ScanStatus::parse(value).ok_or_else(|| InventoryError::InvalidScanStatus(value.to_string()))
}

/// Inventory of the local tree, filled by the filesystem walker and read by
/// the differ. The engine only ever deletes rows whose scan status is
/// `Discard`.
pub struct LocalFileDb {
    pool: SqlitePool,
}

impl LocalFileDb {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<(), InventoryError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Option<LocalFileItem>, InventoryError> {
        let row = sqlx::query(
            "SELECT path, is_folder, size, modified, sha1, scan_status, updated_at
             FROM local_files WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(local_item_from_row(&row)?))
    }

    pub async fn children(&self, folder: &str) -> Result<Vec<LocalFileItem>, InventoryError> {
        let rows = sqlx::query(
            "SELECT path, is_folder, size, modified, sha1, scan_status, updated_at
             FROM local_files WHERE parent_path = ?1 ORDER BY path ASC",
        )
        .bind(folder)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(local_item_from_row(&row)?);
        }
        Ok(out)
    }

    pub async fn upsert(&self, item: &LocalFileItem) -> Result<(), InventoryError> {
        sqlx::query(
            "INSERT INTO local_files (path, parent_path, is_folder, size, modified, sha1, scan_status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(path) DO UPDATE SET
                parent_path = excluded.parent_path,
                is_folder = excluded.is_folder,
                size = excluded.size,
                modified = excluded.modified,
                sha1 = excluded.sha1,
                scan_status = excluded.scan_status,
                updated_at = excluded.updated_at",
        )
        .bind(&item.path)
        .bind(parent_dir(&item.path).unwrap_or_default())
        .bind(if item.is_folder { 1 } else { 0 })
        .bind(item.size)
        .bind(item.modified)
        .bind(item.sha1.to_ascii_lowercase())
        .bind(item.scan_status.as_str())
        .bind(&item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), InventoryError> {
        sqlx::query("DELETE FROM local_files WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn local_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LocalFileItem, InventoryError> {
    let is_folder: i64 = row.try_get("is_folder")?;
    let scan_status: String = row.try_get("scan_status")?;
    Ok(LocalFileItem {
        path: row.try_get("path")?,
        is_folder: is_folder != 0,
        size: row.try_get("size")?,
        modified: row.try_get("modified")?,
        sha1: row.try_get("sha1")?,
        scan_status: parse_scan_status(&scan_status)?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Inventory of the remote tree, filled by the cloud scanner.
pub struct PanFileDb {
    pool: SqlitePool,
}

impl PanFileDb {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<(), InventoryError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Option<PanFileItem>, InventoryError> {
        let row = sqlx::query(
            "SELECT path, file_id, is_folder, size, modified, sha1, scan_status, updated_at
             FROM pan_files WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(pan_item_from_row(&row)?))
    }

    pub async fn children(&self, folder: &str) -> Result<Vec<PanFileItem>, InventoryError> {
        let rows = sqlx::query(
            "SELECT path, file_id, is_folder, size, modified, sha1, scan_status, updated_at
             FROM pan_files WHERE parent_path = ?1 ORDER BY path ASC",
        )
        .bind(folder)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(pan_item_from_row(&row)?);
        }
        Ok(out)
    }

    pub async fn upsert(&self, item: &PanFileItem) -> Result<(), InventoryError> {
        sqlx::query(
            "INSERT INTO pan_files (path, parent_path, file_id, is_folder, size, modified, sha1, scan_status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(path) DO UPDATE SET
                parent_path = excluded.parent_path,
                file_id = excluded.file_id,
                is_folder = excluded.is_folder,
                size = excluded.size,
                modified = excluded.modified,
                sha1 = excluded.sha1,
                scan_status = excluded.scan_status,
                updated_at = excluded.updated_at",
        )
        .bind(&item.path)
        .bind(parent_dir(&item.path).unwrap_or_default())
        .bind(&item.file_id)
        .bind(if item.is_folder { 1 } else { 0 })
        .bind(item.size)
        .bind(item.modified)
        .bind(item.sha1.to_ascii_lowercase())
        .bind(item.scan_status.as_str())
        .bind(&item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), InventoryError> {
        sqlx::query("DELETE FROM pan_files WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn pan_item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PanFileItem, InventoryError> {
    let is_folder: i64 = row.try_get("is_folder")?;
    let scan_status: String = row.try_get("scan_status")?;
    Ok(PanFileItem {
        path: row.try_get("path")?,
        file_id: row.try_get("file_id")?,
        is_folder: is_folder != 0,
        size: row.try_get("size")?,
        modified: row.try_get("modified")?,
        sha1: row.try_get("sha1")?,
        scan_status: parse_scan_status(&scan_status)?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_local_db() -> LocalFileDb {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let db = LocalFileDb::from_pool(pool);
        db.init().await.unwrap();
        db
    }

    fn item(path: &str, folder: bool) -> LocalFileItem {
        LocalFileItem {
            path: path.to_string(),
            is_folder: folder,
            size: 3,
            modified: 100,
            sha1: "ABCDEF".to_string(),
            scan_status: ScanStatus::Normal,
            updated_at: "t1".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_get_roundtrip_normalizes_hash_to_lowercase() {
        let db = make_local_db().await;
        db.upsert(&item("/L/a.txt", false)).await.unwrap();

        let stored = db.get("/L/a.txt").await.unwrap().unwrap();
        assert_eq!(stored.sha1, "abcdef");
        assert_eq!(stored.scan_status, ScanStatus::Normal);
    }

    #[tokio::test]
    async fn children_lists_only_direct_entries() {
        let db = make_local_db().await;
        db.upsert(&item("/L/docs", true)).await.unwrap();
        db.upsert(&item("/L/docs/a.txt", false)).await.unwrap();
        db.upsert(&item("/L/docs/b.txt", false)).await.unwrap();
        db.upsert(&item("/L/docs/sub/c.txt", false)).await.unwrap();

        let children = db.children("/L/docs").await.unwrap();
        let paths: Vec<&str> = children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["/L/docs/a.txt", "/L/docs/b.txt"]);
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let db = make_local_db().await;
        db.upsert(&item("/L/a.txt", false)).await.unwrap();
        db.delete("/L/a.txt").await.unwrap();
        assert!(db.get("/L/a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pan_db_keeps_file_id_and_updated_at_token() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let db = PanFileDb::from_pool(pool);
        db.init().await.unwrap();

        db.upsert(&PanFileItem {
            path: "/R/a.txt".to_string(),
            file_id: "f-1".to_string(),
            is_folder: false,
            size: 3,
            modified: 100,
            sha1: "aa".to_string(),
            scan_status: ScanStatus::Discard,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        })
        .await
        .unwrap();

        let stored = db.get("/R/a.txt").await.unwrap().unwrap();
        assert_eq!(stored.file_id, "f-1");
        assert_eq!(stored.updated_at, "2024-01-01T00:00:00Z");
        assert_eq!(stored.scan_status, ScanStatus::Discard);
    }
}
