use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool, migrate::Migrator};
use thiserror::Error;
use time::OffsetDateTime;

use crate::accounts::AccountInfo;
use crate::projection::backend::SyncRecordStore;
use crate::projection::identifier::ItemIdentifier;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const RECORD_COLUMNS: &str = "id, account_id, node_id, parent_identifier, name, is_folder, size, modified, downloaded, local_path, last_synced_at";

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record not found after upsert")]
    MissingRecord,
}

/// Identity of a mirrored node: the same key serves the remote and synced projections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub account_id: String,
    pub node_id: String,
}

impl RecordKey {
    pub fn new(account_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            node_id: node_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncRecordInput {
    pub account_id: String,
    pub node_id: String,
    pub parent_identifier: String,
    pub name: String,
    pub is_folder: bool,
    pub size: Option<i64>,
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub id: i64,
    pub account_id: String,
    pub node_id: String,
    /// Projected parent item identifier.
    pub parent_identifier: String,
    pub name: String,
    pub is_folder: bool,
    pub size: Option<i64>,
    pub modified: Option<i64>,
    pub downloaded: bool,
    pub local_path: Option<String>,
    pub last_synced_at: Option<i64>,
}

impl SyncRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.account_id.clone(), self.node_id.clone())
    }
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, RecordStoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Private database living as long as the store; a single connection keeps
    /// every query on the same in-memory database.
    pub async fn in_memory() -> Result<Self, RecordStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &Path) -> Result<Self, RecordStoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), RecordStoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or refreshes a record. The download flag survives a refresh
    /// only while the remote modification time is unchanged.
    pub async fn upsert_record(
        &self,
        input: &SyncRecordInput,
    ) -> Result<SyncRecord, RecordStoreError> {
        sqlx::query(
            "INSERT INTO sync_records (
                account_id,
                node_id,
                parent_identifier,
                name,
                is_folder,
                size,
                modified,
                last_synced_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(account_id, node_id) DO UPDATE SET
                parent_identifier = excluded.parent_identifier,
                name = excluded.name,
                is_folder = excluded.is_folder,
                size = excluded.size,
                downloaded = CASE
                    WHEN sync_records.modified IS excluded.modified THEN sync_records.downloaded
                    ELSE 0
                END,
                modified = excluded.modified,
                last_synced_at = excluded.last_synced_at",
        )
        .bind(&input.account_id)
        .bind(&input.node_id)
        .bind(&input.parent_identifier)
        .bind(&input.name)
        .bind(if input.is_folder { 1 } else { 0 })
        .bind(input.size)
        .bind(input.modified)
        .bind(now_unix())
        .execute(&self.pool)
        .await?;

        self.get_record(&RecordKey::new(
            input.account_id.clone(),
            input.node_id.clone(),
        ))
        .await?
        .ok_or(RecordStoreError::MissingRecord)
    }

    pub async fn get_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>, RecordStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM sync_records WHERE account_id = ?1 AND node_id = ?2"
        ))
        .bind(&key.account_id)
        .bind(&key.node_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| record_from_row(&row)).transpose()?)
    }

    /// Children in the order the sync subsystem recorded them.
    pub async fn list_children(&self, parent: &str) -> Result<Vec<SyncRecord>, RecordStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM sync_records WHERE parent_identifier = ?1 ORDER BY id ASC"
        ))
        .bind(parent)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(RecordStoreError::from))
            .collect()
    }

    pub async fn set_downloaded(
        &self,
        key: &RecordKey,
        local_path: &Path,
    ) -> Result<bool, RecordStoreError> {
        let result = sqlx::query(
            "UPDATE sync_records SET downloaded = 1, local_path = ?1
             WHERE account_id = ?2 AND node_id = ?3",
        )
        .bind(local_path.to_string_lossy().into_owned())
        .bind(&key.account_id)
        .bind(&key.node_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_downloaded(&self, key: &RecordKey) -> Result<(), RecordStoreError> {
        sqlx::query(
            "UPDATE sync_records SET downloaded = 0, local_path = NULL
             WHERE account_id = ?1 AND node_id = ?2",
        )
        .bind(&key.account_id)
        .bind(&key.node_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_record(&self, key: &RecordKey) -> Result<(), RecordStoreError> {
        sqlx::query("DELETE FROM sync_records WHERE account_id = ?1 AND node_id = ?2")
            .bind(&key.account_id)
            .bind(&key.node_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_account_info(&self, info: &AccountInfo) -> Result<(), RecordStoreError> {
        sqlx::query(
            "INSERT INTO account_infos (account_id, display_name) VALUES (?1, ?2)
             ON CONFLICT(account_id) DO UPDATE SET display_name = excluded.display_name",
        )
        .bind(&info.id)
        .bind(&info.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_account_info(&self, id: &str) -> Result<Option<AccountInfo>, RecordStoreError> {
        let row = sqlx::query(
            "SELECT account_id, display_name FROM account_infos WHERE account_id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AccountInfo {
            id: row.try_get("account_id")?,
            display_name: row.try_get("display_name")?,
        }))
    }

    pub async fn list_account_infos(&self) -> Result<Vec<AccountInfo>, RecordStoreError> {
        let rows = sqlx::query(
            "SELECT account_id, display_name FROM account_infos ORDER BY account_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(AccountInfo {
                id: row.try_get("account_id")?,
                display_name: row.try_get("display_name")?,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl SyncRecordStore for SqliteRecordStore {
    async fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>, RecordStoreError> {
        self.get_record(key).await
    }

    async fn list_children(
        &self,
        parent: &ItemIdentifier,
    ) -> Result<Vec<SyncRecord>, RecordStoreError> {
        SqliteRecordStore::list_children(self, parent.as_str()).await
    }

    async fn set_downloaded(
        &self,
        key: &RecordKey,
        path: &Path,
    ) -> Result<bool, RecordStoreError> {
        SqliteRecordStore::set_downloaded(self, key, path).await
    }

    async fn upsert_record(
        &self,
        input: &SyncRecordInput,
    ) -> Result<SyncRecord, RecordStoreError> {
        SqliteRecordStore::upsert_record(self, input).await
    }

    async fn find_account_info(&self, id: &str) -> Result<Option<AccountInfo>, RecordStoreError> {
        self.get_account_info(id).await
    }

    async fn list_account_infos(&self) -> Result<Vec<AccountInfo>, RecordStoreError> {
        SqliteRecordStore::list_account_infos(self).await
    }
}

fn record_from_row(row: &SqliteRow) -> Result<SyncRecord, sqlx::Error> {
    let is_folder: i64 = row.try_get("is_folder")?;
    let downloaded: i64 = row.try_get("downloaded")?;
    Ok(SyncRecord {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        node_id: row.try_get("node_id")?,
        parent_identifier: row.try_get("parent_identifier")?,
        name: row.try_get("name")?,
        is_folder: is_folder != 0,
        size: row.try_get("size")?,
        modified: row.try_get("modified")?,
        downloaded: downloaded != 0,
        local_path: row.try_get("local_path")?,
        last_synced_at: row.try_get("last_synced_at")?,
    })
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
