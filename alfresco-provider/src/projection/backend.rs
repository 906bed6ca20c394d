//! Contracts of the collaborators the projection layer routes requests to.

use std::path::Path;

use async_trait::async_trait;

use super::error::BackendError;
use super::identifier::ItemIdentifier;
use crate::accounts::{AccountInfo, AccountRoot};
use crate::sync::records::{RecordKey, RecordStoreError, SyncRecord, SyncRecordInput};

pub use alfresco_core::{Node as RemoteNode, Site};

#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<AccountRoot>, BackendError>;
    async fn find_account(&self, id: &str) -> Result<Option<AccountRoot>, BackendError>;
}

#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    async fn fetch_node(&self, account_id: &str, node_id: &str)
    -> Result<RemoteNode, BackendError>;

    async fn list_children(
        &self,
        account_id: &str,
        node_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError>;

    /// Writes the node's content to `destination`. Returns only once the bytes
    /// are flushed to disk.
    async fn download_content(
        &self,
        account_id: &str,
        node_id: &str,
        destination: &Path,
    ) -> Result<(), BackendError>;
}

#[async_trait]
pub trait SiteDirectory: Send + Sync {
    async fn list_sites(&self, account_id: &str) -> Result<Vec<Site>, BackendError>;

    async fn list_site_roots(
        &self,
        account_id: &str,
        site_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError>;
}

/// Local mirror of remote nodes. Written by the sync subsystem; the projection
/// layer only reads it, except for flagging completed downloads.
#[async_trait]
pub trait SyncRecordStore: Send + Sync {
    async fn find_record(&self, key: &RecordKey) -> Result<Option<SyncRecord>, RecordStoreError>;

    async fn list_children(
        &self,
        parent: &ItemIdentifier,
    ) -> Result<Vec<SyncRecord>, RecordStoreError>;

    /// Returns false when no record exists for `key`.
    async fn set_downloaded(&self, key: &RecordKey, path: &Path)
    -> Result<bool, RecordStoreError>;

    async fn upsert_record(&self, input: &SyncRecordInput)
    -> Result<SyncRecord, RecordStoreError>;

    async fn find_account_info(&self, id: &str) -> Result<Option<AccountInfo>, RecordStoreError>;

    async fn list_account_infos(&self) -> Result<Vec<AccountInfo>, RecordStoreError>;
}
