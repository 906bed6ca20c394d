use std::collections::HashMap;
use std::path::Path;

use alfresco_core::{AlfrescoClient, AlfrescoError, ApiErrorClass};
use async_trait::async_trait;

use super::backend::{RemoteNode, RepositoryBackend, Site, SiteDirectory};
use super::error::BackendError;
use crate::accounts::AccountRoot;
use crate::sync::transfer::{TransferClient, TransferError};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

impl From<AlfrescoError> for BackendError {
    fn from(err: AlfrescoError) -> Self {
        let message = err.to_string();
        match err.classification() {
            ApiErrorClass::Auth => BackendError::AccessDenied(message),
            ApiErrorClass::NotFound => BackendError::NotFound(message),
            ApiErrorClass::RateLimit | ApiErrorClass::Transient => {
                BackendError::Unavailable(message)
            }
            ApiErrorClass::Permanent => BackendError::Failed(message),
        }
    }
}

impl From<TransferError> for BackendError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Request(err) if err.is_timeout() || err.is_connect() || err.is_body() => {
                BackendError::Unavailable(err.to_string())
            }
            other => BackendError::Failed(other.to_string()),
        }
    }
}

/// Repository and site access over one REST client per configured account.
pub struct AlfrescoBackend {
    clients: HashMap<String, AlfrescoClient>,
    transfer: TransferClient,
    page_size: u32,
}

impl AlfrescoBackend {
    pub fn new(transfer: TransferClient, page_size: u32) -> Self {
        Self {
            clients: HashMap::new(),
            transfer,
            page_size: page_size.max(1),
        }
    }

    pub fn from_accounts(
        accounts: &[AccountRoot],
        transfer: TransferClient,
        page_size: u32,
    ) -> Result<Self, AlfrescoError> {
        let mut backend = Self::new(transfer, page_size);
        for account in accounts {
            let client = AlfrescoClient::new(&account.server_url, account.credentials())?;
            backend = backend.with_account(account.id.clone(), client);
        }
        Ok(backend)
    }

    pub fn with_account(mut self, account_id: impl Into<String>, client: AlfrescoClient) -> Self {
        self.clients.insert(account_id.into(), client);
        self
    }

    fn client(&self, account_id: &str) -> Result<&AlfrescoClient, BackendError> {
        self.clients
            .get(account_id)
            .ok_or_else(|| BackendError::NotFound(format!("unknown account {account_id}")))
    }
}

#[async_trait]
impl RepositoryBackend for AlfrescoBackend {
    async fn fetch_node(
        &self,
        account_id: &str,
        node_id: &str,
    ) -> Result<RemoteNode, BackendError> {
        Ok(self.client(account_id)?.get_node(node_id).await?)
    }

    async fn list_children(
        &self,
        account_id: &str,
        node_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        Ok(self
            .client(account_id)?
            .list_children_all(node_id, self.page_size)
            .await?)
    }

    async fn download_content(
        &self,
        account_id: &str,
        node_id: &str,
        destination: &Path,
    ) -> Result<(), BackendError> {
        let response = self.client(account_id)?.get_content(node_id).await?;
        let expected = response.content_length();
        let written = self
            .transfer
            .download_to_path(response, destination, expected)
            .await?;
        tracing::debug!(account_id, node_id, bytes = written, "content downloaded");
        Ok(())
    }
}

#[async_trait]
impl SiteDirectory for AlfrescoBackend {
    async fn list_sites(&self, account_id: &str) -> Result<Vec<Site>, BackendError> {
        Ok(self.client(account_id)?.list_sites_all(self.page_size).await?)
    }

    async fn list_site_roots(
        &self,
        account_id: &str,
        site_id: &str,
    ) -> Result<Vec<RemoteNode>, BackendError> {
        Ok(self
            .client(account_id)?
            .list_site_roots(site_id, self.page_size)
            .await?)
    }
}
