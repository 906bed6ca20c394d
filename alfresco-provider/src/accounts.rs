use std::collections::HashSet;
use std::path::Path;

use alfresco_core::Credentials;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::projection::backend::AccountRegistry;
use crate::projection::error::BackendError;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid accounts file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate account id: {0}")]
    DuplicateId(String),
}

/// A configured repository account. Anchors one tree in the projection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AccountRoot {
    pub id: String,
    pub display_name: String,
    pub server_url: String,
    pub username: String,
    /// Name of the environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    /// Node id of the user's personal folder, listed directly under the account.
    #[serde(default)]
    pub home_folder: Option<String>,
}

impl AccountRoot {
    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        let password = self
            .password_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Credentials::new(self.username.clone(), password)
    }
}

/// Persisted descriptor of an account, available without the registry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountRoot>,
}

/// Registry backed by a fixed list, usually loaded from `accounts.json`.
#[derive(Debug, Clone, Default)]
pub struct StaticAccountRegistry {
    accounts: Vec<AccountRoot>,
}

impl StaticAccountRegistry {
    pub fn new(accounts: Vec<AccountRoot>) -> Result<Self, AccountsError> {
        let mut seen = HashSet::new();
        for account in &accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(AccountsError::DuplicateId(account.id.clone()));
            }
        }
        Ok(Self { accounts })
    }

    pub fn load(path: &Path) -> Result<Self, AccountsError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "accounts file missing, no accounts configured");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let file: AccountsFile = serde_json::from_str(&raw)?;
        Self::new(file.accounts)
    }

    pub fn accounts(&self) -> &[AccountRoot] {
        &self.accounts
    }
}

#[async_trait]
impl AccountRegistry for StaticAccountRegistry {
    async fn list_accounts(&self) -> Result<Vec<AccountRoot>, BackendError> {
        Ok(self.accounts.clone())
    }

    async fn find_account(&self, id: &str) -> Result<Option<AccountRoot>, BackendError> {
        Ok(self.accounts.iter().find(|account| account.id == id).cloned())
    }
}
