use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::projection::alfresco::DEFAULT_PAGE_SIZE;
use crate::sync::transfer::TransferConfig;

const APP_DIR_NAME: &str = "alfresco-provider";
const ACCOUNTS_FILE_NAME: &str = "accounts.json";
const DATABASE_FILE_NAME: &str = "sync-records.db";
const DEFAULT_DOWNLOAD_CONCURRENCY: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub accounts_file: PathBuf,
    pub cache_root: PathBuf,
    pub database_path: PathBuf,
    pub download_concurrency: usize,
    pub page_size: u32,
}

impl ProviderConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Ok(Self::from_lookup(&home, |name| std::env::var(name).ok()))
    }

    fn from_lookup(home: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path_var = |name: &str, default: PathBuf| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| expand_with_home(&value, home))
                .unwrap_or(default)
        };
        let accounts_file = path_var(
            "ALFRESCO_ACCOUNTS_FILE",
            app_dir(dirs::config_dir(), home, ".config").join(ACCOUNTS_FILE_NAME),
        );
        let cache_root = path_var("ALFRESCO_CACHE_DIR", default_cache_root());
        let database_path = path_var(
            "ALFRESCO_DATABASE",
            app_dir(dirs::data_dir(), home, ".local/share").join(DATABASE_FILE_NAME),
        );
        let download_concurrency = read_u64_env(
            &lookup,
            "ALFRESCO_DOWNLOAD_CONCURRENCY",
            DEFAULT_DOWNLOAD_CONCURRENCY,
        );
        let page_size = read_u64_env(&lookup, "ALFRESCO_PAGE_SIZE", u64::from(DEFAULT_PAGE_SIZE));

        Self {
            accounts_file,
            cache_root,
            database_path,
            download_concurrency: usize::try_from(download_concurrency).unwrap_or(usize::MAX),
            page_size: u32::try_from(page_size).unwrap_or(u32::MAX),
        }
    }

    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            download_concurrency: self.download_concurrency,
        }
    }
}

fn app_dir(base: Option<PathBuf>, home: &Path, fallback: &str) -> PathBuf {
    base.unwrap_or_else(|| home.join(fallback)).join(APP_DIR_NAME)
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
