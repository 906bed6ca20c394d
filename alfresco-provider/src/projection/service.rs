use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::adapters::parse_timestamp;
use super::backend::{
    AccountRegistry, RemoteNode, RepositoryBackend, SiteDirectory, SyncRecordStore,
};
use super::error::{BackendError, ProviderError};
use super::identifier::{ItemIdentifier, SourceKind, decode, encode};
use super::inflight::{InFlightTable, MaterializeHandle, MaterializedContent, Registration};
use super::item::Item;
use crate::sync::paths::cache_path_for;
use crate::sync::records::{RecordKey, SyncRecord, SyncRecordInput};
use crate::sync::transfer::{commit_partial, discard_partial, partial_path};

/// Upper bound on parent hops from any item to the root.
pub const MAX_PARENT_DEPTH: usize = 64;

pub struct ProjectionBackends {
    pub accounts: Arc<dyn AccountRegistry>,
    pub repository: Arc<dyn RepositoryBackend>,
    pub sites: Arc<dyn SiteDirectory>,
    pub records: Arc<dyn SyncRecordStore>,
}

/// Content of a materialized item together with its refreshed metadata.
#[derive(Debug, Clone)]
pub struct FetchedContents {
    pub item: Item,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct ProjectionService {
    accounts: Arc<dyn AccountRegistry>,
    repository: Arc<dyn RepositoryBackend>,
    sites: Arc<dyn SiteDirectory>,
    records: Arc<dyn SyncRecordStore>,
    cache_root: PathBuf,
    in_flight: Arc<InFlightTable>,
}

impl ProjectionService {
    pub fn new(backends: ProjectionBackends, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            accounts: backends.accounts,
            repository: backends.repository,
            sites: backends.sites,
            records: backends.records,
            cache_root: cache_root.into(),
            in_flight: Arc::new(InFlightTable::new()),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Number of materializations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolves one identifier to a freshly built item.
    ///
    /// Identifiers that do not decode are reported as `NotFound`, the same as
    /// entities that no longer exist. The root container belongs to the host
    /// and never resolves.
    pub async fn item(&self, identifier: &ItemIdentifier) -> Result<Item, ProviderError> {
        let not_found = || ProviderError::NotFound(identifier.to_string());
        if identifier.is_root() {
            return Err(not_found());
        }
        let Ok(parts) = decode(identifier.as_str()) else {
            tracing::debug!(%identifier, "identifier does not decode");
            return Err(not_found());
        };
        let account = parts.account_id.as_str();
        let key = parts.backend_key.as_str();

        match parts.kind {
            SourceKind::Account if key == account => self.resolve_account(account).await,
            SourceKind::Account => Err(not_found()),
            SourceKind::Site => {
                let parent = account_identifier(account);
                let sites = self.sites.list_sites(account).await?;
                let site = sites
                    .iter()
                    .find(|site| site.id == key)
                    .ok_or_else(not_found)?;
                Item::from_site(site, account, &parent)
            }
            SourceKind::RemoteNode => {
                let node = self.repository.fetch_node(account, key).await?;
                let parent = self.projected_parent(account, &node).await?;
                let mirror = self.mirror(account, key).await?;
                Item::from_remote_node(&node, account, &parent, mirror.as_ref())
            }
            SourceKind::SyncedNode => {
                let record = self
                    .records
                    .find_record(&RecordKey::new(account, key))
                    .await?
                    .ok_or_else(not_found)?;
                let parent = record_parent(&record);
                Item::from_sync_record(&record, &parent)
            }
        }
    }

    /// Like [`item`](Self::item), with a missing entity reported as `None`.
    pub async fn lookup(&self, identifier: &ItemIdentifier) -> Result<Option<Item>, ProviderError> {
        match self.item(identifier).await {
            Ok(item) => Ok(Some(item)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Ordered children of `parent`. Files have none.
    pub async fn children(&self, parent: &ItemIdentifier) -> Result<Vec<Item>, ProviderError> {
        let built = if parent.is_root() {
            self.root_children().await?
        } else {
            let Ok(parts) = decode(parent.as_str()) else {
                return Err(ProviderError::NotFound(parent.to_string()));
            };
            let account = parts.account_id.as_str();
            let key = parts.backend_key.as_str();
            match parts.kind {
                SourceKind::Account if key != account => {
                    return Err(ProviderError::NotFound(parent.to_string()));
                }
                SourceKind::Account => self.account_children(account, parent).await?,
                SourceKind::Site => self.site_children(account, key, parent).await?,
                SourceKind::RemoteNode => self.remote_children(account, key, parent).await?,
                SourceKind::SyncedNode => self.synced_children(account, key, parent).await?,
            }
        };

        let mut items = Vec::with_capacity(built.len());
        for child in built {
            match child {
                Ok(item) => items.push(item),
                Err(err) => tracing::warn!(%parent, error = %err, "skipping invalid child"),
            }
        }
        Ok(order_children(items))
    }

    /// Ancestors of `identifier`, nearest first, excluding the root container.
    pub async fn ancestors(&self, identifier: &ItemIdentifier) -> Result<Vec<Item>, ProviderError> {
        let mut visited = HashSet::from([identifier.clone()]);
        let mut chain = Vec::new();
        let mut current = self.item(identifier).await?.parent_item_identifier().clone();

        while !current.is_root() {
            if chain.len() >= MAX_PARENT_DEPTH {
                tracing::warn!(%identifier, "parent chain exceeds depth limit");
                return Err(ProviderError::NotFound(identifier.to_string()));
            }
            if !visited.insert(current.clone()) {
                tracing::warn!(%identifier, at = %current, "parent chain contains a cycle");
                return Err(ProviderError::NotFound(identifier.to_string()));
            }
            let item = self.item(&current).await?;
            current = item.parent_item_identifier().clone();
            chain.push(item);
        }
        Ok(chain)
    }

    /// Starts (or joins) the download of an item's content into the cache.
    ///
    /// The remote and synced identifiers of one node share a single download.
    /// Must be called from within a tokio runtime.
    pub fn materialize(&self, identifier: &ItemIdentifier) -> MaterializeHandle {
        let Ok(parts) = decode(identifier.as_str()) else {
            return MaterializeHandle::resolved(
                identifier,
                Err(ProviderError::NotFound(identifier.to_string())),
            );
        };
        if !matches!(parts.kind, SourceKind::RemoteNode | SourceKind::SyncedNode) {
            return MaterializeHandle::resolved(
                identifier,
                Err(ProviderError::materialization(
                    identifier.as_str(),
                    "item has no content",
                )),
            );
        }

        let key = RecordKey::new(parts.account_id, parts.backend_key);
        match self.in_flight.register(key.clone(), identifier) {
            Registration::Attached(handle) => {
                tracing::debug!(%identifier, "joining in-flight materialization");
                handle
            }
            Registration::Started { handle, completion } => {
                let service = self.clone();
                let identifier = identifier.clone();
                let kind = parts.kind;
                tokio::spawn(async move {
                    let token = completion.token();
                    let outcome = service
                        .run_materialization(&identifier, kind, &key, &token)
                        .await;
                    match &outcome {
                        Ok(content) => tracing::info!(
                            %identifier,
                            path = %content.path.display(),
                            "materialized"
                        ),
                        Err(err) => tracing::warn!(%identifier, error = %err, "materialization failed"),
                    }
                    completion.finish(outcome);
                });
                handle
            }
        }
    }

    /// Materializes the item and returns its content path and refreshed item.
    pub async fn fetch_contents(
        &self,
        identifier: &ItemIdentifier,
    ) -> Result<FetchedContents, ProviderError> {
        let content = self.materialize(identifier).wait().await?;
        let item = self.item(identifier).await?;
        Ok(FetchedContents {
            item,
            path: content.path,
        })
    }

    async fn resolve_account(&self, account: &str) -> Result<Item, ProviderError> {
        match self.accounts.find_account(account).await {
            Ok(Some(root)) => Item::from_account(&root),
            Ok(None) => Err(ProviderError::NotFound(account.to_string())),
            Err(BackendError::Unavailable(reason)) => {
                match self.records.find_account_info(account).await? {
                    Some(info) => Item::from_account_info(&info),
                    None => Err(ProviderError::TemporarilyUnavailable(reason)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn root_children(&self) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        match self.accounts.list_accounts().await {
            Ok(accounts) => Ok(accounts.iter().map(Item::from_account).collect()),
            Err(BackendError::Unavailable(reason)) => {
                tracing::warn!(%reason, "account registry unavailable, listing persisted accounts");
                let infos = self.records.list_account_infos().await?;
                Ok(infos.iter().map(Item::from_account_info).collect())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn account_children(
        &self,
        account: &str,
        parent: &ItemIdentifier,
    ) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        let root = self
            .accounts
            .find_account(account)
            .await?
            .ok_or_else(|| ProviderError::NotFound(parent.to_string()))?;

        let mut built = Vec::new();
        for site in self.sites.list_sites(account).await? {
            built.push(Item::from_site(&site, account, parent));
        }
        if let Some(home) = root.home_folder.as_deref() {
            let node = self.repository.fetch_node(account, home).await?;
            let mirror = self.mirror(account, home).await?;
            built.push(Item::from_remote_node(
                &node,
                account,
                parent,
                mirror.as_ref(),
            ));
        }
        for record in self.records.list_children(parent).await? {
            built.push(Item::from_sync_record(&record, parent));
        }
        Ok(built)
    }

    async fn site_children(
        &self,
        account: &str,
        site: &str,
        parent: &ItemIdentifier,
    ) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        let roots = self.sites.list_site_roots(account, site).await?;
        self.overlay_nodes(account, &roots, parent).await
    }

    async fn remote_children(
        &self,
        account: &str,
        node_id: &str,
        parent: &ItemIdentifier,
    ) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        let node = self.repository.fetch_node(account, node_id).await?;
        if !node.is_folder {
            return Ok(Vec::new());
        }
        let children = self.repository.list_children(account, node_id).await?;
        self.overlay_nodes(account, &children, parent).await
    }

    async fn synced_children(
        &self,
        account: &str,
        node_id: &str,
        parent: &ItemIdentifier,
    ) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        let record = self
            .records
            .find_record(&RecordKey::new(account, node_id))
            .await?
            .ok_or_else(|| ProviderError::NotFound(parent.to_string()))?;
        if !record.is_folder {
            return Ok(Vec::new());
        }
        let records = self.records.list_children(parent).await?;
        Ok(records
            .iter()
            .map(|record| Item::from_sync_record(record, parent))
            .collect())
    }

    async fn overlay_nodes(
        &self,
        account: &str,
        nodes: &[RemoteNode],
        parent: &ItemIdentifier,
    ) -> Result<Vec<Result<Item, ProviderError>>, ProviderError> {
        let mut built = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mirror = self.mirror(account, &node.id).await?;
            built.push(Item::from_remote_node(
                node,
                account,
                parent,
                mirror.as_ref(),
            ));
        }
        Ok(built)
    }

    async fn mirror(&self, account: &str, node_id: &str) -> Result<Option<SyncRecord>, ProviderError> {
        Ok(self
            .records
            .find_record(&RecordKey::new(account, node_id))
            .await?)
    }

    /// Where a repository node sits in the projected tree.
    async fn projected_parent(
        &self,
        account: &str,
        node: &RemoteNode,
    ) -> Result<ItemIdentifier, ProviderError> {
        let home = self
            .accounts
            .find_account(account)
            .await?
            .and_then(|root| root.home_folder);
        if home.as_deref() == Some(node.id.as_str()) {
            return Ok(account_identifier(account));
        }
        if let Some(site) = node.site_root_of() {
            return Ok(encode(SourceKind::Site, site, account));
        }
        match node.parent_id.as_deref() {
            Some(parent) if !parent.is_empty() => {
                Ok(encode(SourceKind::RemoteNode, parent, account))
            }
            _ => Ok(account_identifier(account)),
        }
    }

    async fn run_materialization(
        &self,
        identifier: &ItemIdentifier,
        kind: SourceKind,
        key: &RecordKey,
        token: &CancellationToken,
    ) -> Result<MaterializedContent, ProviderError> {
        let account = key.account_id.as_str();
        let node_id = key.node_id.as_str();

        let record = self.records.find_record(key).await?;
        if kind == SourceKind::SyncedNode && record.is_none() {
            return Err(ProviderError::NotFound(identifier.to_string()));
        }
        if let Some(path) = record.as_ref().and_then(cached_path)
            && tokio::fs::try_exists(&path).await.unwrap_or(false)
        {
            tracing::debug!(%identifier, "content already materialized");
            return Ok(MaterializedContent {
                identifier: identifier.clone(),
                path,
            });
        }

        let node = cancellable(identifier, token, async {
            Ok(self.repository.fetch_node(account, node_id).await?)
        })
        .await?;
        if node.is_folder {
            return Err(ProviderError::materialization(
                identifier.as_str(),
                "folders have no content",
            ));
        }
        let target = cache_path_for(&self.cache_root, account, node_id, &node.name)
            .map_err(|err| ProviderError::materialization(identifier.as_str(), err))?;

        let staged = self
            .stage_content(identifier, token, account, node_id, &target)
            .await;
        if let Err(err) = staged {
            discard_partial(&target).await;
            return Err(err);
        }

        if record.is_none() {
            let parent = self.projected_parent(account, &node).await?;
            self.records
                .upsert_record(&record_input(account, &node, &parent))
                .await?;
        }
        match self.records.set_downloaded(key, &target).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%identifier, "sync record vanished before download flag was set");
            }
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                    tracing::warn!(path = %target.display(), error = %remove_err, "failed to remove unflagged content");
                }
                return Err(err.into());
            }
        }

        Ok(MaterializedContent {
            identifier: identifier.clone(),
            path: target,
        })
    }

    // Writes to the staging path and moves the file into place. The caller
    // discards the staging file on error.
    async fn stage_content(
        &self,
        identifier: &ItemIdentifier,
        token: &CancellationToken,
        account: &str,
        node_id: &str,
        target: &Path,
    ) -> Result<(), ProviderError> {
        let partial = partial_path(target);
        if let Some(dir) = partial.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| ProviderError::materialization(identifier.as_str(), err))?;
        }

        cancellable(identifier, token, async {
            self.repository
                .download_content(account, node_id, &partial)
                .await
                .map_err(|err| download_error(identifier, err))
        })
        .await?;

        if token.is_cancelled() {
            return Err(ProviderError::Cancelled(identifier.to_string()));
        }
        commit_partial(target)
            .await
            .map_err(|err| ProviderError::materialization(identifier.as_str(), err))
    }
}

async fn cancellable<T>(
    identifier: &ItemIdentifier,
    token: &CancellationToken,
    work: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProviderError::Cancelled(identifier.to_string())),
        result = work => result,
    }
}

fn download_error(identifier: &ItemIdentifier, err: BackendError) -> ProviderError {
    match err {
        BackendError::Failed(reason) => {
            ProviderError::materialization(identifier.as_str(), reason)
        }
        other => other.into(),
    }
}

fn account_identifier(account: &str) -> ItemIdentifier {
    encode(SourceKind::Account, account, account)
}

fn record_parent(record: &SyncRecord) -> ItemIdentifier {
    if record.parent_identifier.is_empty() {
        account_identifier(&record.account_id)
    } else {
        ItemIdentifier::from(record.parent_identifier.as_str())
    }
}

fn cached_path(record: &SyncRecord) -> Option<PathBuf> {
    if !record.downloaded || record.is_folder {
        return None;
    }
    record.local_path.as_deref().map(PathBuf::from)
}

// Nodes projected directly under the account are stored detached (empty
// parent) so they stay out of the account's listing.
fn record_input(account: &str, node: &RemoteNode, parent: &ItemIdentifier) -> SyncRecordInput {
    let parent_identifier = if *parent == account_identifier(account) {
        String::new()
    } else {
        parent.to_string()
    };
    SyncRecordInput {
        account_id: account.to_string(),
        node_id: node.id.clone(),
        parent_identifier,
        name: node.name.clone(),
        is_folder: node.is_folder,
        size: node.size().and_then(|size| i64::try_from(size).ok()),
        modified: node.modified_at.as_deref().and_then(parse_timestamp),
    }
}

/// Keeps backend order; entries sharing a filename are sorted by identifier
/// within the positions they occupy.
fn order_children(mut items: Vec<Item>) -> Vec<Item> {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, item) in items.iter().enumerate() {
        groups.entry(item.filename()).or_default().push(index);
    }
    let ties: Vec<Vec<usize>> = groups
        .into_values()
        .filter(|positions| positions.len() > 1)
        .collect();

    for positions in ties {
        let mut group: Vec<Item> = positions.iter().map(|&i| items[i].clone()).collect();
        group.sort_by(|a, b| a.item_identifier().cmp(b.item_identifier()));
        for (position, item) in positions.into_iter().zip(group) {
            items[position] = item;
        }
    }
    items
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
