use std::hash::{Hash, Hasher};

use super::adapters::{
    AccountAdapter, EntityAdapter, RemoteNodeAdapter, SiteAdapter, SyncedNodeAdapter,
};
use super::backend::{RemoteNode, Site};
use super::error::ProviderError;
use super::identifier::{ItemIdentifier, SourceKind, encode};
use crate::accounts::{AccountInfo, AccountRoot};
use crate::sync::records::SyncRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub readable: bool,
    pub enumerable: bool,
}

impl Capabilities {
    fn for_kind(kind: ItemKind) -> Self {
        match kind {
            ItemKind::File => Self {
                readable: true,
                enumerable: false,
            },
            ItemKind::Folder => Self {
                readable: false,
                enumerable: true,
            },
        }
    }
}

/// Backend entity an item is built from, with the projected parent where the
/// entity cannot know it itself.
#[derive(Debug, Clone, Copy)]
pub enum ItemSource<'a> {
    Account(&'a AccountRoot),
    AccountInfo(&'a AccountInfo),
    RemoteNode {
        node: &'a RemoteNode,
        account_id: &'a str,
        parent: &'a ItemIdentifier,
        mirror: Option<&'a SyncRecord>,
    },
    Site {
        site: &'a Site,
        account_id: &'a str,
        parent: &'a ItemIdentifier,
    },
    SyncedNode {
        record: &'a SyncRecord,
        parent: &'a ItemIdentifier,
    },
}

/// Host-facing view of one tree entry. Immutable; compared by identifier.
#[derive(Debug, Clone)]
pub struct Item {
    identifier: ItemIdentifier,
    parent: ItemIdentifier,
    filename: String,
    kind: ItemKind,
    source_kind: SourceKind,
    size: Option<u64>,
    modified: Option<i64>,
    downloaded: bool,
    capabilities: Capabilities,
}

impl Item {
    pub fn from_source(source: ItemSource<'_>) -> Result<Self, ProviderError> {
        match source {
            ItemSource::Account(account) => Self::build(&AccountAdapter::from_root(account)),
            ItemSource::AccountInfo(info) => Self::build(&AccountAdapter::from_info(info)),
            ItemSource::RemoteNode {
                node,
                account_id,
                parent,
                mirror,
            } => Self::build(&RemoteNodeAdapter::new(
                node,
                account_id,
                parent.clone(),
                mirror,
            )),
            ItemSource::Site {
                site,
                account_id,
                parent,
            } => Self::build(&SiteAdapter::new(site, account_id, parent.clone())),
            ItemSource::SyncedNode { record, parent } => {
                Self::build(&SyncedNodeAdapter::new(record, parent.clone()))
            }
        }
    }

    pub fn from_account(account: &AccountRoot) -> Result<Self, ProviderError> {
        Self::from_source(ItemSource::Account(account))
    }

    pub fn from_account_info(info: &AccountInfo) -> Result<Self, ProviderError> {
        Self::from_source(ItemSource::AccountInfo(info))
    }

    pub fn from_remote_node(
        node: &RemoteNode,
        account_id: &str,
        parent: &ItemIdentifier,
        mirror: Option<&SyncRecord>,
    ) -> Result<Self, ProviderError> {
        Self::from_source(ItemSource::RemoteNode {
            node,
            account_id,
            parent,
            mirror,
        })
    }

    pub fn from_site(
        site: &Site,
        account_id: &str,
        parent: &ItemIdentifier,
    ) -> Result<Self, ProviderError> {
        Self::from_source(ItemSource::Site {
            site,
            account_id,
            parent,
        })
    }

    pub fn from_sync_record(
        record: &SyncRecord,
        parent: &ItemIdentifier,
    ) -> Result<Self, ProviderError> {
        Self::from_source(ItemSource::SyncedNode { record, parent })
    }

    fn build(adapter: &dyn EntityAdapter) -> Result<Self, ProviderError> {
        if adapter.backend_key().is_empty() || adapter.account_id().is_empty() {
            return Err(ProviderError::InvalidItem("empty identifier"));
        }
        let filename = adapter.filename();
        if filename.trim().is_empty() {
            return Err(ProviderError::InvalidItem("empty filename"));
        }
        let parent = adapter.parent_identifier();
        if parent.is_empty() {
            return Err(ProviderError::InvalidItem("empty parent identifier"));
        }

        let kind = if adapter.is_folder() {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        Ok(Self {
            identifier: encode(
                adapter.source_kind(),
                adapter.backend_key(),
                adapter.account_id(),
            ),
            parent,
            filename: filename.to_string(),
            kind,
            source_kind: adapter.source_kind(),
            size: adapter.size(),
            modified: adapter.modification_time(),
            downloaded: adapter.is_downloaded(),
            capabilities: Capabilities::for_kind(kind),
        })
    }

    pub fn item_identifier(&self) -> &ItemIdentifier {
        &self.identifier
    }

    pub fn parent_item_identifier(&self) -> &ItemIdentifier {
        &self.parent
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn is_downloaded(&self) -> bool {
        self.downloaded
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Unix seconds.
    pub fn modified(&self) -> Option<i64> {
        self.modified
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn site(title: &str) -> Site {
        Site {
            id: "teamsite".into(),
            guid: None,
            title: title.into(),
            description: None,
            visibility: None,
        }
    }

    fn node(name: &str) -> RemoteNode {
        RemoteNode {
            id: "n-1".into(),
            name: name.into(),
            node_type: Some("cm:content".into()),
            is_folder: false,
            is_file: true,
            modified_at: None,
            parent_id: Some("lib-1".into()),
            content: None,
            path: None,
        }
    }

    #[test]
    fn account_item_sits_under_root() {
        let info = AccountInfo {
            id: "acme".into(),
            display_name: "Acme".into(),
        };
        let item = Item::from_account_info(&info).unwrap();
        assert_eq!(item.item_identifier(), &encode(SourceKind::Account, "acme", "acme"));
        assert!(item.parent_item_identifier().is_root());
        assert_eq!(item.kind(), ItemKind::Folder);
        assert!(item.capabilities().enumerable);
        assert!(!item.is_downloaded());
    }

    #[test]
    fn rename_keeps_identifier() {
        let parent = encode(SourceKind::Site, "teamsite", "acme");
        let before = Item::from_remote_node(&node("report.pdf"), "acme", &parent, None).unwrap();
        let after = Item::from_remote_node(&node("final.pdf"), "acme", &parent, None).unwrap();
        assert_eq!(before, after);
        assert_ne!(before.filename(), after.filename());

        let set: HashSet<_> = [before, after].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejects_empty_filename() {
        let parent = encode(SourceKind::Site, "teamsite", "acme");
        let err = Item::from_remote_node(&node(""), "acme", &parent, None).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidItem(_)));
    }

    #[test]
    fn rejects_blank_filename() {
        let parent = encode(SourceKind::Site, "teamsite", "acme");
        let err = Item::from_remote_node(&node(" "), "acme", &parent, None).unwrap_err();
        assert_eq!(err, ProviderError::InvalidItem("empty filename"));

        let padded = Item::from_remote_node(&node(" notes.txt"), "acme", &parent, None).unwrap();
        assert_eq!(padded.filename(), " notes.txt");
    }

    #[test]
    fn rejects_empty_account() {
        let parent = ItemIdentifier::root();
        let err = Item::from_site(&site("Team Site"), "", &parent).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidItem(_)));
    }

    #[test]
    fn same_key_different_kinds_are_distinct_items() {
        let parent = encode(SourceKind::Account, "acme", "acme");
        let record = SyncRecord {
            id: 1,
            account_id: "acme".into(),
            node_id: "teamsite".into(),
            parent_identifier: parent.to_string(),
            name: "teamsite".into(),
            is_folder: true,
            size: None,
            modified: None,
            downloaded: false,
            local_path: None,
            last_synced_at: None,
        };
        let site_item = Item::from_site(&site("Team Site"), "acme", &parent).unwrap();
        let synced = Item::from_sync_record(&record, &parent).unwrap();
        assert_ne!(site_item, synced);
        assert_eq!(synced.source_kind(), SourceKind::SyncedNode);
    }
}
