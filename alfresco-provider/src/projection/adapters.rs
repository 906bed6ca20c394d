//! One adapter per backend entity. Adapters only read in-memory fields.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use super::backend::{RemoteNode, Site};
use super::identifier::{ItemIdentifier, SourceKind};
use crate::accounts::{AccountInfo, AccountRoot};
use crate::sync::records::SyncRecord;

pub trait EntityAdapter {
    fn source_kind(&self) -> SourceKind;
    fn account_id(&self) -> &str;
    /// Stable key the identifier is derived from.
    fn backend_key(&self) -> &str;
    fn filename(&self) -> &str;
    fn parent_identifier(&self) -> ItemIdentifier;
    fn is_folder(&self) -> bool;
    fn is_downloaded(&self) -> bool;
    fn modification_time(&self) -> Option<i64>;

    fn size(&self) -> Option<u64> {
        None
    }
}

pub struct AccountAdapter<'a> {
    id: &'a str,
    display_name: &'a str,
}

impl<'a> AccountAdapter<'a> {
    pub fn from_root(account: &'a AccountRoot) -> Self {
        Self {
            id: &account.id,
            display_name: &account.display_name,
        }
    }

    pub fn from_info(info: &'a AccountInfo) -> Self {
        Self {
            id: &info.id,
            display_name: &info.display_name,
        }
    }
}

impl EntityAdapter for AccountAdapter<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Account
    }

    fn account_id(&self) -> &str {
        self.id
    }

    fn backend_key(&self) -> &str {
        self.id
    }

    fn filename(&self) -> &str {
        self.display_name.trim()
    }

    fn parent_identifier(&self) -> ItemIdentifier {
        ItemIdentifier::root()
    }

    fn is_folder(&self) -> bool {
        true
    }

    fn is_downloaded(&self) -> bool {
        false
    }

    fn modification_time(&self) -> Option<i64> {
        None
    }
}

pub struct SiteAdapter<'a> {
    site: &'a Site,
    account_id: &'a str,
    parent: ItemIdentifier,
}

impl<'a> SiteAdapter<'a> {
    pub fn new(site: &'a Site, account_id: &'a str, parent: ItemIdentifier) -> Self {
        Self {
            site,
            account_id,
            parent,
        }
    }
}

impl EntityAdapter for SiteAdapter<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Site
    }

    fn account_id(&self) -> &str {
        self.account_id
    }

    fn backend_key(&self) -> &str {
        &self.site.id
    }

    fn filename(&self) -> &str {
        let title = self.site.title.trim();
        if title.is_empty() {
            self.site.id.as_str()
        } else {
            title
        }
    }

    fn parent_identifier(&self) -> ItemIdentifier {
        self.parent.clone()
    }

    fn is_folder(&self) -> bool {
        true
    }

    fn is_downloaded(&self) -> bool {
        false
    }

    fn modification_time(&self) -> Option<i64> {
        None
    }
}

pub struct RemoteNodeAdapter<'a> {
    node: &'a RemoteNode,
    account_id: &'a str,
    parent: ItemIdentifier,
    mirror: Option<&'a SyncRecord>,
}

impl<'a> RemoteNodeAdapter<'a> {
    pub fn new(
        node: &'a RemoteNode,
        account_id: &'a str,
        parent: ItemIdentifier,
        mirror: Option<&'a SyncRecord>,
    ) -> Self {
        Self {
            node,
            account_id,
            parent,
            mirror,
        }
    }
}

impl EntityAdapter for RemoteNodeAdapter<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::RemoteNode
    }

    fn account_id(&self) -> &str {
        self.account_id
    }

    fn backend_key(&self) -> &str {
        &self.node.id
    }

    fn filename(&self) -> &str {
        &self.node.name
    }

    fn parent_identifier(&self) -> ItemIdentifier {
        self.parent.clone()
    }

    fn is_folder(&self) -> bool {
        self.node.is_folder
    }

    fn is_downloaded(&self) -> bool {
        !self.node.is_folder && self.mirror.is_some_and(|record| record.downloaded)
    }

    fn modification_time(&self) -> Option<i64> {
        self.node.modified_at.as_deref().and_then(parse_timestamp)
    }

    fn size(&self) -> Option<u64> {
        self.node.size()
    }
}

pub struct SyncedNodeAdapter<'a> {
    record: &'a SyncRecord,
    parent: ItemIdentifier,
}

impl<'a> SyncedNodeAdapter<'a> {
    pub fn new(record: &'a SyncRecord, parent: ItemIdentifier) -> Self {
        Self { record, parent }
    }
}

impl EntityAdapter for SyncedNodeAdapter<'_> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::SyncedNode
    }

    fn account_id(&self) -> &str {
        &self.record.account_id
    }

    fn backend_key(&self) -> &str {
        &self.record.node_id
    }

    fn filename(&self) -> &str {
        &self.record.name
    }

    fn parent_identifier(&self) -> ItemIdentifier {
        self.parent.clone()
    }

    fn is_folder(&self) -> bool {
        self.record.is_folder
    }

    fn is_downloaded(&self) -> bool {
        !self.record.is_folder && self.record.downloaded
    }

    // Last-synced metadata; may lag behind the repository.
    fn modification_time(&self) -> Option<i64> {
        self.record.modified
    }

    fn size(&self) -> Option<u64> {
        self.record.size.and_then(|size| u64::try_from(size).ok())
    }
}

/// Parses repository timestamps, accepting both RFC 3339 and the
/// `2024-01-01T00:00:00.000+0000` form the repository emits.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let compact = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(value, compact));
    match parsed {
        Ok(parsed) => Some(parsed.unix_timestamp()),
        Err(err) => {
            tracing::debug!(value, error = %err, "unparseable repository timestamp");
            None
        }
    }
}
