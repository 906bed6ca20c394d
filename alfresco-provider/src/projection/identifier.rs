//! Stable, opaque item identifiers.
//!
//! An identifier has the textual form `<tag>:<account>:<key>`. Both the
//! account id and the backend key are form-urlencoded, so separators inside
//! them never leak into the structure. Decoding only accepts the canonical
//! form produced by [`encode`]; anything else is reported as malformed.

use std::fmt;

use url::form_urlencoded;

use super::error::ProviderError;

/// Reserved identifier of the host's root container (the parent of accounts).
pub const ROOT_IDENTIFIER: &str = "root";

const SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Account,
    Site,
    RemoteNode,
    SyncedNode,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Account,
        SourceKind::Site,
        SourceKind::RemoteNode,
        SourceKind::SyncedNode,
    ];

    fn tag(self) -> &'static str {
        match self {
            SourceKind::Account => "account",
            SourceKind::Site => "site",
            SourceKind::RemoteNode => "node",
            SourceKind::SyncedNode => "synced",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "account" => Some(SourceKind::Account),
            "site" => Some(SourceKind::Site),
            "node" => Some(SourceKind::RemoteNode),
            "synced" => Some(SourceKind::SyncedNode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemIdentifier(String);

impl ItemIdentifier {
    pub fn root() -> Self {
        Self(ROOT_IDENTIFIER.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_IDENTIFIER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn decode(&self) -> Result<IdentifierParts, ProviderError> {
        decode(&self.0)
    }
}

impl fmt::Display for ItemIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Wraps a string handed back by the host. No validation happens here.
impl From<String> for ItemIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierParts {
    pub kind: SourceKind,
    pub backend_key: String,
    pub account_id: String,
}

impl IdentifierParts {
    pub fn encode(&self) -> ItemIdentifier {
        encode(self.kind, &self.backend_key, &self.account_id)
    }
}

pub fn encode(kind: SourceKind, backend_key: &str, account_id: &str) -> ItemIdentifier {
    ItemIdentifier(format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}",
        kind.tag(),
        escape(account_id),
        escape(backend_key)
    ))
}

pub fn decode(identifier: &str) -> Result<IdentifierParts, ProviderError> {
    let malformed = || ProviderError::MalformedIdentifier(identifier.to_string());
    let mut parts = identifier.splitn(3, SEPARATOR);
    let (Some(tag), Some(account), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let kind = SourceKind::from_tag(tag).ok_or_else(malformed)?;
    let account_id = unescape(account).ok_or_else(malformed)?;
    let backend_key = unescape(key).ok_or_else(malformed)?;
    Ok(IdentifierParts {
        kind,
        backend_key,
        account_id,
    })
}

fn escape(part: &str) -> String {
    form_urlencoded::byte_serialize(part.as_bytes()).collect()
}

// Rejects empty and non-canonical components.
fn unescape(part: &str) -> Option<String> {
    let (decoded, _) = form_urlencoded::parse(part.as_bytes()).next()?;
    let decoded = decoded.into_owned();
    (!decoded.is_empty() && escape(&decoded) == part).then_some(decoded)
}
