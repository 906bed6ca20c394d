//! Maps repository entities onto the host's virtual file tree.

pub mod adapters;
pub mod alfresco;
pub mod backend;
pub mod error;
pub mod identifier;
pub mod inflight;
pub mod item;
pub mod service;

pub use alfresco::AlfrescoBackend;
pub use backend::{AccountRegistry, RepositoryBackend, SiteDirectory, SyncRecordStore};
pub use error::{BackendError, ProviderError};
pub use identifier::{IdentifierParts, ItemIdentifier, ROOT_IDENTIFIER, SourceKind, decode, encode};
pub use inflight::{MaterializeHandle, MaterializedContent};
pub use item::{Capabilities, Item, ItemKind, ItemSource};
pub use service::{FetchedContents, MAX_PARENT_DEPTH, ProjectionBackends, ProjectionService};
