//! Deduplication of concurrent materializations.
//!
//! Entries are keyed by the mirrored node, so every identifier that projects
//! the same content shares one download. The first request starts the work
//! and receives a [`Completion`]; later requests attach to the same outcome
//! until the completion is finished or dropped. A waiter that cancels only
//! withdraws itself; the shared work stops once no waiter is left.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;
use super::identifier::ItemIdentifier;
use crate::sync::records::RecordKey;

type Outcome = Option<Result<MaterializedContent, ProviderError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedContent {
    pub identifier: ItemIdentifier,
    pub path: PathBuf,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
    outcome: watch::Receiver<Outcome>,
    waiters: usize,
}

#[derive(Default)]
struct Entries {
    next_generation: u64,
    by_key: HashMap<RecordKey, InFlight>,
}

#[derive(Default)]
pub struct InFlightTable {
    entries: Mutex<Entries>,
}

pub enum Registration {
    Attached(MaterializeHandle),
    Started {
        handle: MaterializeHandle,
        completion: Completion,
    },
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self: &Arc<Self>, key: RecordKey, identifier: &ItemIdentifier) -> Registration {
        let mut entries = self.lock();
        if let Some(existing) = entries.by_key.get_mut(&key) {
            existing.waiters += 1;
            let handle = MaterializeHandle {
                identifier: identifier.clone(),
                own: CancellationToken::new(),
                shared: existing.token.clone(),
                outcome: existing.outcome.clone(),
                membership: Some(Membership {
                    table: Arc::clone(self),
                    key,
                    generation: existing.generation,
                }),
            };
            return Registration::Attached(handle);
        }

        let generation = entries.next_generation;
        entries.next_generation += 1;
        let (sender, receiver) = watch::channel(None);
        let token = CancellationToken::new();
        entries.by_key.insert(
            key.clone(),
            InFlight {
                generation,
                token: token.clone(),
                outcome: receiver.clone(),
                waiters: 1,
            },
        );
        Registration::Started {
            handle: MaterializeHandle {
                identifier: identifier.clone(),
                own: CancellationToken::new(),
                shared: token.clone(),
                outcome: receiver,
                membership: Some(Membership {
                    table: Arc::clone(self),
                    key: key.clone(),
                    generation,
                }),
            },
            completion: Completion {
                table: Arc::clone(self),
                key,
                generation,
                identifier: identifier.clone(),
                token,
                sender: Some(sender),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_key.is_empty()
    }

    // Drops one waiter; cancels the shared work when it was the last one.
    fn withdraw(&self, key: &RecordKey, generation: u64) {
        let mut entries = self.lock();
        let Some(entry) = entries.by_key.get_mut(key) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            entry.token.cancel();
        }
    }

    fn remove(&self, key: &RecordKey, generation: u64) {
        let mut entries = self.lock();
        if entries
            .by_key
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.by_key.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned by the task doing the work. Reports exactly one outcome.
pub struct Completion {
    table: Arc<InFlightTable>,
    key: RecordKey,
    generation: u64,
    identifier: ItemIdentifier,
    token: CancellationToken,
    sender: Option<watch::Sender<Outcome>>,
}

impl Completion {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn finish(mut self, outcome: Result<MaterializedContent, ProviderError>) {
        self.publish(outcome);
    }

    fn publish(&mut self, outcome: Result<MaterializedContent, ProviderError>) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        // Unlisted before publishing so a new request after this point starts fresh.
        self.table.remove(&self.key, self.generation);
        sender.send_replace(Some(outcome));
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.sender.is_none() {
            return;
        }
        let outcome = if self.token.is_cancelled() {
            ProviderError::Cancelled(self.identifier.to_string())
        } else {
            ProviderError::materialization(self.identifier.as_str(), "operation abandoned")
        };
        tracing::debug!(identifier = %self.identifier, "materialization dropped without outcome");
        self.publish(Err(outcome));
    }
}

struct Membership {
    table: Arc<InFlightTable>,
    key: RecordKey,
    generation: u64,
}

/// One caller's view of an in-flight materialization.
pub struct MaterializeHandle {
    identifier: ItemIdentifier,
    own: CancellationToken,
    shared: CancellationToken,
    outcome: watch::Receiver<Outcome>,
    membership: Option<Membership>,
}

impl MaterializeHandle {
    /// A handle whose outcome is known before any work starts.
    pub fn resolved(
        identifier: &ItemIdentifier,
        outcome: Result<MaterializedContent, ProviderError>,
    ) -> Self {
        let (_, receiver) = watch::channel(Some(outcome));
        Self {
            identifier: identifier.clone(),
            own: CancellationToken::new(),
            shared: CancellationToken::new(),
            outcome: receiver,
            membership: None,
        }
    }

    pub fn identifier(&self) -> &ItemIdentifier {
        &self.identifier
    }

    /// Stops waiting. The download itself continues while other callers wait on it.
    pub fn cancel(&self) {
        if self.own.is_cancelled() {
            return;
        }
        self.own.cancel();
        if let Some(membership) = &self.membership {
            membership
                .table
                .withdraw(&membership.key, membership.generation);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.own.is_cancelled() || self.outcome.borrow().is_some()
    }

    pub async fn wait(&self) -> Result<MaterializedContent, ProviderError> {
        let mut outcome = self.outcome.clone();
        tokio::select! {
            biased;
            _ = self.own.cancelled() => {
                // The last waiter to leave sees the work wound down.
                if self.shared.is_cancelled() {
                    let mut settled = self.outcome.clone();
                    let _ = settled.wait_for(Option::is_some).await;
                }
                Err(ProviderError::Cancelled(self.identifier.to_string()))
            }
            value = outcome.wait_for(Option::is_some) => match value {
                Ok(value) => match (*value).clone() {
                    Some(Ok(content)) => Ok(MaterializedContent {
                        identifier: self.identifier.clone(),
                        path: content.path,
                    }),
                    Some(Err(err)) => Err(self.restate(err)),
                    None => Err(ProviderError::materialization(
                        self.identifier.as_str(),
                        "no outcome reported",
                    )),
                },
                Err(_) => Err(ProviderError::materialization(
                    self.identifier.as_str(),
                    "operation abandoned",
                )),
            },
        }
    }

    // Shared outcomes name the identifier that started the work.
    fn restate(&self, err: ProviderError) -> ProviderError {
        match err {
            ProviderError::Cancelled(_) => ProviderError::Cancelled(self.identifier.to_string()),
            ProviderError::MaterializationFailed { reason, .. } => {
                ProviderError::materialization(self.identifier.as_str(), reason)
            }
            other => other,
        }
    }
}
