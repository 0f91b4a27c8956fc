//! Remote transactions opened on behalf of ambient transaction scopes

use crate::error::{ClientError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;

/// Lifecycle of a remote transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting statements
    Active,
    /// The ambient transaction asked for a vote
    Preparing,
    /// Commit request in flight
    Committing,
    /// Rollback request in flight
    RollingBack,
    /// Removed from the registry
    Terminated,
}

impl TransactionState {
    fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Active, Preparing)
                | (Active, RollingBack)
                | (Preparing, Committing)
                | (Preparing, RollingBack)
                | (_, Terminated)
        )
    }
}

/// One open transaction on the server.
///
/// Only ever built from a successful begin response, so both endpoints are
/// always known.
#[derive(Debug)]
pub struct CypherTransaction {
    local_identifier: String,
    endpoint: Url,
    commit_endpoint: Url,
    state: Mutex<TransactionState>,
}

impl CypherTransaction {
    pub(crate) fn new(local_identifier: impl Into<String>, endpoint: Url, commit_endpoint: Url) -> Self {
        Self {
            local_identifier: local_identifier.into(),
            endpoint,
            commit_endpoint,
            state: Mutex::new(TransactionState::Active),
        }
    }

    /// Identifier of the scope this transaction is enlisted in
    pub fn local_identifier(&self) -> &str {
        &self.local_identifier
    }

    /// Where further statements (and the rollback) are sent
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn commit_endpoint(&self) -> &Url {
        &self.commit_endpoint
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn transition(&self, next: TransactionState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(ClientError::TransactionState(format!(
                "transaction {} cannot move from {:?} to {:?}",
                self.local_identifier, *state, next
            )));
        }
        tracing::debug!(
            "Transaction {}: {:?} -> {:?}",
            self.local_identifier,
            *state,
            next
        );
        *state = next;
        Ok(())
    }
}

/// Open remote transactions keyed by scope identifier.
///
/// Sharded, so unrelated scopes never contend on one lock. Each client owns
/// its own registry.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    transactions: DashMap<String, Arc<CypherTransaction>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup; the returned handle is detached from the map's shard lock
    pub fn get(&self, local_identifier: &str) -> Option<Arc<CypherTransaction>> {
        self.transactions
            .get(local_identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, local_identifier: &str) -> bool {
        self.transactions.contains_key(local_identifier)
    }

    /// Insert unless a transaction is already registered for the identifier
    pub(crate) fn try_add(&self, transaction: Arc<CypherTransaction>) -> bool {
        match self
            .transactions
            .entry(transaction.local_identifier().to_string())
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(transaction);
                true
            }
        }
    }

    pub(crate) fn remove(&self, local_identifier: &str) -> Option<Arc<CypherTransaction>> {
        self.transactions.remove(local_identifier).map(|(_, tx)| tx)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
