//! Ambient transaction scopes
//!
//! A [`TransactionScope`] stands in for an ambient transaction: it carries a
//! stable local identifier, collects enlisted participants and, when finished,
//! drives them through prepare/commit or rollback exactly once.
//!
//! ```no_run
//! # use graph_rest_client::{CypherClient, Statement, TransactionScope};
//! # #[tokio::main]
//! # async fn main() -> Result<(), graph_rest_client::ClientError> {
//! # let client = CypherClient::new("http://localhost:7474/db/data/")?;
//! # client.connect().await?;
//! let scope = TransactionScope::new();
//! client.execute(&Statement::new("CREATE (n:Person)"), Some(&scope)).await?;
//! client.execute(&Statement::new("CREATE (n:Pet)"), Some(&scope)).await?;
//! scope.complete();
//! scope.finish().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;

/// Outcome of the prepare phase for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Ready to commit
    Prepared,
    /// The whole transaction must roll back
    ForceRollback,
}

/// A resource enlisted in a [`TransactionScope`].
///
/// The scope calls `prepare` and then exactly one of `commit`, `rollback` or
/// `in_doubt` when it finishes.
#[async_trait]
pub trait EnlistmentNotification: Send + Sync {
    async fn prepare(&self) -> Vote;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// The outcome of the transaction could not be determined
    async fn in_doubt(&self);
}

/// An explicit ambient transaction.
pub struct TransactionScope {
    local_identifier: String,
    participants: Mutex<Vec<Arc<dyn EnlistmentNotification>>>,
    completed: AtomicBool,
    finished: AtomicBool,
    /// Held by the executor while a statement of this scope is in flight
    statement_gate: tokio::sync::Mutex<()>,
    /// Runtime the participants were enlisted on, used to roll back on drop
    runtime: Mutex<Option<Handle>>,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("local_identifier", &self.local_identifier)
            .field("participants", &self.participants.lock().len())
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl Default for TransactionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::with_identifier(uuid::Uuid::new_v4().to_string())
    }

    /// Scope with a caller-chosen identifier, e.g. one propagated from an
    /// outer transaction manager
    pub fn with_identifier(local_identifier: impl Into<String>) -> Self {
        Self {
            local_identifier: local_identifier.into(),
            participants: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            statement_gate: tokio::sync::Mutex::new(()),
            runtime: Mutex::new(None),
        }
    }

    pub fn local_identifier(&self) -> &str {
        &self.local_identifier
    }

    /// Register a participant for the completion protocol
    pub fn enlist(&self, participant: Arc<dyn EnlistmentNotification>) {
        tracing::debug!("Enlisted participant in transaction {}", self.local_identifier);
        if let Ok(handle) = Handle::try_current() {
            self.runtime.lock().get_or_insert(handle);
        }
        self.participants.lock().push(participant);
    }

    pub fn enlistment_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Vote to commit when the scope finishes
    pub fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) async fn lock_statements(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.statement_gate.lock().await
    }

    /// End the scope: commit if [`complete`](Self::complete) was called,
    /// otherwise roll back.
    ///
    /// Every participant is notified even when an earlier one fails; the
    /// first failure is returned afterwards.
    pub async fn finish(self) -> Result<()> {
        let participants = self.take_participants();
        if participants.is_empty() {
            return Ok(());
        }

        if self.is_completed() {
            for participant in &participants {
                if participant.prepare().await == Vote::ForceRollback {
                    tracing::warn!(
                        "Participant voted to roll back transaction {}",
                        self.local_identifier
                    );
                    rollback_all(&participants).await?;
                    return Err(ClientError::TransactionState(format!(
                        "transaction {} was rolled back by a participant",
                        self.local_identifier
                    )));
                }
            }
            commit_all(&self.local_identifier, &participants).await
        } else {
            tracing::debug!(
                "Transaction {} finished without completing, rolling back",
                self.local_identifier
            );
            rollback_all(&participants).await
        }
    }

    fn take_participants(&self) -> Vec<Arc<dyn EnlistmentNotification>> {
        self.finished.store(true, Ordering::SeqCst);
        std::mem::take(&mut *self.participants.lock())
    }
}

async fn commit_all(
    local_identifier: &str,
    participants: &[Arc<dyn EnlistmentNotification>],
) -> Result<()> {
    let mut failure = None;
    for participant in participants {
        if failure.is_some() {
            participant.in_doubt().await;
            continue;
        }
        if let Err(e) = participant.commit().await {
            tracing::error!("Commit of transaction {} failed: {}", local_identifier, e);
            failure = Some(e);
        }
    }
    failure.map_or(Ok(()), Err)
}

async fn rollback_all(participants: &[Arc<dyn EnlistmentNotification>]) -> Result<()> {
    let mut failure = None;
    for participant in participants {
        if let Err(e) = participant.rollback().await {
            tracing::error!("Rollback failed: {}", e);
            failure.get_or_insert(e);
        }
    }
    failure.map_or(Ok(()), Err)
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let participants = self.take_participants();
        if participants.is_empty() {
            return;
        }

        let enlisted_on = self.runtime.lock().take();
        match (Handle::try_current(), enlisted_on) {
            // Inside a runtime we cannot block, so the rollback runs as a task
            (Ok(current), enlisted_on) => {
                tracing::warn!(
                    "Transaction {} dropped without finish(), rolling back",
                    self.local_identifier
                );
                enlisted_on.unwrap_or(current).spawn(async move {
                    let _ = rollback_all(&participants).await;
                });
            }
            (Err(_), Some(handle)) => {
                tracing::warn!(
                    "Transaction {} dropped without finish(), rolling back",
                    self.local_identifier
                );
                let _ = handle.block_on(rollback_all(&participants));
            }
            (Err(_), None) => tracing::warn!(
                "Transaction {} dropped without finish() outside a runtime; {} participant(s) were not rolled back",
                self.local_identifier,
                participants.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingParticipant {
        calls: Mutex<Vec<&'static str>>,
        fail_commit: bool,
        veto: bool,
    }

    #[async_trait]
    impl EnlistmentNotification for RecordingParticipant {
        async fn prepare(&self) -> Vote {
            self.calls.lock().push("prepare");
            if self.veto {
                Vote::ForceRollback
            } else {
                Vote::Prepared
            }
        }

        async fn commit(&self) -> Result<()> {
            self.calls.lock().push("commit");
            if self.fail_commit {
                Err(ClientError::TransactionState("boom".to_string()))
            } else {
                Ok(())
            }
        }

        async fn rollback(&self) -> Result<()> {
            self.calls.lock().push("rollback");
            Ok(())
        }

        async fn in_doubt(&self) {
            self.calls.lock().push("in_doubt");
        }
    }

    #[test]
    fn test_scope_identifiers_are_unique() {
        let a = TransactionScope::new();
        let b = TransactionScope::new();
        assert_ne!(a.local_identifier(), b.local_identifier());
        assert_eq!(
            TransactionScope::with_identifier("tx-1").local_identifier(),
            "tx-1"
        );
    }

    #[tokio::test]
    async fn test_completed_scope_prepares_then_commits() {
        let participant = Arc::new(RecordingParticipant::default());
        let scope = TransactionScope::new();
        scope.enlist(participant.clone());
        scope.complete();
        scope.finish().await.unwrap();
        assert_eq!(*participant.calls.lock(), vec!["prepare", "commit"]);
    }

    #[tokio::test]
    async fn test_incomplete_scope_rolls_back() {
        let participant = Arc::new(RecordingParticipant::default());
        let scope = TransactionScope::new();
        scope.enlist(participant.clone());
        scope.finish().await.unwrap();
        assert_eq!(*participant.calls.lock(), vec!["rollback"]);
    }

    #[tokio::test]
    async fn test_veto_rolls_back_everyone() {
        let first = Arc::new(RecordingParticipant::default());
        let second = Arc::new(RecordingParticipant {
            veto: true,
            ..Default::default()
        });
        let scope = TransactionScope::new();
        scope.enlist(first.clone());
        scope.enlist(second.clone());
        scope.complete();

        assert!(scope.finish().await.is_err());
        assert_eq!(*first.calls.lock(), vec!["prepare", "rollback"]);
        assert_eq!(*second.calls.lock(), vec!["prepare", "rollback"]);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_later_participants_in_doubt() {
        let first = Arc::new(RecordingParticipant {
            fail_commit: true,
            ..Default::default()
        });
        let second = Arc::new(RecordingParticipant::default());
        let scope = TransactionScope::new();
        scope.enlist(first.clone());
        scope.enlist(second.clone());
        scope.complete();

        let err = scope.finish().await.unwrap_err();
        assert!(matches!(err, ClientError::TransactionState(_)));
        assert_eq!(*first.calls.lock(), vec!["prepare", "commit"]);
        assert_eq!(*second.calls.lock(), vec!["prepare", "in_doubt"]);
    }

    #[tokio::test]
    async fn test_dropped_scope_rolls_back_on_runtime() {
        struct Counter(Arc<AtomicUsize>);

        #[async_trait]
        impl EnlistmentNotification for Counter {
            async fn prepare(&self) -> Vote {
                Vote::Prepared
            }
            async fn commit(&self) -> Result<()> {
                Ok(())
            }
            async fn rollback(&self) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn in_doubt(&self) {}
        }

        let rollbacks = Arc::new(AtomicUsize::new(0));
        {
            let scope = TransactionScope::new();
            scope.enlist(Arc::new(Counter(rollbacks.clone())));
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_scope_rolls_back_outside_runtime() {
        struct Counter(Arc<AtomicUsize>);

        #[async_trait]
        impl EnlistmentNotification for Counter {
            async fn prepare(&self) -> Vote {
                Vote::Prepared
            }
            async fn commit(&self) -> Result<()> {
                Ok(())
            }
            async fn rollback(&self) -> Result<()> {
                tokio::task::yield_now().await;
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn in_doubt(&self) {}
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let scope = TransactionScope::new();
        runtime.block_on(async {
            scope.enlist(Arc::new(Counter(rollbacks.clone())));
        });

        drop(scope);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }
}
