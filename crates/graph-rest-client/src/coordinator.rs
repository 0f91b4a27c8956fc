//! Commit and rollback of remote transactions

use crate::ambient::{EnlistmentNotification, Vote};
use crate::client::ClientCore;
use crate::error::{ClientError, Result};
use crate::models::CypherTransactionApiQuery;
use crate::transaction::{CypherTransaction, TransactionRegistry, TransactionState};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Ends remote transactions on behalf of their enlistments.
///
/// Both operations deregister the transaction once the round-trip is over,
/// even when the server reported a failure; the failure is still returned.
#[async_trait]
pub trait TransactionCoordinator: Send + Sync {
    fn active_transactions(&self) -> &TransactionRegistry;

    async fn commit_transaction(&self, transaction: &CypherTransaction) -> Result<()>;

    async fn rollback_transaction(&self, transaction: &CypherTransaction) -> Result<()>;
}

#[async_trait]
impl TransactionCoordinator for ClientCore {
    fn active_transactions(&self) -> &TransactionRegistry {
        &self.transactions
    }

    async fn commit_transaction(&self, transaction: &CypherTransaction) -> Result<()> {
        let outcome = match serde_json::to_value(CypherTransactionApiQuery::empty()) {
            Ok(body) => {
                self.send_transactional(
                    HttpRequest::post_json(transaction.commit_endpoint().clone(), body),
                    200,
                    format!("Committed transaction {}", transaction.endpoint()),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };

        self.release_transaction(transaction);
        outcome.map(|_| tracing::info!("Committed transaction {}", transaction.endpoint()))
    }

    async fn rollback_transaction(&self, transaction: &CypherTransaction) -> Result<()> {
        let outcome = self
            .send_transactional(
                HttpRequest::delete(transaction.endpoint().clone()),
                200,
                format!("Rolled back transaction {}", transaction.endpoint()),
            )
            .await;

        self.release_transaction(transaction);
        outcome.map(|_| tracing::info!("Rolled back transaction {}", transaction.endpoint()))
    }
}

impl ClientCore {
    fn release_transaction(&self, transaction: &CypherTransaction) {
        self.transactions.remove(transaction.local_identifier());
        // Terminated is reachable from every state
        let _ = transaction.transition(TransactionState::Terminated);
    }
}

/// The participant a remote transaction enlists in its scope
pub(crate) struct CypherEnlistment {
    coordinator: Weak<dyn TransactionCoordinator>,
    transaction: Arc<CypherTransaction>,
}

impl CypherEnlistment {
    pub(crate) fn new(
        coordinator: Weak<dyn TransactionCoordinator>,
        transaction: Arc<CypherTransaction>,
    ) -> Self {
        Self {
            coordinator,
            transaction,
        }
    }

    fn coordinator(&self) -> Result<Arc<dyn TransactionCoordinator>> {
        self.coordinator.upgrade().ok_or(ClientError::ClientClosed)
    }
}

#[async_trait]
impl EnlistmentNotification for CypherEnlistment {
    /// Statements are already on the server, nothing to vote against
    async fn prepare(&self) -> Vote {
        if let Err(e) = self.transaction.transition(TransactionState::Preparing) {
            tracing::warn!("{}", e);
        }
        Vote::Prepared
    }

    async fn commit(&self) -> Result<()> {
        self.transaction.transition(TransactionState::Committing)?;
        self.coordinator()?
            .commit_transaction(&self.transaction)
            .await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction.transition(TransactionState::RollingBack)?;
        self.coordinator()?
            .rollback_transaction(&self.transaction)
            .await
    }

    async fn in_doubt(&self) {
        tracing::warn!(
            "Transaction {} is in doubt; no recovery is attempted and it stays registered until it expires on the server",
            self.transaction.endpoint()
        );
    }
}
