//! Blocking facade over [`crate::CypherClient`]
//!
//! Owns a small tokio runtime and drives the async client on it. Do not use
//! it from inside another async runtime.
//!
//! A [`TransactionScope`] dropped without [`CypherClient::finish`] is rolled
//! back on this runtime before the drop returns.

use crate::ambient::TransactionScope;
use crate::error::Result;
use crate::models::{ClientConfig, Statement, StatementResult};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Blocking graph REST client
#[derive(Debug, Clone)]
pub struct CypherClient {
    inner: crate::CypherClient,
    runtime: Arc<Runtime>,
}

impl CypherClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        // A worker thread keeps I/O driven when a dropped scope rolls back
        // through a runtime handle instead of `Runtime::block_on`
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| crate::ClientError::Configuration(format!("Cannot start runtime: {}", e)))?;
        Ok(Self {
            inner: crate::CypherClient::with_config(config)?,
            runtime: Arc::new(runtime),
        })
    }

    /// The async client this facade drives
    pub fn inner(&self) -> &crate::CypherClient {
        &self.inner
    }

    pub fn connect(&self) -> Result<()> {
        self.runtime.block_on(self.inner.connect())
    }

    pub fn execute(
        &self,
        statement: &Statement,
        scope: Option<&TransactionScope>,
    ) -> Result<StatementResult> {
        self.runtime.block_on(self.inner.execute(statement, scope))
    }

    pub fn query<T: DeserializeOwned>(
        &self,
        statement: &Statement,
        scope: Option<&TransactionScope>,
    ) -> Result<Vec<T>> {
        self.runtime.block_on(self.inner.query(statement, scope))
    }

    /// Commit or roll back `scope`, see [`TransactionScope::finish`]
    pub fn finish(&self, scope: TransactionScope) -> Result<()> {
        self.runtime.block_on(scope.finish())
    }

    /// Run `body` in a fresh scope; commit on `Ok`, roll back otherwise
    pub fn with_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Self, &TransactionScope) -> Result<T>,
    {
        let scope = TransactionScope::new();
        let outcome = body(self, &scope);
        if outcome.is_ok() {
            scope.complete();
        }
        let finished = self.finish(scope);

        match (outcome, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    pub fn active_transaction_count(&self) -> usize {
        self.inner.active_transaction_count()
    }
}
