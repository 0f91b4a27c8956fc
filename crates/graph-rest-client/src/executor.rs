//! Statement execution, inside or outside an ambient transaction

use crate::ambient::TransactionScope;
use crate::client::CypherClient;
use crate::coordinator::{CypherEnlistment, TransactionCoordinator};
use crate::error::{ClientError, Result, translate};
use crate::events::OperationCompleted;
use crate::models::*;
use crate::transaction::CypherTransaction;
use crate::transport::HttpRequest;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use std::time::Instant;
use url::Url;

impl CypherClient {
    /// Execute a statement.
    ///
    /// Without a scope the statement goes to the single statement endpoint.
    /// With a scope, the first statement opens a remote transaction that is
    /// enlisted in the scope, and later statements are appended to it in
    /// call order. A failing statement does not end the remote transaction;
    /// finishing the scope does.
    ///
    /// # Arguments
    ///
    /// * `statement` - Cypher text and its parameters
    /// * `scope` - Ambient transaction to run in, or `None` for a standalone statement
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use graph_rest_client::{CypherClient, Statement};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), graph_rest_client::ClientError> {
    /// # let client = CypherClient::new("http://localhost:7474/db/data/")?;
    /// client.connect().await?;
    /// let statement = Statement::new("MATCH (n) WHERE n.name = $name RETURN n").param("name", "Alice");
    /// let result = client.execute(&statement, None).await?;
    /// println!("Found {} rows", result.rows.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(
        &self,
        statement: &Statement,
        scope: Option<&TransactionScope>,
    ) -> Result<StatementResult> {
        let started = Instant::now();

        let outcome = match scope {
            None => self.execute_direct(statement).await,
            Some(scope) => self.execute_in_scope(statement, scope).await,
        };

        self.core.report(OperationCompleted {
            query_text: statement.text().to_string(),
            resources_returned: outcome.as_ref().map_or(0, StatementResult::len),
            time_taken: started.elapsed(),
            error: outcome.as_ref().err().map(ToString::to_string),
        });

        outcome
    }

    /// Execute a statement and deserialize each row into `T`
    ///
    /// A row with one column maps its value; wider rows map an object keyed
    /// by column name.
    ///
    /// # Arguments
    ///
    /// * `statement` - Cypher text and its parameters
    /// * `scope` - Ambient transaction to run in, or `None` for a standalone statement
    pub async fn query<T: DeserializeOwned>(
        &self,
        statement: &Statement,
        scope: Option<&TransactionScope>,
    ) -> Result<Vec<T>> {
        self.execute(statement, scope).await?.deserialize()
    }

    async fn execute_direct(&self, statement: &Statement) -> Result<StatementResult> {
        let root = self.core.root()?;
        let body = serde_json::to_value(CypherApiQuery::new(statement))?;

        let response = self
            .core
            .send_expecting(
                HttpRequest::post_json(root.cypher.clone(), body),
                200,
                format!("The query was: {}", statement.text()),
            )
            .await?;

        if response.body.is_empty() {
            return Ok(StatementResult::default());
        }
        let parsed: CypherApiResponse = serde_json::from_slice(&response.body)?;
        // A successful status can still carry statement errors
        if let Some(error) = translate(&parsed.errors) {
            return Err(error);
        }
        Ok(parsed.into())
    }

    async fn execute_in_scope(
        &self,
        statement: &Statement,
        scope: &TransactionScope,
    ) -> Result<StatementResult> {
        let root = self.core.root()?;

        // One statement per scope at a time, so the server sees call order
        let _gate = scope.lock_statements().await;

        match self.core.transactions.get(scope.local_identifier()) {
            Some(transaction) => self.execute_in_transaction(&transaction, statement).await,
            None => {
                let endpoint = root.transaction.clone().ok_or_else(|| {
                    ClientError::UnsupportedCapability(
                        "You're attempting to execute Cypher within a transaction scope, however the server you are talking to does not advertise a transactional endpoint. This is available from Neo4j 2.0 onwards.".to_string(),
                    )
                })?;
                self.begin_transaction(endpoint, statement, scope).await
            }
        }
    }

    /// Open a remote transaction with `statement` as its first statement
    async fn begin_transaction(
        &self,
        endpoint: Url,
        statement: &Statement,
        scope: &TransactionScope,
    ) -> Result<StatementResult> {
        let body = serde_json::to_value(CypherTransactionApiQuery::new(statement))?;

        // Statement errors bail out here, before anything is registered
        let (response, body) = self
            .core
            .send_transactional(
                HttpRequest::post_json(endpoint, body),
                201,
                format!("Established new transaction for query: {}", statement.text()),
            )
            .await?;

        // Without a Location there is nothing to roll back; the server expires it
        let location = response.location.as_deref().ok_or_else(|| {
            ClientError::InvalidResponse("transaction created without a Location header".to_string())
        })?;
        let endpoint = self.core.resolve(location)?;
        let commit = match body.commit.as_deref().map(|commit| self.core.resolve(commit)) {
            Some(Ok(commit)) => commit,
            Some(Err(e)) => {
                self.abandon_transaction(&endpoint).await;
                return Err(e);
            }
            None => {
                self.abandon_transaction(&endpoint).await;
                return Err(ClientError::InvalidResponse(
                    "transaction created without a commit endpoint".to_string(),
                ));
            }
        };

        let transaction = Arc::new(CypherTransaction::new(
            scope.local_identifier(),
            endpoint,
            commit,
        ));

        if !self.core.transactions.try_add(Arc::clone(&transaction)) {
            return Err(ClientError::TransactionState(format!(
                "a transaction is already registered for scope {}",
                scope.local_identifier()
            )));
        }

        let coordinator: Weak<dyn TransactionCoordinator> = Arc::downgrade(&self.core) as _;
        scope.enlist(Arc::new(CypherEnlistment::new(
            coordinator,
            Arc::clone(&transaction),
        )));

        tracing::info!(
            "Opened transaction {} for scope {}",
            transaction.endpoint(),
            scope.local_identifier()
        );

        Ok(first_result(body))
    }

    /// Roll back a transaction the server opened but that could not be registered
    async fn abandon_transaction(&self, endpoint: &Url) {
        let outcome = self
            .core
            .send_expecting(
                HttpRequest::delete(endpoint.clone()),
                200,
                format!("Abandoned unusable transaction {}", endpoint),
            )
            .await;
        if let Err(e) = outcome {
            tracing::warn!("Could not roll back transaction {}: {}", endpoint, e);
        }
    }

    /// Append `statement` to an open remote transaction
    async fn execute_in_transaction(
        &self,
        transaction: &CypherTransaction,
        statement: &Statement,
    ) -> Result<StatementResult> {
        let body = serde_json::to_value(CypherTransactionApiQuery::new(statement))?;

        let (_, body) = self
            .core
            .send_transactional(
                HttpRequest::post_json(transaction.endpoint().clone(), body),
                200,
                format!(
                    "In existing transaction {}, ran query: {}",
                    transaction.endpoint(),
                    statement.text()
                ),
            )
            .await?;

        Ok(first_result(body))
    }
}

fn first_result(body: CypherTransactionApiResponse) -> StatementResult {
    body.results
        .into_iter()
        .next()
        .map(StatementResult::from)
        .unwrap_or_default()
}
