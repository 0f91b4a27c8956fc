//! Graph REST client
//!
//! Executes Cypher statements against a graph database over its HTTP REST
//! API. Statements executed inside a [`TransactionScope`] share one remote
//! transaction that commits or rolls back when the scope finishes.
//!
//! # Example
//!
//! ```no_run
//! use graph_rest_client::{CypherClient, Statement, TransactionScope};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CypherClient::new("http://localhost:7474/db/data/")?;
//!     client.connect().await?;
//!
//!     let scope = TransactionScope::new();
//!     client
//!         .execute(&Statement::new("CREATE (n:Person {name: $name})").param("name", "Alice"), Some(&scope))
//!         .await?;
//!     scope.complete();
//!     scope.finish().await?;
//!     Ok(())
//! }
//! ```

pub mod ambient;
pub mod blocking;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod events;
mod executor;
pub mod models;
mod results;
pub mod transaction;
pub mod transport;

pub use ambient::{EnlistmentNotification, TransactionScope, Vote};
pub use client::CypherClient;
pub use coordinator::TransactionCoordinator;
pub use error::{AggregateServerError, ClientError, Result, ServerError};
pub use events::OperationCompleted;
pub use models::*;
pub use transaction::{CypherTransaction, TransactionRegistry, TransactionState};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
