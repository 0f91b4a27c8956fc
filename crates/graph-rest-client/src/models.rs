//! Data models for the graph REST API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

pub use serde_json::Value;

/// Bound statement parameters
pub type Parameters = HashMap<String, Value>;

/// One unit of Cypher text plus its bound parameters.
///
/// Statements are produced by a query builder (or by hand) and are never
/// modified by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    parameters: Parameters,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameters(text: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            text: text.into(),
            parameters,
        }
    }

    /// Bind a parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}

/// Rows returned by one statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows, one value per column
    pub rows: Vec<Vec<Value>>,
}

impl StatementResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Service root document returned by `GET <base>`
#[derive(Debug, Clone, Deserialize)]
pub struct RootApiResponse {
    /// Single statement endpoint
    pub cypher: String,
    /// Transactional endpoint (absent before server 2.0)
    #[serde(default)]
    pub transaction: Option<String>,
    /// Server version
    #[serde(default)]
    pub neo4j_version: Option<String>,
}

/// Root endpoints resolved against the base URL
#[derive(Debug, Clone)]
pub(crate) struct RootEndpoints {
    pub cypher: Url,
    pub transaction: Option<Url>,
    pub version: Option<String>,
}

impl RootEndpoints {
    pub(crate) fn resolve(base_url: &Url, root: RootApiResponse) -> Result<Self, url::ParseError> {
        Ok(Self {
            cypher: base_url.join(&root.cypher)?,
            transaction: root
                .transaction
                .as_deref()
                .map(|t| base_url.join(t))
                .transpose()?,
            version: root.neo4j_version,
        })
    }
}

/// Body of the single statement endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CypherApiQuery<'a> {
    pub query: &'a str,
    pub params: &'a Parameters,
}

impl<'a> CypherApiQuery<'a> {
    pub fn new(statement: &'a Statement) -> Self {
        Self {
            query: statement.text(),
            params: statement.parameters(),
        }
    }
}

/// Response of the single statement endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CypherApiResponse {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

impl From<CypherApiResponse> for StatementResult {
    fn from(response: CypherApiResponse) -> Self {
        Self {
            columns: response.columns,
            rows: response.data,
        }
    }
}

/// Body of the transactional endpoints
#[derive(Debug, Clone, Default, Serialize)]
pub struct CypherTransactionApiQuery<'a> {
    pub statements: Vec<CypherTransactionStatement<'a>>,
}

/// One entry of the `statements` array
#[derive(Debug, Clone, Serialize)]
pub struct CypherTransactionStatement<'a> {
    pub statement: &'a str,
    pub parameters: &'a Parameters,
    #[serde(rename = "resultDataContents")]
    pub result_data_contents: &'static [&'static str],
}

impl<'a> CypherTransactionApiQuery<'a> {
    /// Batch holding a single statement
    pub fn new(statement: &'a Statement) -> Self {
        Self {
            statements: vec![CypherTransactionStatement {
                statement: statement.text(),
                parameters: statement.parameters(),
                result_data_contents: &["REST"],
            }],
        }
    }

    /// Empty batch, used to commit
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Response of every transactional endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CypherTransactionApiResponse {
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub results: Vec<TransactionResultSet>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

/// Result of one statement inside a transactional response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionResultSet {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<TransactionRow>,
}

/// One row, in whichever format the server sent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRow {
    #[serde(default)]
    pub rest: Option<Vec<Value>>,
    #[serde(default)]
    pub row: Option<Vec<Value>>,
}

impl From<TransactionResultSet> for StatementResult {
    fn from(set: TransactionResultSet) -> Self {
        Self {
            columns: set.columns,
            rows: set
                .data
                .into_iter()
                .map(|r| r.rest.or(r.row).unwrap_or_default())
                .collect(),
        }
    }
}

/// Statement error reported inside a response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Servers have sent error codes both as `42001` and `"42001"`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected error code string or number, got {}",
            other
        ))),
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the REST API
    pub base_url: String,
    /// Username for basic authentication (optional)
    pub username: Option<String>,
    /// Password for basic authentication (optional)
    pub password: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7474/db/data/".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
            user_agent: concat!("graph-rest-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `GRAPH_REST_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("GRAPH_REST_URL") {
            config.base_url = url;
        }
        if let Ok(username) = std::env::var("GRAPH_REST_USERNAME") {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var("GRAPH_REST_PASSWORD") {
            config.password = Some(password);
        }
        if let Ok(timeout) = std::env::var("GRAPH_REST_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => config.timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid GRAPH_REST_TIMEOUT_SECS: {}", timeout),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_query_shape() {
        let statement = Statement::new("MATCH (n) RETURN n").param("id", 5);
        let body = serde_json::to_value(CypherTransactionApiQuery::new(&statement)).unwrap();
        assert_eq!(
            body,
            json!({
                "statements": [{
                    "statement": "MATCH (n) RETURN n",
                    "parameters": {"id": 5},
                    "resultDataContents": ["REST"]
                }]
            })
        );
    }

    #[test]
    fn test_commit_query_is_empty_batch() {
        let body = serde_json::to_value(CypherTransactionApiQuery::empty()).unwrap();
        assert_eq!(body, json!({"statements": []}));
    }

    #[test]
    fn test_cypher_query_shape() {
        let statement = Statement::new("RETURN $x").param("x", "y");
        let body = serde_json::to_value(CypherApiQuery::new(&statement)).unwrap();
        assert_eq!(body, json!({"query": "RETURN $x", "params": {"x": "y"}}));
    }

    #[test]
    fn test_transaction_response_defaults() {
        let response: CypherTransactionApiResponse =
            serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(response.commit.is_none());
        assert!(response.errors.is_empty());
    }

    #[test]
    fn test_result_set_prefers_rest_rows() {
        let set: TransactionResultSet = serde_json::from_value(json!({
            "columns": ["a"],
            "data": [{"rest": [1]}, {"row": [2]}]
        }))
        .unwrap();
        let result = StatementResult::from(set);
        assert_eq!(result.rows, vec![vec![json!(1)], vec![json!(2)]]);
    }

    #[test]
    fn test_root_endpoints_resolve_relative() {
        let base = Url::parse("http://foo/db/data/").unwrap();
        let root: RootApiResponse = serde_json::from_value(json!({
            "cypher": "cypher",
            "transaction": "http://foo/db/data/transaction",
            "neo4j_version": "2.0.0"
        }))
        .unwrap();
        let endpoints = RootEndpoints::resolve(&base, root).unwrap();
        assert_eq!(endpoints.cypher.as_str(), "http://foo/db/data/cypher");
        assert_eq!(
            endpoints.transaction.unwrap().as_str(),
            "http://foo/db/data/transaction"
        );
    }

    #[test]
    fn test_error_record_numeric_code() {
        let record: ErrorRecord = serde_json::from_value(json!({
            "code": 42001,
            "status": "STATEMENT_SYNTAX_ERROR",
            "message": "Something broke"
        }))
        .unwrap();
        assert_eq!(record.code, "42001");

        let record: ErrorRecord =
            serde_json::from_value(json!({"code": "Neo.ClientError.Statement.SyntaxError"}))
                .unwrap();
        assert_eq!(record.code, "Neo.ClientError.Statement.SyntaxError");
        assert!(record.message.is_empty());
    }

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.username.is_none());
    }
}
