//! HTTP transport used by the client

use crate::error::Result;
use crate::models::ClientConfig;
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::LOCATION;
use reqwest::{Client, ClientBuilder, Method};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// A request the client wants sent
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn post_json(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
        }
    }

    pub fn delete(url: Url) -> Self {
        Self {
            method: Method::DELETE,
            url,
            body: None,
        }
    }
}

/// What came back from the server
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `Location` header, if any
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests to the server.
///
/// Implementations only move bytes; status checking and error translation
/// happen in the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    authorization: Option<String>,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        let authorization = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                let auth = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                Some(format!("Basic {}", auth))
            }
            _ => None,
        };

        Ok(Self {
            client,
            authorization,
        })
    }

    fn add_auth_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(auth) = &self.authorization {
            builder = builder.header("Authorization", auth);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, request.url)
            .header("Accept", "application/json; charset=UTF-8")
            .header("X-Stream", "true");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder = self.add_auth_headers(builder);

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let config = ClientConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        assert_eq!(transport.authorization.as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_no_auth_without_password() {
        let config = ClientConfig {
            username: Some("user".to_string()),
            ..Default::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();
        assert!(transport.authorization.is_none());
    }

    #[tokio::test]
    async fn test_send_reads_location_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transaction")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(201)
            .with_header("Location", "http://foo/transaction/6")
            .with_body(r#"{"errors": []}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/transaction", server.url())).unwrap();
        let response = transport
            .send(HttpRequest::post_json(url, serde_json::json!({"statements": []})))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.location.as_deref(), Some("http://foo/transaction/6"));
        assert_eq!(response.body_text(), r#"{"errors": []}"#);
    }
}
