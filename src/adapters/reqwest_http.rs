//! Reqwest-based HTTP client adapter.
//!
//! This module provides the production HTTP client implementation using
//! reqwest, implementing the [`HttpClient`] trait from `crate::traits`.

use async_trait::async_trait;
use std::time::Duration;

use crate::traits::{Headers, HttpClient, HttpError, Method, Response};

/// HTTP client implementation using reqwest.
///
/// # Example
///
/// ```ignore
/// use chatgate::adapters::ReqwestHttpClient;
/// use chatgate::traits::{HttpClient, Headers};
///
/// let client = ReqwestHttpClient::new();
/// let response = client.get("https://chat.example.com/api/chats", &Headers::new()).await?;
/// println!("Status: {}", response.status);
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient with default settings.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Self::convert_error)?;
        Ok(Self { client })
    }

    /// Create a new ReqwestHttpClient with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying reqwest::Client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Convert reqwest error to HttpError.
    fn convert_error(err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout(err.to_string())
        } else if err.is_connect() {
            HttpError::ConnectionFailed(err.to_string())
        } else if err.is_builder() {
            HttpError::InvalidUrl(err.to_string())
        } else {
            HttpError::Other(err.to_string())
        }
    }

    /// Convert reqwest headers to our Headers type.
    fn convert_headers(headers: &reqwest::header::HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<Response, HttpError> {
        let mut builder = self.client.request(Self::to_reqwest_method(method), url);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let response = builder.send().await.map_err(Self::convert_error)?;

        let status = response.status().as_u16();
        let response_headers = Self::convert_headers(response.headers());
        let body = response.bytes().await.map_err(Self::convert_error)?;

        Ok(Response::with_headers(status, response_headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/c1"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"c1"}"#))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new();
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());

        let response = client
            .get(&format!("{}/api/chats/c1", server.uri()), &headers)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text().unwrap(), r#"{"id":"c1"}"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/chats/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"code":"chat_not_found"}"#))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new();
        let response = client
            .send(
                Method::Delete,
                &format!("{}/api/chats/missing", server.uri()),
                None,
                &Headers::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_patch_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/chats/c1"))
            .and(body_string(r#"{"title":"renamed"}"#))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = ReqwestHttpClient::new();
        let response = client
            .send(
                Method::Patch,
                &format!("{}/api/chats/c1", server.uri()),
                Some(r#"{"title":"renamed"}"#),
                &Headers::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_transport_error() {
        let client = ReqwestHttpClient::new();
        let result = client.get("http://127.0.0.1:9/unreachable", &Headers::new()).await;
        assert!(result.is_err());
    }
}
