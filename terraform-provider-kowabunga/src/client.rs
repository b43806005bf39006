//! Kowabunga API Client for Terraform Provider

use kowabunga_common::Kind;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Header carrying the API token
pub const TOKEN_HEADER: &str = "x-token";

/// Path prefix of every API endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API token contains characters not allowed in an HTTP header")]
    InvalidToken,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Kowabunga API Client
#[derive(Clone)]
pub struct KowabungaClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl KowabungaClient {
    /// Create a new client for the platform at `uri`
    pub fn new(uri: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}{}", uri.trim_end_matches('/'), API_PREFIX),
            token: None,
        })
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build headers for requests
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(token).map_err(|_| ClientError::InvalidToken)?;
            headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
        }

        Ok(headers)
    }

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        Self::handle_response(path, response).await
    }

    /// POST request with optional query parameters
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        query: &[(String, String)],
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .query(query)
            .json(body)
            .send()
            .await?;

        Self::handle_response(path, response).await
    }

    /// PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .put(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        Self::handle_response(path, response).await
    }

    /// DELETE request
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        Self::check_status(path, response).await.map(|_| ())
    }

    /// IDs of every object of a kind
    pub async fn list(&self, kind: Kind) -> Result<Vec<String>> {
        self.get(&kind.list_path()).await
    }

    /// Map non-success statuses onto errors
    async fn check_status(path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(ClientError::Unauthorized)
        } else if status.as_u16() == 404 {
            Err(ClientError::NotFound(path.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Handle API response
    async fn handle_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let body = Self::check_status(path, response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = KowabungaClient::new("https://kowabunga.example.com/").unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url(), "https://kowabunga.example.com/api/v1");
    }

    #[test]
    fn test_client_with_token() {
        let client = KowabungaClient::new("https://kowabunga.example.com")
            .unwrap()
            .with_token("test-token");
        assert_eq!(client.token, Some("test-token".to_string()));

        let headers = client.headers().unwrap();
        assert_eq!(headers.get(TOKEN_HEADER).unwrap(), "test-token");
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let client = KowabungaClient::new("https://kowabunga.example.com")
            .unwrap()
            .with_token("bad\ntoken");
        assert!(matches!(client.headers(), Err(ClientError::InvalidToken)));
    }
}
