//! Authenticated JSON client for Google REST APIs

use crate::auth::TokenProvider;
use crate::error::{GoogleError, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";
pub const CONTAINER_API_BASE: &str = "https://container.googleapis.com/v1";

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Extract a readable message from an error body, falling back to the raw text
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) if !envelope.error.message.is_empty() => {
                format!("{} ({})", envelope.error.message, status)
            }
            _ if !envelope.error.message.is_empty() => envelope.error.message,
            _ => body.trim().to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

fn is_already_exists(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already exists") || message.contains("already_exists")
}

/// Map a non-success HTTP status to an error about `resource`
pub(crate) fn status_error(status: StatusCode, resource: &str, body: &str) -> GoogleError {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => GoogleError::NotFound(resource.to_string()),
        // 409 also covers "resource in use" and concurrent operations
        StatusCode::CONFLICT if is_already_exists(&message) => {
            GoogleError::AlreadyExists(format!("{}: {}", resource, message))
        }
        StatusCode::PRECONDITION_FAILED => GoogleError::PreconditionFailed {
            resource: resource.to_string(),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GoogleError::PermissionDenied {
            status: status.as_u16(),
            message,
        },
        // Compute Engine reports fingerprint mismatches as 400 with this reason
        StatusCode::BAD_REQUEST if message.to_ascii_lowercase().contains("fingerprint") => {
            GoogleError::PreconditionFailed {
                resource: resource.to_string(),
                message,
            }
        }
        _ => GoogleError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Thin wrapper over `reqwest::Client` adding bearer auth and error mapping
pub struct GoogleClient {
    http: reqwest::Client,
    tokens: TokenProvider,
}

impl GoogleClient {
    pub fn new(tokens: TokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Build an authorized request; query pairs are form-encoded by reqwest
    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: &str,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        tracing::debug!("{} {} {:?}", method, url, query);
        let token = self.tokens.token().await?;
        let response = self
            .request(method, url, query, body, &token)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        Ok((status, text))
    }

    /// GET a resource, `None` on 404
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
    ) -> Result<Option<T>> {
        self.get_optional_with_query(url, &[], resource).await
    }

    pub async fn get_optional_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<Option<T>> {
        let (status, text) = self.send(Method::GET, url, query, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status, resource, &text));
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T> {
        self.get_with_query(url, &[], resource).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        resource: &str,
    ) -> Result<T> {
        self.get_optional_with_query(url, query, resource)
            .await?
            .ok_or_else(|| GoogleError::NotFound(resource.to_string()))
    }

    /// Issue a mutation and decode the returned operation
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<T> {
        self.call_with_query(method, url, &[], body, resource).await
    }

    pub async fn call_with_query<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        resource: &str,
    ) -> Result<T> {
        let (status, text) = self.send(method, url, query, body).await?;
        if !status.is_success() {
            tracing::error!("{} failed: {} {}", resource, status, error_message(&text));
            return Err(status_error(status, resource, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}
