//! Pre-issued access tokens
//!
//! Credentials are never managed here. A token either comes from the
//! environment (`GCP_ACCESS_TOKEN`) or from `gcloud auth print-access-token`.

use crate::error::{GoogleError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

pub const ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";

/// gcloud tokens live for an hour; refresh well before that
const GCLOUD_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Where bearer tokens come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Static(String),
    Gcloud,
}

impl TokenSource {
    /// `GCP_ACCESS_TOKEN` when set and non-empty, otherwise the gcloud CLI
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => TokenSource::Static(token.trim().to_string()),
            _ => TokenSource::Gcloud,
        }
    }
}

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Hands out bearer tokens, caching the gcloud one
pub struct TokenProvider {
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    pub async fn token(&self) -> Result<String> {
        match &self.source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Gcloud => {
                let mut cached = self.cached.lock().await;
                if let Some(token) = cached
                    .as_ref()
                    .filter(|t| t.fetched_at.elapsed() < GCLOUD_TOKEN_TTL)
                {
                    return Ok(token.value.clone());
                }
                let value = gcloud_token().await?;
                *cached = Some(CachedToken {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(value)
            }
        }
    }

    /// Forget the cached token (after a 401)
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

async fn gcloud_token() -> Result<String> {
    tracing::debug!("Running: gcloud auth print-access-token");

    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GoogleError::GcloudNotFound,
            _ => GoogleError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GoogleError::TokenUnavailable(stderr.trim().to_string()));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(GoogleError::TokenUnavailable(
            "gcloud returned an empty token".to_string(),
        ));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let provider = TokenProvider::new(TokenSource::Static("ya29.test".to_string()));
        assert_eq!(provider.token().await.unwrap(), "ya29.test");
    }
}
