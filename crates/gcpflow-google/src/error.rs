//! Google backend error types

use gcpflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoogleError {
    #[error("gcloud not found. Install the Google Cloud SDK or set GCP_ACCESS_TOKEN")]
    GcloudNotFound,

    #[error("Could not obtain an access token: {0}")]
    TokenUnavailable(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// HTTP 412, a fingerprint that no longer matches
    #[error("Precondition failed on {resource}: {message}")]
    PreconditionFailed { resource: String, message: String },

    #[error("Permission denied ({status}): {message}")]
    PermissionDenied { status: u16, message: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Google API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GoogleError> for CloudError {
    fn from(err: GoogleError) -> Self {
        match err {
            GoogleError::NotFound(what) => CloudError::NotFound(what),
            GoogleError::AlreadyExists(what) => CloudError::AlreadyExists(what),
            GoogleError::PreconditionFailed { resource, message } => {
                CloudError::conflict(resource, message)
            }
            GoogleError::GcloudNotFound
            | GoogleError::TokenUnavailable(_)
            | GoogleError::PermissionDenied { .. } => {
                CloudError::AuthenticationFailed(err.to_string())
            }
            GoogleError::Json(e) => CloudError::Json(e),
            GoogleError::Io(e) => CloudError::Io(e),
            other => CloudError::Api(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GoogleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_failed_is_conflict() {
        let err: CloudError = GoogleError::PreconditionFailed {
            resource: "instance 'web-1'".to_string(),
            message: "Labels fingerprint invalid".to_string(),
        }
        .into();
        assert!(matches!(err, CloudError::ConcurrencyConflict { .. }));
    }

    #[test]
    fn test_permission_is_authentication() {
        let err: CloudError = GoogleError::PermissionDenied {
            status: 403,
            message: "forbidden".to_string(),
        }
        .into();
        assert!(matches!(err, CloudError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_api_error() {
        let err: CloudError = GoogleError::Api {
            status: 500,
            message: "backend error".to_string(),
        }
        .into();
        assert!(matches!(err, CloudError::Api(ref m) if m.contains("500")));
    }
}
