//! Google Cloud backend for gcpflow
//!
//! Implements [`gcpflow_cloud::ComputeApi`] against the Compute Engine v1 and
//! GKE v1 REST APIs. Authentication is a pre-issued bearer token, either from
//! `GCP_ACCESS_TOKEN` or from `gcloud auth print-access-token`.
//!
//! Status codes are mapped onto [`gcpflow_cloud::CloudError`]:
//! 404 → `NotFound`, 409 for a duplicate → `AlreadyExists` (any other 409 is
//! an `Api` error), 412 (stale fingerprint) → `ConcurrencyConflict`,
//! 401/403 → `AuthenticationFailed`.

pub mod auth;
pub mod client;
pub mod compute;
pub mod error;
pub mod gke;
pub mod provider;

pub use auth::{ACCESS_TOKEN_ENV, TokenProvider, TokenSource};
pub use error::{GoogleError, Result};
pub use provider::GoogleCompute;
