//! Error types.
//!
//! Provider errors never cross the dispatcher boundary as `Err`; adapters
//! fold them into a failed [`ProviderResult`](crate::models::ProviderResult).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected before dispatch starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Per-provider timeout elapsed or the request was cancelled
    #[error("timeout")]
    Timeout,

    /// Network failure or non-2xx response
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Timeout => ProviderErrorKind::Timeout,
            Self::Transport(_) => ProviderErrorKind::Transport,
            Self::Parse(_) => ProviderErrorKind::Parse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderErrorKind {
    Timeout,
    Transport,
    Parse,
}

/// A single grounding chunk whose destination domain could not be resolved.
/// Only the citation is dropped; the provider result stays successful.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not resolve a destination domain for chunk {index} ({uri})")]
pub struct CitationUnresolvableError {
    pub index: usize,
    pub uri: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode analysis document: {0}")]
    Encode(#[from] serde_json::Error),
}
