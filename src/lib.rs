//! Citewatch: ask several generative-answer providers the same question and
//! normalize their citation metadata into one provider-agnostic shape.
//!
//! - `providers`: one adapter per provider, each with its own normalization strategy
//! - `pipeline`: concurrent dispatch, summary, competitor scoring, domain report
//! - `canonical`: URL/domain canonicalization and text span helpers
//! - `server`: optional HTTP surface with a pluggable analysis store

pub mod canonical;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod store;

pub use config::AppConfig;
pub use error::{ProviderError, ValidationError};
pub use models::*;
