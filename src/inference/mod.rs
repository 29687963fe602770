//! Inference collaborator
//!
//! The classifiers talk to a remote chat-completions service through
//! [`InferenceClient`]. The core treats it as an opaque remote call with a
//! timeout and bounded retry; everything model-specific stays behind this
//! module.
//!
//! ## Modules
//! - `client` - HTTP client with rate limiting, retries, token accounting
//! - `json` - robust JSON extraction from model responses

pub mod client;
pub mod json;

pub use client::{InferenceClient, InferenceError};
pub use json::extract_json;
