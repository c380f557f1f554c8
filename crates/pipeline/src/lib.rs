//! Analysis pipeline: provider selection, quota failover, post-processing
//!
//! The `Analyzer` orchestrates one analysis end to end. It consults the
//! shared provider-config store to decide whether the primary provider is
//! usable, fails over to the fallback on quota exhaustion, and converts
//! every adapter failure into a well-formed error result so callers always
//! receive the full output shape.

pub mod analyzer;
pub mod config;
pub mod post;
pub mod quota;

pub use analyzer::Analyzer;
pub use config::{ProviderConfig, ProviderConfigStore};
pub use post::{ProcessedResult, process};
