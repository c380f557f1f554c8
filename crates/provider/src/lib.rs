//! Provider abstraction for auction-notice analysis backends
//!
//! Defines the `Provider` trait that decouples the orchestration pipeline
//! from any single AI vendor. The Gemini adapter is the primary
//! implementation; the OpenRouter adapter implements the same trait and is
//! used when the primary is exhausted or unconfigured. The orchestrator
//! only ever sees this trait plus the error taxonomy below.

pub mod extract;
pub mod prompt;
pub mod types;

pub use types::{
    AnalysisRequest, AnalysisResult, AnalysisSummary, AuctionDetails, PropertyDetails,
};

use std::future::Future;
use std::pin::Pin;

/// Errors an adapter call can surface to the orchestrator.
///
/// The orchestrator only branches on the variant: `Quota` triggers provider
/// failover, everything else terminates in a well-formed error result. A
/// quota-type failure must therefore never be reported as `Transport`
/// when the adapter saw a structured 429.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Vendor-reported rate/usage limit. Recoverable by switching provider.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// The model reply could not be parsed into the JSON + HTML segments.
    #[error("invalid response format: {0}")]
    Format(String),

    /// HTTP or protocol failure. Carries the upstream status when one was
    /// received, so the orchestrator can fall back to the substring
    /// heuristic only for statusless failures.
    #[error("upstream error: {message}")]
    Transport { status: Option<u16>, message: String },

    /// No API key configured for this adapter.
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl ProviderError {
    /// Upstream HTTP status, when the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Abstraction over one vendor's analysis API.
///
/// `analyze` sends the prompt plus the PDF payload(s) in a single request
/// and parses the free-text reply into an `AnalysisResult`. Adapters do not
/// retry; retry and failover belong to the orchestrator and the outer task
/// runner.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Provider>`).
pub trait Provider: Send + Sync {
    /// Identifier for logging and health reporting (e.g. "gemini")
    fn id(&self) -> &str;

    /// Whether a credential is configured for this adapter. The orchestrator
    /// skips an unconfigured primary without calling it.
    fn is_configured(&self) -> bool;

    /// Run one analysis call against this vendor.
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> Pin<Box<dyn Future<Output = Result<AnalysisResult>> + Send + 'a>>;
}
