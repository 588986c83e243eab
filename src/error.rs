//! Error types for the extraction pipeline.

use thiserror::Error;

/// Terminal failures of one extraction. None are retried and no partial
/// result is ever produced; the underlying message is preserved so host
/// diagnostics stay accurate.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The generated unit failed to parse or threw while running in the
    /// top-level sandbox.
    #[error("failed to evaluate generated module '{file}': {source}")]
    Evaluation {
        file: String,
        #[source]
        source: anyhow::Error,
    },

    /// The host's module-loading facility failed for one request.
    #[error("failed to load module '{request}': {source}")]
    Load {
        request: String,
        #[source]
        source: anyhow::Error,
    },

    /// A loaded module failed while being reduced to a string.
    #[error("failed to evaluate loaded module '{request}': {source}")]
    Reduction {
        request: String,
        #[source]
        source: anyhow::Error,
    },
}
