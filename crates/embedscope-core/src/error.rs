//! Error types for the embedscope pipeline.

use thiserror::Error;

use crate::pca::PcaError;
use crate::render::RenderError;
use crate::source::SourceError;
use crate::vector::ParseVectorError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to or querying the embedding store failed.
    #[error("Fetch failed: {0}")]
    Source(#[from] SourceError),

    /// A stored vector could not be parsed.
    #[error("Malformed embedding for {title:?}: {source}")]
    Parse {
        title: String,
        source: ParseVectorError,
    },

    /// Vectors of different lengths were found.
    #[error("Inconsistent embeddings: {0}")]
    Dimension(ParseVectorError),

    /// PCA could not be fitted.
    #[error("Reduction failed: {0}")]
    Reduce(#[from] PcaError),

    /// The figure could not be drawn or written.
    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),
}
