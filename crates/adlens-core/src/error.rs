//! Failure taxonomy for the retrieval core.
//!
//! Every failure kind maps to either a degraded answer or a structured
//! error at the calling layer; nothing here is allowed to reach an end
//! user as an unhandled error.

use std::time::Duration;

use thiserror::Error;

/// Failures that can interrupt a single retrieval request.
///
/// The orchestrator converts every variant into the degraded-response
/// path: an empty retrieval result plus the no-supporting-data prompt.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embedding collaborator was unavailable or returned an error.
    #[error("embedding collaborator failed: {0}")]
    Embedding(String),

    /// The caller-supplied deadline elapsed before retrieval completed.
    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while building an index generation.
///
/// Fatal for that indexing run only: the previously active generation
/// keeps serving.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    /// Two chunks carried the same id but different content. Identical
    /// content under one id is an idempotent replace, not a collision.
    #[error("chunk id collision with differing content: {chunk_id}")]
    ChunkCollision { chunk_id: String },

    /// A chunk arrived with an embedding of the wrong dimensionality.
    #[error("embedding for chunk {chunk_id} has {got} dims, index expects {expected}")]
    DimensionMismatch {
        chunk_id: String,
        got: usize,
        expected: usize,
    },
}
