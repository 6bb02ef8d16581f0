pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The embedding collaborator returned a different number of vectors
    /// than texts it was given. Never retried: continuing would misalign
    /// chunks and vectors.
    #[error("Embedding count mismatch: expected {expected} vectors, got {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("Embedding provider error: {message}")]
    Embedding { message: String },
    #[error("Generation failed: {message}")]
    Generation { message: String },
    #[error("Retrieval backend error: {message}")]
    Backend { message: String },
    #[error("Store error: {message}")]
    Store { message: String },
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }
}
