use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Failure taxonomy of the pipeline engine.
///
/// Errors are never retried: a worker that reports one stops producing, and
/// the stream variable it feeds treats the error as fatal for its own output.
/// A surrounding [`handle`](crate::kstream::KStream::handle) may substitute a
/// replacement stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A user-supplied step, closure or effect failed.
    #[error("user step failed: {0}")]
    User(anyhow::Error),
    /// An acquire or release hook of a resource-scoped unfold failed.
    #[error("resource hook failed: {0}")]
    Resource(anyhow::Error),
    /// The stream variable on the other end is gone; this is the clean
    /// shutdown signal, not a fault.
    #[error("stream variable is closed")]
    Abandoned,
}

impl StreamError {
    pub fn user(err: impl Into<anyhow::Error>) -> Self {
        StreamError::User(err.into())
    }

    pub fn resource(err: impl Into<anyhow::Error>) -> Self {
        StreamError::Resource(err.into())
    }
}
