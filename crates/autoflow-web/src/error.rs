//! Web server errors.

/// Failures starting or running the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
