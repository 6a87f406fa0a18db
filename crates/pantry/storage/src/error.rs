use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
///
/// Every adapter call and every [`StoreFuture`](crate::StoreFuture) resolves to one of
/// these kinds on failure. Backends pick the kind closest to the boundary that failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("adapter is not connected")]
    NotConnected,

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("no result: {0}")]
    NoResult(String),

    #[error("insert failed: {0}")]
    InsertFailed(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("save failed: {0}")]
    SaveFailed(String),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("no such directory: {0}")]
    NoDirectory(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("no response: {0}")]
    NoResponse(String),

    #[error("http response {status}: {message}")]
    HttpResponse { status: u16, message: String },

    #[error("method not supported: {0}")]
    MethodNotSupported(String),

    #[error("no identifier: {0}")]
    NoIdentifier(String),

    #[error("no adapter registered for {0}")]
    NoAdapter(String),
}
