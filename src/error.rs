/// Failures talking to the remote contents API.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No access token is configured.
    #[error("no GitHub token configured; run `aquavault config set --token ...`")]
    Auth,

    /// The API answered a write with a non-success status.
    #[error("GitHub write failed: {status} {body}")]
    Write { status: u16, body: String },

    /// The API answered but the payload could not be understood.
    #[error("GitHub read failed: {0}")]
    Read(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures of the local key-value store. Logged, never surfaced to callers
/// of repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by species repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A mandatory field is missing or blank.
    #[error("missing required field: {0}")]
    Validation(&'static str),

    /// The uploaded file is not named after the species.
    #[error("image file must be named after the species: expected \"{expected}\", got \"{found}\"")]
    NamingMismatch { expected: String, found: String },

    #[error("species {0} not found")]
    NotFound(i64),

    #[error("invalid import payload: {0}")]
    ImportFormat(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub type RepoResult<T> = Result<T, RepoError>;
