//! The error taxonomy shared by every gitgres component.
//!
//! Every fallible operation in this crate returns [`GitgresError`]. At the
//! edges it is translated outward: into a [`git2::Error`] at the
//! [`crate::odb`] boundary (libgit2 expects its own error type from backend
//! callbacks), and into plain `error <ref> <reason>` / `fatal: ...` text at
//! the remote-helper boundary (§7 of the design).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitgresError {
    #[error("not found")]
    NotFound,

    #[error("ambiguous prefix: {0} objects match")]
    Ambiguous(usize),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("value changed: {0}")]
    ValueChanged(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid object type code {0}")]
    InvalidType(i16),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] postgres::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GitgresError>;

impl GitgresError {
    /// The protocol-level error name used by `error <ref> <name>: <reason>`
    /// lines in the remote-helper loop and by CLI `fatal:` messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Ambiguous(_) => "ambiguous",
            Self::AlreadyExists(_) => "already-exists",
            Self::ValueChanged(_) => "value-changed",
            Self::MalformedInput(_) => "malformed-input",
            Self::InvalidType(_) => "invalid-type",
            Self::StorageFailure(_) => "storage-failure",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for GitgresError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Inward direction: a `git2` call made by our own code (e.g. opening the
/// scratch repository, swapping in the custom ODB) failing with a libgit2
/// error. Distinct from the `From<GitgresError> for git2::Error` impl
/// below, which is the outward direction used inside backend callbacks.
impl From<git2::Error> for GitgresError {
    fn from(e: git2::Error) -> Self {
        match e.code() {
            git2::ErrorCode::NotFound => Self::NotFound,
            git2::ErrorCode::Ambiguous => Self::Ambiguous(0),
            git2::ErrorCode::Exists => Self::AlreadyExists(e.message().to_string()),
            git2::ErrorCode::Modified => Self::ValueChanged(e.message().to_string()),
            git2::ErrorCode::Invalid => Self::MalformedInput(e.message().to_string()),
            _ => Self::Internal(e.message().to_string()),
        }
    }
}

/// Maps a [`GitgresError`] onto the [`git2::Error`] libgit2 expects from a
/// custom odb/refdb backend callback.
///
/// Grounded on `odb_backend_sqlite.rs`'s `map_sqlite_err`, which performs the
/// same translation for a SQLite-backed `OdbBackend`.
impl From<GitgresError> for git2::Error {
    fn from(e: GitgresError) -> Self {
        let code = match &e {
            GitgresError::NotFound => git2::ErrorCode::NotFound,
            GitgresError::Ambiguous(_) => git2::ErrorCode::Ambiguous,
            GitgresError::AlreadyExists(_) => git2::ErrorCode::Exists,
            GitgresError::ValueChanged(_) => git2::ErrorCode::Modified,
            GitgresError::MalformedInput(_) | GitgresError::InvalidType(_) => {
                git2::ErrorCode::Invalid
            }
            GitgresError::StorageFailure(_) | GitgresError::Internal(_) => {
                git2::ErrorCode::GenericError
            }
        };
        git2::Error::new(code, git2::ErrorClass::Odb, e.to_string())
    }
}
