//! Structured errors for the pipeline. Kept as hand-written enums with
//! manual `Display`/`Error` impls rather than a derive-macro error crate.

use std::path::PathBuf;

/// Errors that can occur while creating a remote directory (used by every
/// transport adapter before an upload).
#[derive(Debug, Clone)]
pub enum MkdirError {
    ExistsAsFile(PathBuf),
    Failed(PathBuf, String),
}

impl std::fmt::Display for MkdirError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MkdirError::ExistsAsFile(p) => {
                write!(f, "remote path already exists as a file (expected directory): {}", p.display())
            }
            MkdirError::Failed(p, msg) => {
                write!(f, "failed to create remote directory {}: {}", p.display(), msg)
            }
        }
    }
}

impl std::error::Error for MkdirError {}

/// A single non-fatal condition recorded while walking a tree or an archive.
/// Always recorded, never aborts the run.
#[derive(Debug, Clone)]
pub enum ScanError {
    Permission(String),
    Read(String, String),
    ArchiveOpen(String, String),
    ArchiveMember(String, String),
    CodecUnavailable(String, String),
    Timeout(String),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Permission(p) => write!(f, "permission denied: {p}"),
            ScanError::Read(p, msg) => write!(f, "read error at {p}: {msg}"),
            ScanError::ArchiveOpen(p, msg) => write!(f, "could not open archive {p}: {msg}"),
            ScanError::ArchiveMember(p, msg) => {
                write!(f, "could not read archive member {p}: {msg}")
            }
            ScanError::CodecUnavailable(p, msg) => {
                write!(f, "codec unavailable for {p}: {msg}")
            }
            ScanError::Timeout(p) => write!(f, "timed out scanning {p}"),
        }
    }
}

impl std::error::Error for ScanError {}

impl ScanError {
    pub fn kind(&self) -> crate::model::ScanFailureKind {
        use crate::model::ScanFailureKind as K;
        match self {
            ScanError::Permission(_) => K::Permission,
            ScanError::Read(_, _) => K::Read,
            ScanError::ArchiveOpen(_, _) | ScanError::CodecUnavailable(_, _) => K::ArchiveOpen,
            ScanError::ArchiveMember(_, _) => K::ArchiveMember,
            ScanError::Timeout(_) => K::Timeout,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ScanError::Permission(p)
            | ScanError::Read(p, _)
            | ScanError::ArchiveOpen(p, _)
            | ScanError::ArchiveMember(p, _)
            | ScanError::CodecUnavailable(p, _)
            | ScanError::Timeout(p) => p,
        }
    }
}

/// Errors surfaced by a single item moving through a queue stage.
#[derive(Debug, Clone)]
pub enum StageError {
    Unstable(String),
    NotFound(String),
    HashFailed(String, String),
    Packaging(String),
    Cancelled(String),
    Transport(TransportError),
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Unstable(p) => write!(f, "{p} did not stabilize within the retry budget"),
            StageError::NotFound(p) => write!(f, "{p} vanished while checking stability"),
            StageError::HashFailed(p, msg) => write!(f, "failed to fingerprint {p}: {msg}"),
            StageError::Packaging(msg) => write!(f, "packaging failed: {msg}"),
            StageError::Cancelled(p) => write!(f, "{p} was cancelled"),
            StageError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StageError {}

impl From<TransportError> for StageError {
    fn from(e: TransportError) -> Self {
        StageError::Transport(e)
    }
}

/// Closed set of transport error codes. Rendered protocol-qualified (e.g.
/// `SFTP_CONNECTION_ERROR`, `FTP_MKDIR_ERROR`) so a caller can tell which
/// adapter failed from the code string alone, per spec's
/// `*_CONNECTION_ERROR`/`*_DISCONNECT_ERROR`/`*_NOT_CONNECTED`/`*_MKDIR_ERROR`
/// wildcard notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorCode {
    UnsupportedProtocol,
    ConnectionError,
    DisconnectError,
    NotConnected,
    MkdirError,
    LocalFileNotFound,
    Disabled,
    Timeout,
    UnknownError,
}

impl TransportErrorCode {
    fn suffix(&self) -> &'static str {
        match self {
            TransportErrorCode::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            TransportErrorCode::ConnectionError => "CONNECTION_ERROR",
            TransportErrorCode::DisconnectError => "DISCONNECT_ERROR",
            TransportErrorCode::NotConnected => "NOT_CONNECTED",
            TransportErrorCode::MkdirError => "MKDIR_ERROR",
            TransportErrorCode::LocalFileNotFound => "LOCAL_FILE_NOT_FOUND",
            TransportErrorCode::Disabled => "DISABLED",
            TransportErrorCode::Timeout => "TIMEOUT",
            TransportErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub protocol: crate::config::Protocol,
    pub code: TransportErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(protocol: crate::config::Protocol, code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self { protocol, code, message: message.into() }
    }

    /// The protocol-qualified code string, e.g. `SFTP_CONNECTION_ERROR`.
    pub fn code_str(&self) -> String {
        format!("{}_{}", self.protocol, self.code.suffix())
    }

    /// Whether a failure of this kind is worth retrying. Local file missing,
    /// unsupported protocol and a disabled transport all fail fast instead
    /// of retrying.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self.code,
            TransportErrorCode::LocalFileNotFound
                | TransportErrorCode::UnsupportedProtocol
                | TransportErrorCode::Disabled
        )
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code_str(), self.message)
    }
}

impl std::error::Error for TransportError {}
