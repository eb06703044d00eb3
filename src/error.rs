// src/error.rs

//! Error types shared by the codec, fetcher, backup store and pipelines
//!
//! Every failure maps onto a small closed set of [`OutcomeCode`]s (the
//! process exit code) and a stable detail code that front ends translate
//! through [`localize`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Library error
#[derive(Error, Debug)]
pub enum Error {
    /// Container header could not be parsed
    #[error("container format error: {0}")]
    FormatError(String),

    /// A single entry could not be extracted; normally recorded, not raised
    #[error("entry {path} could not be extracted: {reason}")]
    PartialEntryLoss { path: String, reason: String },

    /// Every mirror failed for a resource
    #[error("failed to download {resource} from all {attempts} mirrors")]
    AcquisitionExhausted { resource: String, attempts: usize },

    /// File still locked after the bounded retry loop
    #[error("{} is still locked after {attempts} attempts", path.display())]
    FileLocked { path: PathBuf, attempts: u32 },

    /// Operation requires elevated privilege
    #[error("requires elevated privilege: {0}")]
    PermissionDenied(String),

    /// Backup archive failed verification
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailure(String),

    /// Cancelled by the user; a control signal, not a failure
    #[error("operation cancelled")]
    Cancelled,

    /// Target installation directory could not be located
    #[error("target installation not found: {0}")]
    TargetNotFound(String),

    /// Companion payload archive could not be unpacked
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Invalid caller-supplied options
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Another install or uninstall session is active
    #[error("another operation is already in progress")]
    SessionBusy,

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("download error: {0}")]
    DownloadError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("initialization error: {0}")]
    InitError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            _ => Error::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => e.into(),
            other => Error::IntegrityCheckFailure(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(e) => e.into(),
            None => Error::IoError("filesystem loop detected".to_string()),
        }
    }
}

/// Closed set of operation outcomes, doubling as process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[repr(i32)]
pub enum OutcomeCode {
    Success = 0,
    GeneralFailure = 1,
    InsufficientPrivilege = 2,
    TargetNotFound = 3,
    DownloadFailed = 4,
    ExtractionFailed = 5,
    FilesystemFailure = 6,
    InvalidArguments = 7,
}

impl OutcomeCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Error {
    /// Exit code for this error
    pub fn outcome(&self) -> OutcomeCode {
        match self {
            Error::PermissionDenied(_) => OutcomeCode::InsufficientPrivilege,
            Error::TargetNotFound(_) => OutcomeCode::TargetNotFound,
            Error::AcquisitionExhausted { .. } | Error::DownloadError(_) => {
                OutcomeCode::DownloadFailed
            }
            Error::ExtractionFailed(_) | Error::FormatError(_) | Error::PartialEntryLoss { .. } => {
                OutcomeCode::ExtractionFailed
            }
            Error::FileLocked { .. }
            | Error::IoError(_)
            | Error::PathTraversal(_)
            | Error::InvalidPath(_)
            | Error::NotFoundError(_) => OutcomeCode::FilesystemFailure,
            Error::InvalidArguments(_) => OutcomeCode::InvalidArguments,
            Error::IntegrityCheckFailure(_)
            | Error::Cancelled
            | Error::SessionBusy
            | Error::ParseError(_)
            | Error::InitError(_) => OutcomeCode::GeneralFailure,
        }
    }

    /// Stable detail code front ends translate into a localized message
    pub fn detail_code(&self) -> &'static str {
        match self {
            Error::FormatError(_) => "CONTAINER_FORMAT",
            Error::PartialEntryLoss { .. } => "PARTIAL_ENTRY_LOSS",
            Error::AcquisitionExhausted { .. } => "DOWNLOAD_EXHAUSTED",
            Error::FileLocked { .. } => "FILE_LOCKED",
            Error::PermissionDenied(_) => "PERMISSION_DENIED",
            Error::IntegrityCheckFailure(_) => "BACKUP_INTEGRITY",
            Error::Cancelled => "OPERATION_CANCELLED",
            Error::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Error::ExtractionFailed(_) => "EXTRACTION_FAILED",
            Error::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Error::SessionBusy => "SESSION_BUSY",
            Error::NotFoundError(_) => "OLD_ASAR_ENOENT",
            Error::DownloadError(_) => "DOWNLOAD_FAILED",
            Error::IoError(_) | Error::PathTraversal(_) | Error::InvalidPath(_) => {
                "FILESYSTEM_FAILURE"
            }
            Error::ParseError(_) | Error::InitError(_) => "GENERAL_FAILURE",
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.outcome().as_i32()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Known detail codes and their user-facing text
const DETAIL_MESSAGES: &[(&str, &str)] = &[
    ("CONTAINER_FORMAT", "The application package is damaged or in an unknown format."),
    ("DOWNLOAD_EXHAUSTED", "Download failed from every mirror. Check your network connection."),
    ("DOWNLOAD_FAILED", "Download failed. Check your network connection."),
    ("FILE_LOCKED", "The application file is still in use. Close the target application and retry."),
    ("PERMISSION_DENIED", "Administrator privileges are required."),
    ("BACKUP_INTEGRITY", "The backup archive is damaged and cannot be restored."),
    ("OPERATION_CANCELLED", "The operation was cancelled."),
    ("TARGET_NOT_FOUND", "The target application installation could not be found."),
    ("EXTRACTION_FAILED", "The downloaded payload could not be unpacked."),
    ("INVALID_ARGUMENTS", "Invalid arguments."),
    ("SESSION_BUSY", "Another install or uninstall is already running."),
    ("OLD_ASAR_ENOENT", "The original application package was not found in the target directory."),
];

/// Map a detail code to its message, falling back to the raw text
pub fn localize<'a>(detail_code: &str, raw: &'a str) -> std::borrow::Cow<'a, str> {
    DETAIL_MESSAGES
        .iter()
        .find(|(code, _)| *code == detail_code)
        .map(|(_, msg)| std::borrow::Cow::Borrowed(*msg))
        .unwrap_or(std::borrow::Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(err.outcome(), OutcomeCode::InsufficientPrivilege);
        assert_eq!(err.outcome().as_i32(), 2);
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(Error::TargetNotFound("x".into()).outcome().as_i32(), 3);
        let exhausted = Error::AcquisitionExhausted {
            resource: "aura.zip".into(),
            attempts: 3,
        };
        assert_eq!(exhausted.outcome().as_i32(), 4);
        assert_eq!(Error::ExtractionFailed("x".into()).outcome().as_i32(), 5);
        let locked = Error::FileLocked {
            path: PathBuf::from("app.asar"),
            attempts: 5,
        };
        assert_eq!(locked.outcome().as_i32(), 6);
        assert_eq!(Error::InvalidArguments("x".into()).outcome().as_i32(), 7);
    }

    #[test]
    fn test_localize_known_and_unknown() {
        assert_eq!(
            localize("SESSION_BUSY", "raw"),
            "Another install or uninstall is already running."
        );
        assert_eq!(localize("SOMETHING_NEW", "raw text"), "raw text");
    }
}
