use std::{fmt, io};

use regex::Error as RegexError;
use roxmltree::Error as XmlError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use tokio::{sync::mpsc::error::SendError as TokioSendError, task::JoinError};
use zip::result::ZipError;

use crate::event::JobEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum NetdocError {
    #[error("Malformed diagram archive: {0}")]
    MalformedArchive(String),
    #[error("Diagram archive is missing required part: {0}")]
    MissingRequiredPart(String),
    #[error("{count} connector(s) could not be resolved to shapes")]
    UnresolvedConnections { count: usize },
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Processing timed out after {0} ms")]
    Timeout(u64),
    #[error("Invalid parse request: {0}")]
    InvalidRequest(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Internal processing error: {0}")]
    Internal(String),
}

/// Failure classification carried by every failed job and its completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedArchive,
    MissingRequiredPart,
    UnresolvedConnections,
    StorageUnavailable,
    Timeout,
    InvalidRequest,
    #[serde(rename = "internal_error")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedArchive => "malformed_archive",
            ErrorKind::MissingRequiredPart => "missing_required_part",
            ErrorKind::UnresolvedConnections => "unresolved_connections",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Transient kinds are retried with backoff; everything else fails the job immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::StorageUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NetdocError {
    /// Map this error onto the job failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetdocError::MalformedArchive(_) => ErrorKind::MalformedArchive,
            NetdocError::MissingRequiredPart(_) => ErrorKind::MissingRequiredPart,
            NetdocError::UnresolvedConnections { .. } => ErrorKind::UnresolvedConnections,
            NetdocError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            NetdocError::Io(_) => ErrorKind::StorageUnavailable,
            NetdocError::Timeout(_) => ErrorKind::Timeout,
            NetdocError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            // missing keys are permanent
            NetdocError::NotFound(_) => ErrorKind::InvalidRequest,
            NetdocError::Serialization(_) => ErrorKind::Internal,
            NetdocError::Config(_) => ErrorKind::Internal,
            NetdocError::InvalidTransition { .. } => ErrorKind::Internal,
            NetdocError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

impl From<ZipError> for NetdocError {
    fn from(src: ZipError) -> NetdocError {
        match src {
            ZipError::FileNotFound => {
                NetdocError::MissingRequiredPart("requested archive part not found".to_string())
            }
            ZipError::Io(err) => NetdocError::MalformedArchive(format!("zip read failed: {err}")),
            other => NetdocError::MalformedArchive(format!("{other}")),
        }
    }
}

impl From<XmlError> for NetdocError {
    fn from(src: XmlError) -> NetdocError {
        NetdocError::MalformedArchive(format!("XML parse error: {src}"))
    }
}

impl From<toml::de::Error> for NetdocError {
    fn from(src: toml::de::Error) -> NetdocError {
        NetdocError::Config(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for NetdocError {
    fn from(src: toml::ser::Error) -> NetdocError {
        NetdocError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for NetdocError {
    fn from(src: JsonError) -> NetdocError {
        NetdocError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<uuid::Error> for NetdocError {
    fn from(src: uuid::Error) -> NetdocError {
        NetdocError::Serialization(format!("UUID conversion failed: {src}"))
    }
}

impl From<RegexError> for NetdocError {
    fn from(x: RegexError) -> Self {
        NetdocError::Config(format!("Regex parse failed: {x}"))
    }
}

impl From<io::Error> for NetdocError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => NetdocError::NotFound(format!("{x}")),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                NetdocError::MalformedArchive(format!("{x}"))
            }
            _ => NetdocError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<JoinError> for NetdocError {
    fn from(x: JoinError) -> Self {
        NetdocError::Internal(format!("Diagram processing task aborted: {x}"))
    }
}

impl From<TokioSendError<JobEvent>> for NetdocError {
    fn from(x: TokioSendError<JobEvent>) -> Self {
        NetdocError::Io(format!(
            "Channel update send Error, could not transmit job event {:?}",
            x.0
        ))
    }
}
