use std::path::PathBuf;

use thiserror::Error;

use crate::message::CorrelationId;
use crate::timeline::EntryKey;

/// Recoverable ingestion failures. The owning loop logs and drops these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestionError {
    #[error("{message} for unknown correlation id {id}")]
    UnknownCorrelation {
        id: CorrelationId,
        message: &'static str,
    },
    #[error("{message} reuses correlation id {id}")]
    DuplicateCorrelation {
        id: CorrelationId,
        message: &'static str,
    },
    #[error("{message} for entry {id} which is no longer running")]
    NotRunning {
        id: CorrelationId,
        message: &'static str,
    },
    #[error("stream delta addressed to a torn-down entry {0:?}")]
    StaleHandle(EntryKey),
    #[error("malformed {message}: {reason}")]
    Malformed {
        message: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ForkError {
    #[error("cannot fork an empty timeline")]
    EmptyTimeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvictionViolation {
    #[error("entry {0:?} does not exist")]
    Missing(EntryKey),
    #[error("entry {0:?} is still active")]
    Active(EntryKey),
    #[error("entry {0:?} is discarded by the current fork")]
    Discarded(EntryKey),
    #[error("history is pinned while a fork is in progress")]
    ForkPinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream target is gone")]
pub struct StreamClosed;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
