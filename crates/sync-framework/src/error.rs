//! # Framework Errors
//!
//! This module defines the error taxonomy shared by every synchronizer and client.
//! [`SyncError`] describes why a single sync attempt failed; [`FrameworkError`] adds the
//! failures of the actor plumbing itself (closed mailbox, dropped reply channel).

use crate::entity::SourceId;

/// Why a sync attempt for one source identifier failed.
///
/// Every variant is surfaced to the dispatcher as a handler failure, which requeues the
/// delivery. None of them is retried inside the synchronizer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The inbound message is malformed or carries no usable identifier.
    #[error("invalid message: {0}")]
    Validation(String),

    /// The source row is absent, or vanished between read and write.
    #[error("{kind} {id} not found in source store")]
    NotFound { kind: &'static str, id: SourceId },

    /// A write that must affect a row affected none; the mapping invariant is broken.
    #[error("mapping inconsistency: {0}")]
    Inconsistency(String),

    /// Broker or database transport failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other statement failure (constraint violation, decoding, ...).
    #[error("database error: {0}")]
    Database(String),
}

impl SyncError {
    /// Short, stable label used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::NotFound { .. } => "not_found",
            SyncError::Inconsistency(_) => "inconsistency",
            SyncError::Connection(_) => "connection",
            SyncError::Database(_) => "database",
        }
    }
}

/// Errors that can occur between a client and its synchronizer actor.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl FrameworkError {
    /// The underlying sync failure, if the actor got far enough to produce one.
    pub fn as_sync(&self) -> Option<&SyncError> {
        match self {
            FrameworkError::Sync(e) => Some(e),
            _ => None,
        }
    }
}
