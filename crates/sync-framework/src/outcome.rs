//! # Sync Outcomes
//!
//! What a successful sync reports back to its caller.

use crate::entity::{MirrorId, SourceId};
use serde::Serialize;

/// Which branch of the upsert was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MirrorOp {
    Inserted,
    Updated,
}

/// Result of a best-effort secondary write. Recorded, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Secondary {
    /// Rows copied by the secondary write.
    Copied(u64),
    /// The secondary write failed; the primary write still committed.
    Failed(String),
}

/// Report for one committed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub kind: &'static str,
    pub source_id: SourceId,
    pub mirror_id: MirrorId,
    pub op: MirrorOp,
    pub secondary: Option<Secondary>,
}

impl SyncOutcome {
    pub fn inserted(kind: &'static str, source_id: SourceId, mirror_id: MirrorId) -> Self {
        Self {
            kind,
            source_id,
            mirror_id,
            op: MirrorOp::Inserted,
            secondary: None,
        }
    }

    pub fn updated(kind: &'static str, source_id: SourceId, mirror_id: MirrorId) -> Self {
        Self {
            kind,
            source_id,
            mirror_id,
            op: MirrorOp::Updated,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Secondary) -> Self {
        self.secondary = Some(secondary);
        self
    }
}

/// Per-actor counters, reported on request and logged at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub synced: u64,
    pub failed: u64,
}
