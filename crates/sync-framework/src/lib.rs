//! # Sync Framework
//!
//! Store-agnostic building blocks for replicating records from a source store into a
//! downstream mirror, one actor per entity kind.
//!
//! ## Architecture Overview
//!
//! 1. **Entity Layer** ([`SyncEntity`], [`MirrorEntity`]): how one kind is read, projected and
//!    mapped. Kinds that follow the upsert-by-mapped-identifier protocol implement
//!    [`MirrorEntity`] and delegate to [`upsert()`].
//! 2. **Runtime Layer** ([`SyncActor`]): a sequential mailbox loop that owns the transaction
//!    boundary (begin, commit, rollback with logging).
//! 3. **Interface Layer** ([`SyncClient`], [`EntityClient`]): cloneable, type-safe handles.
//!
//! ## Identifier Mapping
//!
//! A source record carries a nullable mapped identifier. Once set it names exactly one mirror
//! row, and every later sync updates that row instead of inserting another. `NULL` and `0` both
//! mean "not materialized yet" (see [`MirrorId::from_mapped`]).
//!
//! ## Concurrency Model
//!
//! - Each actor runs in its own Tokio task and processes one request at a time.
//! - Different kinds run in parallel.
//! - Each request holds exactly one transaction, released when it is committed, rolled back
//!   or dropped.
//!
//! ## Testing
//!
//! The [`mock`] module provides [`MockSyncClient`](mock::MockSyncClient) for code that only
//! needs a client, and the traits are generic over the transaction type so entities can be
//! exercised against in-memory stores.

pub mod actor;
pub mod client;
pub mod client_trait;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;
pub mod outcome;
pub mod transaction;
pub mod upsert;

pub use actor::SyncActor;
pub use client::SyncClient;
pub use client_trait::EntityClient;
pub use entity::{MirrorEntity, MirrorId, SourceId, SyncEntity, SyncKind};
pub use error::{FrameworkError, SyncError};
pub use message::{Response, SyncMessage, SyncRequest};
pub use outcome::{MirrorOp, Secondary, SyncOutcome, SyncStats};
pub use transaction::{Transaction, TxSource};
pub use upsert::{best_effort, upsert};
