//! # Legacy Sync
//!
//! Mirrors customers, origins and orders from the API schema into the legacy schema as
//! RabbitMQ announces them, and serves a read-only order lookup over HTTP.
//!
//! - **[queue]**: broker connection, reconnection and per-queue dispatch.
//! - **[customer_actor], [origin_actor], [order_actor]**: one synchronizer per kind, built on
//!   [`sync_framework::SyncActor`].
//! - **[clients]**: type-safe handles to the synchronizers; also the queue handlers.
//! - **[store]**: the statements each synchronizer runs, on MySQL or in memory.
//! - **[api]**: `GET /order/{id}`.
//! - **[config]**, **[lifecycle]**: environment settings, wiring and shutdown.

pub mod api;
pub mod clients;
pub mod config;
pub mod customer_actor;
pub mod lifecycle;
pub mod model;
pub mod order_actor;
pub mod origin_actor;
pub mod queue;
pub mod store;
