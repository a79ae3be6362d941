//! Type-safe wrappers around [`SyncClient`](sync_framework::SyncClient), one per kind.
//!
//! Each wrapper is also the [`MessageHandler`](crate::queue::MessageHandler) registered on its
//! kind's queue.

pub mod customer_client;
pub mod order_client;
pub mod origin_client;

pub use customer_client::*;
pub use order_client::*;
pub use origin_client::*;
