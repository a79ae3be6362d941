//! # Process Lifecycle
//!
//! Wiring for the running service.
//!
//! [`SyncSystem`] spawns the three synchronizers over a shared store and hands their clients to
//! the dispatcher, one consume loop per queue. Shutdown runs in the reverse order:
//!
//! 1. Close the broker connection (the consume loops see the link close and return).
//! 2. Await the consume loops, which drops the handlers and therefore the last clients.
//! 3. Await the synchronizers; each finishes its current request, then sees its mailbox close.
//!
//! No delivery is acknowledged after step 1, so anything in flight is redelivered by the
//! broker on the next start.
//!
//! [`setup_tracing`] installs the process-wide subscriber; call it once, first thing in `main`.

pub mod sync_system;
pub mod tracing;

pub use self::tracing::*;
pub use sync_system::*;
