//! Subscriber setup.
//!
//! Log levels come from `RUST_LOG` (default `info`):
//!
//! ```bash
//! RUST_LOG=info legacy-sync                       # one line per sync and per delivery failure
//! RUST_LOG=legacy_sync=debug,sqlx=warn legacy-sync # payloads, acks, connection details
//! ```
//!
//! Every delivery runs inside a `delivery{queue, delivery_tag}` span, so a failed sync can be
//! traced back to the message that caused it.

use tracing_subscriber::EnvFilter;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // try_init: tests may install a subscriber more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
