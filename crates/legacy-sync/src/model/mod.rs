//! Plain data structures for the three synchronized kinds and the HTTP projection.

pub mod customer;
pub mod order;
pub mod origin;

pub use customer::Customer;
pub use order::{LegacyOrder, Order, OrderReference, OrderView};
pub use origin::Origin;
