//! Offline-first ticket check-in core.
//!
//! Storage and network live behind the traits declared here; the
//! `checkin-storage-sqlite` and `checkin-remote-api` crates implement them.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod redemption;
pub mod session;
pub mod sync;
pub mod tickets;
pub mod uploads;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{DatabaseError, Error, Result};
pub use session::SessionContext;
