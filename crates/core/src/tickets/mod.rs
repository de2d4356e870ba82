//! Signed ticket handling for validation without synced order data.

mod decoder;
mod payload;
mod signature;

pub use decoder::*;
pub use payload::*;
pub use signature::*;

#[cfg(test)]
pub(crate) use decoder::test_tickets;
#[cfg(test)]
pub(crate) use signature::test_keys;
