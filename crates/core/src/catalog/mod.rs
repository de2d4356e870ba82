//! Synced read model of one event.

mod catalog_model;
mod catalog_traits;

pub use catalog_model::*;
pub use catalog_traits::*;
