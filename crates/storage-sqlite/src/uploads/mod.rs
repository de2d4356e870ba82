//! Uploads database: queued redemptions, failed check-ins and engine state.

mod model;
pub(crate) mod queries;
mod repository;

pub use repository::UploadsRepository;
