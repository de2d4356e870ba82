//! Durable queues of redemption intents and failed check-in reports.

mod uploads_model;
mod uploads_traits;

pub use uploads_model::*;
pub use uploads_traits::*;
