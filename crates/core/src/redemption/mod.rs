//! Local redemption state machine.

mod redemption_engine;
mod redemption_model;
mod redemption_traits;

pub use redemption_engine::*;
pub use redemption_model::*;
pub use redemption_traits::*;
