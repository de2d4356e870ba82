//! Pull/push synchronization with the remote authority.

mod remote;
mod sync_engine;
mod sync_model;
mod sync_policy;
mod sync_scheduler;
mod trigger;

pub use remote::*;
pub use sync_engine::*;
pub use sync_model::*;
pub use sync_policy::*;
pub use sync_scheduler::*;
pub use trigger::*;
