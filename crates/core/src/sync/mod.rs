//! Sync domain model: queue entries, statuses, merge policy, remote contract.

mod merge;
mod model;
mod remote;
mod scheduler;

pub use merge::*;
pub use model::*;
pub use remote::*;
pub use scheduler::*;
