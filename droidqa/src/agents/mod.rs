//! The three agents of the loop: the planner proposes one action, the
//! executor performs it on the device, and the supervisor judges outcomes.

pub mod executor;
pub mod planner;
pub mod supervisor;
