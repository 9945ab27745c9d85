//! Pure, deterministic core logic: no I/O, no clocks, no network.

pub mod action;
pub mod classify;
pub mod recovery;
pub mod types;
