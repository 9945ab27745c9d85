//! Side-effecting collaborators: device transport, model clients, and files.

pub mod adb;
pub mod config;
pub mod device;
pub mod gemini;
pub mod model;
pub mod openai;
pub mod process;
pub mod report;
pub mod suite;
