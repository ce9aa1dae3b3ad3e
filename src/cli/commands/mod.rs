//! Command implementations.

pub mod blocker;
pub mod completions;
pub mod quarantine;
pub mod session;
pub mod status;
pub mod sync;
pub mod task;
pub mod version;
