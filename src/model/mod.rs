//! Data models for FlowForge documents.
//!
//! This module contains all document schemas:
//! - Profile
//! - SessionRecord
//! - TimeSheet / TimeEntry
//! - TaskAssignments / BlockerBoard
//! - HistoryEntry

pub mod history;
pub mod profile;
pub mod session;
pub mod team;
pub mod time;

pub use history::{append_history, HistoryEntry};
pub use profile::Profile;
pub use session::{new_session_id, Environment, SessionRecord};
pub use team::{Blocker, BlockerBoard, BlockerStatus, TaskAssignment, TaskAssignments, TaskStatus};
pub use time::{period_key, TimeEntry, TimeSheet};
