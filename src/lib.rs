//! FlowForge - git-synchronized developer namespaces and team coordination
//!
//! This crate provides the core functionality for the `ff` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Context resolution and settings
//! - [`error`] - Error types and handling
//! - [`model`] - Document schemas (Profile, SessionRecord, TimeSheet, TaskAssignments, BlockerBoard)
//! - [`store`] - Atomic JSON document store
//! - [`vcs`] - Version-control substrate (git)
//! - [`resolve`] - Structural conflict resolution and quarantine
//! - [`namespace`] - Per-developer namespaces and session history
//! - [`session`] - Session lifecycle
//! - [`team`] - Task assignments and blockers
//! - [`sync`] - Pull/resolve/commit/push cycle, status and migration

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod namespace;
pub mod resolve;
pub mod session;
pub mod store;
pub mod sync;
pub mod team;
pub mod vcs;

pub use error::{Error, Result};
