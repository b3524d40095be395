// src/lib.rs

//! Orchard package manager core
//!
//! Installs packages published on channels: named package repositories
//! served over a small JSON REST interface.
//!
//! # Architecture
//!
//! - Resolution: requests become a validated download set of concrete
//!   releases, expanded to a fixed point over their dependencies
//! - Ordering: dependencies install first, dependents uninstall first
//! - Reverse dependencies: a locked JSON store answers "who depends on this"
//! - File transactions: preflight everything, apply in order, roll back
//!   on failure
//! - Registry: installed packages and their files live in SQLite

pub mod config;
pub mod db;
pub mod depdb;
mod error;
pub mod installer;
pub mod package;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod transaction;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use package::{Descriptor, PackageDescriptor, PackageId, PackageKey, PackageRef};
pub use session::{InstallSummary, Policy, Session};
pub use version::{ReleaseState, Version, VersionConstraint};
