// src/db/models/mod.rs

//! Data models for registry tables
//!
//! Each struct corresponds to one table and provides the create, read
//! and delete operations the registry needs.

mod dependency;
mod directory;
mod file_entry;
mod package;

pub use dependency::DependencyEntry;
pub use directory::DirectoryEntry;
pub use file_entry::FileEntry;
pub use package::PackageEntry;
