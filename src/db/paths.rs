// src/db/paths.rs
//! Centralized path derivation for registry directory contents

use std::path::{Path, PathBuf};

/// SQLite registry database
pub fn registry_db(registry_dir: &Path) -> PathBuf {
    registry_dir.join("registry.db")
}

/// Reverse-dependency store
pub fn dependency_store(registry_dir: &Path) -> PathBuf {
    registry_dir.join(".depdb")
}

/// Lock file guarding the reverse-dependency store
pub fn dependency_lock(registry_dir: &Path) -> PathBuf {
    registry_dir.join(".depdblock")
}

/// Scratch space for extracted archives
pub fn staging_dir(registry_dir: &Path) -> PathBuf {
    registry_dir.join("staging")
}
