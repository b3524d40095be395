// src/commands/query.rs
//! Registry queries and maintenance

use super::load_config;
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use orchard::db::PackageRegistry;
use orchard::{Descriptor, Session};

/// List installed packages
pub fn cmd_list(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let session = Session::open(config).context("Failed to open session")?;

    let mut packages = session
        .registry()
        .installed_packages()
        .context("Failed to read the registry")?;
    packages.sort_by_key(|p| p.key());

    if packages.is_empty() {
        println!("No packages installed");
    }
    for package in &packages {
        let id = package.id();
        println!("{} {} ({})", package.key(), id.version, id.state);
    }
    Ok(())
}

/// Rebuild the reverse-dependency database
pub fn cmd_rebuild_db(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let mut session = Session::open(config).context("Failed to open session")?;
    session
        .rebuild_dependency_db()
        .context("Failed to rebuild the dependency database")?;
    println!("Dependency database rebuilt");
    Ok(())
}
