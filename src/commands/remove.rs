// src/commands/remove.rs
//! Package removal command

use super::{load_config, parse_refs, print_warnings};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use orchard::{Policy, Session};
use tracing::info;

/// Remove installed packages, dependents first
pub fn cmd_uninstall(global: &GlobalArgs, packages: &[String], policy: &Policy) -> Result<()> {
    let config = load_config(global)?;
    let refs = parse_refs(packages, &config)?;

    info!("Removing {} package(s)", refs.len());
    let mut session = Session::open(config).context("Failed to open session")?;

    let reports = match session.uninstall(&refs, policy) {
        Ok(reports) => reports,
        Err(e) if policy.soft => {
            eprintln!("warning: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Uninstall failed"),
    };

    for report in &reports {
        print_warnings(&report.warnings);
        println!("Removed {}", report.id);
        println!("  Files: {}", report.files.len());
    }
    Ok(())
}
