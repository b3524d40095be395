// src/commands/install.rs
//! Install, upgrade, download and resolve commands

use super::{load_config, parse_refs, print_warnings};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use orchard::resolver::sort_for_install;
use orchard::{Descriptor, InstallSummary, Policy, Session};
use tracing::info;

/// Install packages with their dependencies
pub fn cmd_install(global: &GlobalArgs, packages: &[String], policy: &Policy) -> Result<()> {
    let config = load_config(global)?;
    let requests = parse_refs(packages, &config)?;

    info!("Installing {} request(s)", requests.len());
    let mut session = Session::open(config).context("Failed to open session")?;

    match session.install(&requests, policy) {
        Ok(summary) => print_summary(&summary, "Nothing installed"),
        Err(e) if policy.soft => {
            eprintln!("warning: {}", e);
            Ok(())
        }
        Err(e) => Err(e).context("Install failed"),
    }
}

/// Install packages, replacing older installed versions
pub fn cmd_upgrade(global: &GlobalArgs, packages: &[String], policy: &Policy) -> Result<()> {
    let policy = Policy {
        upgrade: true,
        ..*policy
    };
    cmd_install(global, packages, &policy)
}

/// Upgrade everything installed
pub fn cmd_upgrade_all(global: &GlobalArgs, policy: &Policy) -> Result<()> {
    let config = load_config(global)?;
    let mut session = Session::open(config).context("Failed to open session")?;

    match session.upgrade_all(policy) {
        Ok(summary) => print_summary(&summary, "Nothing to upgrade"),
        Err(e) if policy.soft => {
            eprintln!("warning: {}", e);
            Ok(())
        }
        Err(e) => Err(e).context("Upgrade failed"),
    }
}

fn print_summary(summary: &InstallSummary, empty: &str) -> Result<()> {
    print_warnings(&summary.warnings);
    for failure in &summary.failures {
        eprintln!("skipped {}: {}", failure.package, failure.error);
    }

    if summary.installed.is_empty() {
        println!("{}", empty);
        return Ok(());
    }
    for report in &summary.installed {
        println!("Installed {}", report.id);
        println!("  Files: {}", report.files.len());
        if !report.skipped.is_empty() {
            println!("  Skipped: {}", report.skipped.len());
        }
    }
    Ok(())
}

/// Fetch archives into the download directory
pub fn cmd_download(global: &GlobalArgs, packages: &[String], policy: &Policy) -> Result<()> {
    let config = load_config(global)?;
    let requests = parse_refs(packages, &config)?;
    let mut session = Session::open(config).context("Failed to open session")?;

    let archives = match session.download(&requests, policy) {
        Ok(archives) => archives,
        Err(e) if policy.soft => {
            eprintln!("warning: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Download failed"),
    };
    for archive in &archives {
        println!("{}", archive.display());
    }
    Ok(())
}

/// Print the download set an install would use
pub fn cmd_resolve(global: &GlobalArgs, packages: &[String], policy: &Policy) -> Result<()> {
    let config = load_config(global)?;
    let requests = parse_refs(packages, &config)?;
    let mut session = Session::open(config).context("Failed to open session")?;

    let resolution = match session.resolve(&requests, policy) {
        Ok(resolution) => resolution,
        Err(e) if policy.soft => {
            eprintln!("warning: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e).context("Resolution failed"),
    };

    print_warnings(&resolution.warnings);
    for entry in sort_for_install(resolution.entries) {
        let id = entry.descriptor.id();
        let deps = entry.descriptor.dependencies().required_packages().count();
        println!("{} ({}, {} required package(s))", id, id.state, deps);
    }
    Ok(())
}
