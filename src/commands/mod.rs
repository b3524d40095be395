// src/commands/mod.rs
//! Command handlers for the Orchard CLI

mod install;
mod query;
mod remove;

pub use install::{cmd_download, cmd_install, cmd_resolve, cmd_upgrade, cmd_upgrade_all};
pub use query::{cmd_list, cmd_rebuild_db};
pub use remove::cmd_uninstall;

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use orchard::{Config, PackageRef};

/// Load the config file and apply command-line overrides
pub fn load_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = match global.config.clone().or_else(Config::default_path) {
        Some(path) if path.exists() => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        _ => Config::default(),
    };

    if let Some(ref root) = global.root {
        config.root = root.clone();
    }
    if let Some(ref channel) = global.channel {
        config.default_channel = channel.clone();
    }
    if let Some(ref prefix) = global.packagingroot {
        config.packaging_root = Some(prefix.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Parse package references against the default channel
fn parse_refs(packages: &[String], config: &Config) -> Result<Vec<PackageRef>> {
    packages
        .iter()
        .map(|p| {
            PackageRef::parse(p, &config.default_channel)
                .with_context(|| format!("Invalid package reference '{}'", p))
        })
        .collect()
}

/// Print warnings gathered by an operation
fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}
