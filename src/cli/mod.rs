// src/cli/mod.rs
//! CLI definitions for Orchard
//!
//! Command implementations live in the `commands` module.

use clap::{Args, Parser, Subcommand};
use orchard::Policy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "orchard")]
#[command(author = "Orchard Contributors")]
#[command(version)]
#[command(about = "Channel-based package manager with transactional installs", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Config file (default: ~/.config/orchard/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Install root, overriding the config file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Default channel, overriding the config file
    #[arg(long, global = true)]
    pub channel: Option<String>,

    /// Install files and the registry under this prefix, for building packages
    #[arg(long, global = true)]
    pub packagingroot: Option<PathBuf>,
}

/// Policy flags shared by install, uninstall and resolve
#[derive(Args, Clone, Copy, Default)]
pub struct PolicyArgs {
    /// Report problems as warnings only
    #[arg(long)]
    pub soft: bool,

    /// Carry on past dependency and file problems
    #[arg(long)]
    pub ignore_errors: bool,

    /// Do not resolve or check dependencies
    #[arg(long)]
    pub nodeps: bool,

    /// Reinstall or remove regardless of what is installed
    #[arg(short, long)]
    pub force: bool,

    /// Also pull in optional dependencies
    #[arg(short, long)]
    pub alldeps: bool,

    /// Pull in required dependencies only
    #[arg(short, long)]
    pub onlyreqdeps: bool,

    /// Use cached metadata and downloaded archives only
    #[arg(short = 'O', long)]
    pub offline: bool,
}

impl PolicyArgs {
    pub fn policy(&self, register_only: bool) -> Policy {
        Policy {
            soft: self.soft,
            ignore_errors: self.ignore_errors,
            nodeps: self.nodeps,
            force: self.force,
            alldeps: self.alldeps,
            onlyreqdeps: self.onlyreqdeps,
            upgrade: false,
            offline: self.offline,
            register_only,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages and their dependencies
    Install {
        /// Package references: [channel/]name[-version|-state][#group]
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Record the packages without installing files
        #[arg(long)]
        register_only: bool,
    },

    /// Upgrade packages, installing them if they are missing
    Upgrade {
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Record the packages without installing files
        #[arg(long)]
        register_only: bool,
    },

    /// Upgrade every installed package with a newer release
    UpgradeAll {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Record the packages without installing files
        #[arg(long)]
        register_only: bool,
    },

    /// Download package archives without installing them
    Download {
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Remove installed packages
    #[command(alias = "remove")]
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Forget the packages without removing files
        #[arg(long)]
        register_only: bool,
    },

    /// Show what an install would download, in install order
    Resolve {
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Rebuild the reverse-dependency database from the registry
    RebuildDb,

    /// List installed packages
    List,
}
