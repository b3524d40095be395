// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install {
            packages,
            policy,
            register_only,
        }) => commands::cmd_install(&cli.global, &packages, &policy.policy(register_only)),
        Some(Commands::Upgrade {
            packages,
            policy,
            register_only,
        }) => commands::cmd_upgrade(&cli.global, &packages, &policy.policy(register_only)),
        Some(Commands::UpgradeAll {
            policy,
            register_only,
        }) => commands::cmd_upgrade_all(&cli.global, &policy.policy(register_only)),
        Some(Commands::Download { packages, policy }) => {
            commands::cmd_download(&cli.global, &packages, &policy.policy(false))
        }
        Some(Commands::Uninstall {
            packages,
            policy,
            register_only,
        }) => commands::cmd_uninstall(&cli.global, &packages, &policy.policy(register_only)),
        Some(Commands::Resolve { packages, policy }) => {
            commands::cmd_resolve(&cli.global, &packages, &policy.policy(false))
        }
        Some(Commands::RebuildDb) => commands::cmd_rebuild_db(&cli.global),
        Some(Commands::List) => commands::cmd_list(&cli.global),
        None => {
            println!("Orchard v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'orchard --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_upgrade_and_offline_flags_parse() {
        let cli = Cli::parse_from(["orchard", "--packagingroot", "/tmp/pkg", "upgrade", "-o", "-O", "Mail"]);
        assert_eq!(cli.global.packagingroot.as_deref(), Some(std::path::Path::new("/tmp/pkg")));
        match cli.command {
            Some(Commands::Upgrade { packages, policy, .. }) => {
                assert_eq!(packages, vec!["Mail"]);
                let policy = policy.policy(false);
                assert!(policy.onlyreqdeps && policy.offline);
                assert!(!policy.upgrade);
            }
            _ => panic!("expected upgrade"),
        }

        let cli = Cli::parse_from(["orchard", "upgrade-all", "--soft"]);
        assert!(matches!(cli.command, Some(Commands::UpgradeAll { policy, .. }) if policy.soft));
    }

    #[test]
    fn test_install_flags_parse() {
        let cli = Cli::parse_from(["orchard", "install", "--nodeps", "-f", "Mail-1.2", "c/Net#smtp"]);
        match cli.command {
            Some(Commands::Install { packages, policy, register_only }) => {
                assert_eq!(packages, vec!["Mail-1.2", "c/Net#smtp"]);
                assert!(policy.nodeps && policy.force);
                assert!(!register_only);
            }
            _ => panic!("expected install"),
        }
    }
}
