// src/resolver/environment.rs

//! Host environment checks for non-package dependencies

use crate::config::Config;
use crate::package::{DependencyDeclaration, DependencyKind};
use crate::version::{Version, VersionConstraint};
use std::collections::BTreeSet;

/// Facts about the host that dependency declarations can name
pub trait Environment {
    /// Version of the language runtime packages run on
    fn runtime_version(&self) -> Option<&Version>;
    fn has_extension(&self, name: &str) -> bool;
    fn os_name(&self) -> &str;
    fn sapi(&self) -> &str;
    fn has_program(&self, name: &str) -> bool;
}

/// Result of checking one declaration against the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvCheck {
    Satisfied,
    /// Definitely not satisfied
    Unmet(String),
    /// Cannot be checked on this host
    Unknown(String),
}

/// Environment described by the configuration and probed from the host
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    runtime_version: Option<Version>,
    extensions: BTreeSet<String>,
    sapi: String,
    os: String,
}

impl HostEnvironment {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runtime_version: Version::parse(&config.runtime_version).ok(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            sapi: config.sapi.clone(),
            os: std::env::consts::OS.to_string(),
        }
    }

    pub fn with_os(mut self, os: &str) -> Self {
        self.os = os.to_string();
        self
    }
}

impl Environment for HostEnvironment {
    fn runtime_version(&self) -> Option<&Version> {
        self.runtime_version.as_ref()
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(&name.to_ascii_lowercase())
    }

    fn os_name(&self) -> &str {
        &self.os
    }

    fn sapi(&self) -> &str {
        &self.sapi
    }

    fn has_program(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Check a non-package declaration, honouring its conflict flag
pub fn check_environment(env: &dyn Environment, dep: &DependencyDeclaration) -> EnvCheck {
    let present = match dep.kind {
        DependencyKind::Runtime => match env.runtime_version() {
            Some(version) => dep.constraint().satisfies(version),
            None => return EnvCheck::Unknown("runtime version is not known".to_string()),
        },
        DependencyKind::Extension => env.has_extension(&dep.name),
        DependencyKind::Os => os_matches(env.os_name(), &dep.name),
        DependencyKind::Sapi => env.sapi().eq_ignore_ascii_case(&dep.name),
        DependencyKind::Program => env.has_program(&dep.name),
        DependencyKind::Library | DependencyKind::WebServer => {
            return EnvCheck::Unknown(format!(
                "{} {} cannot be checked",
                dep.kind.as_str(),
                dep.name
            ));
        }
        DependencyKind::Package | DependencyKind::Subpackage => return EnvCheck::Satisfied,
    };

    let wanted = describe(env, dep);
    match (present, dep.is_conflict()) {
        (true, false) | (false, true) => EnvCheck::Satisfied,
        (false, false) => EnvCheck::Unmet(format!("requires {}", wanted)),
        (true, true) => EnvCheck::Unmet(format!("conflicts with {}", wanted)),
    }
}

fn describe(env: &dyn Environment, dep: &DependencyDeclaration) -> String {
    let constraint = dep.constraint();
    let mut text = match dep.kind {
        DependencyKind::Runtime => "runtime".to_string(),
        _ => format!("{} {}", dep.kind.as_str(), dep.name),
    };
    if constraint != VersionConstraint::Any {
        text.push_str(&format!(" ({})", constraint));
    }
    if dep.kind == DependencyKind::Runtime
        && let Some(version) = env.runtime_version()
    {
        text.push_str(&format!(", found {}", version));
    }
    text
}

/// `unix` matches every unix-like host, anything else the OS name
fn os_matches(host: &str, wanted: &str) -> bool {
    if wanted.eq_ignore_ascii_case("unix") {
        return cfg!(unix);
    }
    host.eq_ignore_ascii_case(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> HostEnvironment {
        let config = Config {
            runtime_version: "8.1.4".into(),
            extensions: vec!["Zlib".into()],
            ..Default::default()
        };
        HostEnvironment::from_config(&config).with_os("linux")
    }

    #[test]
    fn test_runtime_version_constraint() {
        let ok = DependencyDeclaration::new(DependencyKind::Runtime, "php")
            .with_min(Version::parse("8.0").unwrap());
        assert_eq!(check_environment(&env(), &ok), EnvCheck::Satisfied);

        let too_new = DependencyDeclaration::new(DependencyKind::Runtime, "php")
            .with_min(Version::parse("8.2").unwrap());
        match check_environment(&env(), &too_new) {
            EnvCheck::Unmet(msg) => assert!(msg.contains("found 8.1.4")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extension_and_conflict() {
        let zlib = DependencyDeclaration::new(DependencyKind::Extension, "zlib");
        assert_eq!(check_environment(&env(), &zlib), EnvCheck::Satisfied);

        let no_zlib = zlib.clone().as_conflict();
        assert!(matches!(check_environment(&env(), &no_zlib), EnvCheck::Unmet(_)));

        let gd = DependencyDeclaration::new(DependencyKind::Extension, "gd");
        assert!(matches!(check_environment(&env(), &gd), EnvCheck::Unmet(_)));
    }

    #[test]
    fn test_os_and_sapi() {
        let linux = DependencyDeclaration::new(DependencyKind::Os, "Linux");
        assert_eq!(check_environment(&env(), &linux), EnvCheck::Satisfied);

        let windows = DependencyDeclaration::new(DependencyKind::Os, "windows");
        assert!(matches!(check_environment(&env(), &windows), EnvCheck::Unmet(_)));

        let cli = DependencyDeclaration::new(DependencyKind::Sapi, "cli");
        assert_eq!(check_environment(&env(), &cli), EnvCheck::Satisfied);
    }

    #[test]
    fn test_unknown_kinds() {
        let lib = DependencyDeclaration::new(DependencyKind::Library, "libxml2");
        assert!(matches!(check_environment(&env(), &lib), EnvCheck::Unknown(_)));
    }
}
