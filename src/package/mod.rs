// src/package/mod.rs

//! Package identity, references and descriptors
//!
//! A [`PackageRef`] is what a user or a dependency declaration asks for;
//! a [`PackageId`] is a fully resolved release. Both compare channel and
//! name case-insensitively through their [`PackageKey`].

mod dependency;
mod descriptor;

pub use dependency::{
    DependencyDeclaration, DependencyGroup, DependencyKind, DependencySection, DependencySet,
    OneOrMany, Relation, WireDependency, WireDependencySet, WireGroup,
};
pub use descriptor::{
    Descriptor, DescriptorSchema, ExtendedDescriptor, FileRole, InstallLog, LegacyDescriptor,
    Manifest, ManifestFile, PackageDescriptor,
};

use crate::error::{Error, Result};
use crate::version::{ReleaseState, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel name used for packages known only by URI
pub const URI_CHANNEL: &str = "__uri";

/// Case-insensitive identity of a package within a channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageKey {
    pub channel: String,
    #[serde(rename = "package")]
    pub name: String,
}

impl PackageKey {
    pub fn new(channel: &str, name: &str) -> Self {
        Self {
            channel: channel.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.name)
    }
}

/// A request for a package, possibly under-specified
#[derive(Debug, Clone)]
pub struct PackageRef {
    pub channel: String,
    pub name: String,
    pub version: Option<Version>,
    pub state: Option<ReleaseState>,
    pub group: Option<String>,
}

impl PackageRef {
    pub fn new(channel: &str, name: &str) -> Self {
        Self {
            channel: channel.to_string(),
            name: name.to_string(),
            version: None,
            state: None,
            group: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_state(mut self, state: ReleaseState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// Parse `[channel/]name[-version|-state][#group]`
    pub fn parse(input: &str, default_channel: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::ParseError("Empty package reference".to_string()));
        }

        let (rest, group) = match input.split_once('#') {
            Some((rest, group)) if !group.is_empty() => (rest, Some(group.to_string())),
            Some(_) => {
                return Err(Error::ParseError(format!(
                    "Empty dependency group in '{}'",
                    input
                )));
            }
            None => (input, None),
        };

        let (channel, spec) = match rest.rsplit_once('/') {
            Some((channel, spec)) => (channel, spec),
            None => (default_channel, rest),
        };

        let mut name = spec;
        let mut version = None;
        let mut state = None;

        if let Some((head, suffix)) = spec.split_once('-') {
            if suffix.starts_with(|c: char| c.is_ascii_digit()) {
                name = head;
                version = Some(Version::parse(suffix)?);
            } else if let Ok(parsed) = suffix.parse::<ReleaseState>() {
                name = head;
                state = Some(parsed);
            }
        }

        if name.is_empty() || channel.is_empty() {
            return Err(Error::ParseError(format!(
                "Invalid package reference '{}'",
                input
            )));
        }

        Ok(Self {
            channel: channel.to_string(),
            name: name.to_string(),
            version,
            state,
            group,
        })
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.channel, &self.name)
    }

    /// Channel and name match, ignoring case
    pub fn same_package(&self, other: &PackageRef) -> bool {
        self.key() == other.key()
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_package(other)
            && self.version == other.version
            && self.state == other.state
            && self.group.as_deref().map(str::to_ascii_lowercase)
                == other.group.as_deref().map(str::to_ascii_lowercase)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.name)?;
        if let Some(ref version) = self.version {
            write!(f, "-{}", version)?;
        } else if let Some(state) = self.state {
            write!(f, "-{}", state)?;
        }
        if let Some(ref group) = self.group {
            write!(f, "#{}", group)?;
        }
        Ok(())
    }
}

/// Identity of one concrete release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub channel: String,
    pub name: String,
    pub version: Version,
    pub state: ReleaseState,
}

impl PackageId {
    pub fn new(channel: &str, name: &str, version: Version, state: ReleaseState) -> Self {
        Self {
            channel: channel.to_string(),
            name: name.to_string(),
            version,
            state,
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.channel, &self.name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.channel, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name_uses_default_channel() {
        let r = PackageRef::parse("Console_Getopt", "pkg.example.org").unwrap();
        assert_eq!(r.channel, "pkg.example.org");
        assert_eq!(r.name, "Console_Getopt");
        assert!(r.version.is_none());
    }

    #[test]
    fn test_parse_full_reference() {
        let r = PackageRef::parse("other.example.org/Mail-1.2.0#smtp", "pkg.example.org").unwrap();
        assert_eq!(r.channel, "other.example.org");
        assert_eq!(r.name, "Mail");
        assert_eq!(r.version.unwrap().to_string(), "1.2.0");
        assert_eq!(r.group.as_deref(), Some("smtp"));
    }

    #[test]
    fn test_parse_state_suffix() {
        let r = PackageRef::parse("Mail-beta", "c").unwrap();
        assert_eq!(r.name, "Mail");
        assert_eq!(r.state, Some(ReleaseState::Beta));
    }

    #[test]
    fn test_parse_rejects_empty_group() {
        assert!(PackageRef::parse("Mail#", "c").is_err());
        assert!(PackageRef::parse("", "c").is_err());
    }

    #[test]
    fn test_equality_ignores_case() {
        let a = PackageRef::new("Pkg.Example.org", "MAIL");
        let b = PackageRef::new("pkg.example.org", "mail");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "pkg.example.org/mail");
    }
}
