// src/package/dependency.rs

//! Dependency declarations and their wire format
//!
//! Declarations travel as JSON records (`type`, `name`, `channel`/`uri`,
//! `rel`, `version`/`min`/`max`/`exclude`, `optional`) nested under
//! `required`, `optional` and `group` sections. Every section, and the
//! `exclude` field, accepts either a single record or an array.

use super::{PackageKey, PackageRef, URI_CHANNEL};
use crate::error::{Error, Result};
use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A value encoded either as one record or as a list of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

/// Relation operator of a legacy declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Has,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Ne,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Has => "has",
            Relation::Eq => "eq",
            Relation::Lt => "lt",
            Relation::Le => "le",
            Relation::Gt => "gt",
            Relation::Ge => "ge",
            Relation::Not => "not",
            Relation::Ne => "ne",
        }
    }
}

impl FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "has" => Ok(Relation::Has),
            "eq" => Ok(Relation::Eq),
            "lt" => Ok(Relation::Lt),
            "le" => Ok(Relation::Le),
            "gt" => Ok(Relation::Gt),
            "ge" => Ok(Relation::Ge),
            "not" => Ok(Relation::Not),
            "ne" => Ok(Relation::Ne),
            _ => Err(Error::ParseError(format!("Invalid dependency relation: {s}"))),
        }
    }
}

/// What a declaration depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Package,
    Subpackage,
    Extension,
    Runtime,
    Program,
    Library,
    Os,
    WebServer,
    Sapi,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Package => "package",
            DependencyKind::Subpackage => "subpackage",
            DependencyKind::Extension => "extension",
            DependencyKind::Runtime => "runtime",
            DependencyKind::Program => "program",
            DependencyKind::Library => "library",
            DependencyKind::Os => "os",
            DependencyKind::WebServer => "webserver",
            DependencyKind::Sapi => "sapi",
        }
    }

    /// Package and subpackage dependencies name other releases
    pub fn is_package(&self) -> bool {
        matches!(self, DependencyKind::Package | DependencyKind::Subpackage)
    }
}

impl FromStr for DependencyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "package" | "pkg" => Ok(DependencyKind::Package),
            "subpackage" => Ok(DependencyKind::Subpackage),
            "extension" | "ext" => Ok(DependencyKind::Extension),
            "runtime" | "php" => Ok(DependencyKind::Runtime),
            "program" | "prog" => Ok(DependencyKind::Program),
            "library" | "ldlib" | "rtlib" => Ok(DependencyKind::Library),
            "os" => Ok(DependencyKind::Os),
            "webserver" | "websrv" => Ok(DependencyKind::WebServer),
            "sapi" => Ok(DependencyKind::Sapi),
            _ => Err(Error::ParseError(format!("Invalid dependency type: {s}"))),
        }
    }
}

/// Section a declaration was listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencySection {
    Required,
    Optional,
    Group,
}

impl DependencySection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencySection::Required => "required",
            DependencySection::Optional => "optional",
            DependencySection::Group => "group",
        }
    }
}

impl FromStr for DependencySection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "required" => Ok(DependencySection::Required),
            "optional" => Ok(DependencySection::Optional),
            "group" => Ok(DependencySection::Group),
            _ => Err(Error::ParseError(format!("Invalid dependency section: {s}"))),
        }
    }
}

/// One declared dependency
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyDeclaration {
    pub kind: DependencyKind,
    pub name: String,
    pub channel: Option<String>,
    pub uri: Option<String>,
    pub relation: Option<Relation>,
    pub version: Option<Version>,
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub exclude: Vec<Version>,
    pub optional: bool,
    pub conflicts: bool,
}

impl DependencyDeclaration {
    pub fn new(kind: DependencyKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            channel: None,
            uri: None,
            relation: None,
            version: None,
            min: None,
            max: None,
            exclude: Vec::new(),
            optional: false,
            conflicts: false,
        }
    }

    /// Shorthand for a package dependency
    pub fn package(channel: &str, name: &str) -> Self {
        Self::new(DependencyKind::Package, name).with_channel(channel)
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = Some(channel.to_string());
        self
    }

    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_string());
        self
    }

    pub fn with_relation(mut self, relation: Relation, version: Option<Version>) -> Self {
        self.relation = Some(relation);
        self.version = version;
        self
    }

    pub fn with_min(mut self, min: Version) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: Version) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_exclude(mut self, version: Version) -> Self {
        self.exclude.push(version);
        self
    }

    pub fn as_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn as_conflict(mut self) -> Self {
        self.conflicts = true;
        self
    }

    /// The target must not be present
    pub fn is_conflict(&self) -> bool {
        self.conflicts || self.relation == Some(Relation::Not)
    }

    pub fn is_package(&self) -> bool {
        self.kind.is_package()
    }

    /// Combined version constraint of relation and range bounds
    pub fn constraint(&self) -> VersionConstraint {
        let mut parts = Vec::new();

        if let (Some(relation), Some(version)) = (self.relation, self.version.as_ref()) {
            let version = version.clone();
            match relation {
                Relation::Eq => parts.push(VersionConstraint::Exact(version)),
                Relation::Lt => parts.push(VersionConstraint::LessThan(version)),
                Relation::Le => parts.push(VersionConstraint::LessOrEqual(version)),
                Relation::Gt => parts.push(VersionConstraint::GreaterThan(version)),
                Relation::Ge => parts.push(VersionConstraint::GreaterOrEqual(version)),
                Relation::Ne => parts.push(VersionConstraint::NotEqual(version)),
                Relation::Has | Relation::Not => {}
            }
        }

        match VersionConstraint::from_bounds(self.min.as_ref(), self.max.as_ref(), &self.exclude) {
            VersionConstraint::Any => {}
            VersionConstraint::All(bounds) => parts.extend(bounds),
            bound => parts.push(bound),
        }

        match parts.len() {
            0 => VersionConstraint::Any,
            1 => parts.remove(0),
            _ => VersionConstraint::All(parts),
        }
    }

    /// Key of the package this declaration targets
    pub fn target_key(&self, default_channel: &str) -> PackageKey {
        PackageKey::new(self.target_channel(default_channel), &self.name)
    }

    /// Reference used to look the target up in a channel
    pub fn target_ref(&self, default_channel: &str) -> PackageRef {
        let mut target = PackageRef::new(self.target_channel(default_channel), &self.name);
        target.version = self.constraint().pinned().cloned();
        target
    }

    fn target_channel<'a>(&'a self, default_channel: &'a str) -> &'a str {
        if self.uri.is_some() {
            URI_CHANNEL
        } else {
            self.channel.as_deref().unwrap_or(default_channel)
        }
    }

    /// Human readable form used in diagnostics
    pub fn describe(&self, default_channel: &str) -> String {
        let target = if self.is_package() {
            self.target_key(default_channel).to_string()
        } else {
            format!("{} {}", self.kind.as_str(), self.name)
        };
        match self.constraint() {
            VersionConstraint::Any => target,
            constraint => format!("{} ({})", target, constraint),
        }
    }

    pub fn from_wire(wire: &WireDependency) -> Result<Self> {
        let parse_opt = |v: &Option<String>| -> Result<Option<Version>> {
            v.as_deref().map(Version::parse).transpose()
        };

        let exclude = match &wire.exclude {
            Some(list) => list
                .clone()
                .into_vec()
                .iter()
                .map(|v| Version::parse(v))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        if wire.name.trim().is_empty() {
            return Err(Error::ParseError("Dependency without a name".to_string()));
        }

        Ok(Self {
            kind: wire.kind.parse()?,
            name: wire.name.clone(),
            channel: wire.channel.clone(),
            uri: wire.uri.clone(),
            relation: wire.rel.as_deref().map(str::parse).transpose()?,
            version: parse_opt(&wire.version)?,
            min: parse_opt(&wire.min)?,
            max: parse_opt(&wire.max)?,
            exclude,
            optional: is_yes(wire.optional.as_deref()),
            conflicts: is_yes(wire.conflicts.as_deref()),
        })
    }

    pub fn to_wire(&self) -> WireDependency {
        let to_string = |v: &Option<Version>| v.as_ref().map(|v| v.to_string());
        WireDependency {
            kind: self.kind.as_str().to_string(),
            name: self.name.clone(),
            channel: self.channel.clone(),
            uri: self.uri.clone(),
            rel: self.relation.map(|r| r.as_str().to_string()),
            version: to_string(&self.version),
            min: to_string(&self.min),
            max: to_string(&self.max),
            exclude: if self.exclude.is_empty() {
                None
            } else {
                Some(OneOrMany::Many(self.exclude.iter().map(|v| v.to_string()).collect()))
            },
            optional: Some(if self.optional { "yes" } else { "no" }.to_string()),
            conflicts: self.conflicts.then(|| "yes".to_string()),
        }
    }
}

fn is_yes(flag: Option<&str>) -> bool {
    matches!(flag, Some(v) if v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("true"))
}

fn default_kind() -> String {
    "package".to_string()
}

/// Serialized form of one declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDependency {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<OneOrMany<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<String>,
}

/// Serialized dependency group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep: Option<OneOrMany<WireDependency>>,
}

/// Serialized dependency sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireDependencySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<OneOrMany<WireDependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<OneOrMany<WireDependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<OneOrMany<WireGroup>>,
}

/// Named set of dependencies installed on request
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGroup {
    pub name: String,
    pub hint: Option<String>,
    pub dependencies: Vec<DependencyDeclaration>,
}

/// All dependencies of a release, by section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencySet {
    pub required: Vec<DependencyDeclaration>,
    pub optional: Vec<DependencyDeclaration>,
    pub groups: Vec<DependencyGroup>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, dep: DependencyDeclaration) -> Self {
        self.required.push(dep);
        self
    }

    pub fn recommend(mut self, dep: DependencyDeclaration) -> Self {
        self.optional.push(dep.as_optional());
        self
    }

    pub fn with_group(mut self, group: DependencyGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty() && self.groups.is_empty()
    }

    /// Look a group up by name, ignoring case
    pub fn group(&self, name: &str) -> Option<&DependencyGroup> {
        self.groups.iter().find(|g| g.name.eq_ignore_ascii_case(name))
    }

    /// Every declaration with its section and group name
    pub fn iter(&self) -> impl Iterator<Item = (DependencySection, Option<&str>, &DependencyDeclaration)> {
        let required = self
            .required
            .iter()
            .map(|d| (DependencySection::Required, None, d));
        let optional = self
            .optional
            .iter()
            .map(|d| (DependencySection::Optional, None, d));
        let groups = self.groups.iter().flat_map(|g| {
            g.dependencies
                .iter()
                .map(move |d| (DependencySection::Group, Some(g.name.as_str()), d))
        });
        required.chain(optional).chain(groups)
    }

    /// Required package and subpackage dependencies that are not conflicts
    pub fn required_packages(&self) -> impl Iterator<Item = &DependencyDeclaration> {
        self.required
            .iter()
            .filter(|d| d.is_package() && !d.is_conflict())
    }

    /// Decode the sectioned format
    pub fn from_wire(wire: &WireDependencySet) -> Result<Self> {
        let decode = |section: &Option<OneOrMany<WireDependency>>, optional: bool| {
            section
                .clone()
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .iter()
                .map(|w| {
                    let mut dep = DependencyDeclaration::from_wire(w)?;
                    dep.optional = optional;
                    Ok(dep)
                })
                .collect::<Result<Vec<_>>>()
        };

        let mut groups = Vec::new();
        for group in wire.group.clone().map(OneOrMany::into_vec).unwrap_or_default() {
            if group.name.trim().is_empty() {
                return Err(Error::ParseError("Dependency group without a name".to_string()));
            }
            groups.push(DependencyGroup {
                dependencies: decode(&group.dep, true)?,
                name: group.name,
                hint: group.hint,
            });
        }

        Ok(Self {
            required: decode(&wire.required, false)?,
            optional: decode(&wire.optional, true)?,
            groups,
        })
    }

    /// Decode the legacy flat format, split by each record's optional flag
    pub fn from_legacy(records: &OneOrMany<WireDependency>) -> Result<Self> {
        let mut set = Self::new();
        for wire in records.clone().into_vec() {
            let dep = DependencyDeclaration::from_wire(&wire)?;
            if dep.optional {
                set.optional.push(dep);
            } else {
                set.required.push(dep);
            }
        }
        Ok(set)
    }

    pub fn to_wire(&self) -> WireDependencySet {
        let encode = |deps: &[DependencyDeclaration]| {
            (!deps.is_empty())
                .then(|| OneOrMany::Many(deps.iter().map(DependencyDeclaration::to_wire).collect()))
        };

        let groups: Vec<WireGroup> = self
            .groups
            .iter()
            .map(|g| WireGroup {
                name: g.name.clone(),
                hint: g.hint.clone(),
                dep: encode(&g.dependencies),
            })
            .collect();

        WireDependencySet {
            required: encode(&self.required),
            optional: encode(&self.optional),
            group: (!groups.is_empty()).then_some(OneOrMany::Many(groups)),
        }
    }
}
