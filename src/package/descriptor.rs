// src/package/descriptor.rs

//! Package descriptors
//!
//! Two descriptor generations exist. Legacy descriptors carry a flat
//! dependency list and no groups; extended descriptors carry sectioned
//! dependencies, groups and subpackages. Callers use the [`Descriptor`]
//! trait and never branch on the generation.

use super::{DependencySet, PackageId, PackageKey};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Install role of a manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileRole {
    RuntimeCode,
    ExtensionBinary,
    Doc,
    Data,
    Test,
    Script,
    Source,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::RuntimeCode => "code",
            FileRole::ExtensionBinary => "ext",
            FileRole::Doc => "doc",
            FileRole::Data => "data",
            FileRole::Test => "test",
            FileRole::Script => "script",
            FileRole::Source => "src",
        }
    }

    /// Source files ship in the archive but are never installed
    pub fn is_installable(&self) -> bool {
        !matches!(self, FileRole::Source)
    }

    /// Files that must be executable after install
    pub fn is_executable(&self) -> bool {
        matches!(self, FileRole::Script | FileRole::ExtensionBinary)
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "code" | "php" | "runtime-code" => Ok(FileRole::RuntimeCode),
            "ext" | "extension-binary" => Ok(FileRole::ExtensionBinary),
            "doc" => Ok(FileRole::Doc),
            "data" => Ok(FileRole::Data),
            "test" => Ok(FileRole::Test),
            "script" => Ok(FileRole::Script),
            "src" | "source" => Ok(FileRole::Source),
            _ => Err(Error::ParseError(format!("Invalid file role: {s}"))),
        }
    }
}

/// One file listed by a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFile {
    pub role: FileRole,
    /// Install under this relative name instead of the archive path
    pub install_as: Option<String>,
    /// Absolute path once installed
    pub installed_as: Option<PathBuf>,
}

/// Files recorded by a transaction before they reach the manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallLog {
    pub installed: BTreeMap<String, PathBuf>,
    pub dir_tree: BTreeSet<PathBuf>,
}

impl InstallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an installed file and the directories it created under `base_dir`
    pub fn record(&mut self, file: &str, installed_as: &Path, base_dir: &Path, relative_dir: &Path) {
        self.installed
            .insert(file.to_string(), installed_as.to_path_buf());

        if let Some(parent) = installed_as.parent() {
            self.dir_tree.insert(parent.to_path_buf());
        }

        let mut rel = relative_dir;
        while !rel.as_os_str().is_empty() {
            self.dir_tree.insert(base_dir.join(rel));
            rel = rel.parent().unwrap_or(Path::new(""));
        }
    }

    pub fn forget(&mut self, file: &str) {
        self.installed.remove(file);
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn clear(&mut self) {
        self.installed.clear();
        self.dir_tree.clear();
    }
}

/// File manifest of a release
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    files: BTreeMap<String, ManifestFile>,
    dir_tree: BTreeSet<PathBuf>,
    frozen: bool,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, role: FileRole) -> Self {
        self.files.insert(
            path.to_string(),
            ManifestFile {
                role,
                install_as: None,
                installed_as: None,
            },
        );
        self
    }

    pub fn with_file_as(mut self, path: &str, role: FileRole, install_as: &str) -> Self {
        self.files.insert(
            path.to_string(),
            ManifestFile {
                role,
                install_as: Some(install_as.to_string()),
                installed_as: None,
            },
        );
        self
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &ManifestFile)> {
        self.files.iter().map(|(path, file)| (path.as_str(), file))
    }

    pub fn file(&self, path: &str) -> Option<&ManifestFile> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Relative install path of a file within its role directory
    pub fn install_path(&self, path: &str) -> Option<PathBuf> {
        self.files
            .get(path)
            .map(|f| PathBuf::from(f.install_as.as_deref().unwrap_or(path)))
    }

    /// Absolute paths of every installed file
    pub fn installed_paths(&self) -> Vec<PathBuf> {
        self.files
            .values()
            .filter_map(|f| f.installed_as.clone())
            .collect()
    }

    pub fn dir_tree(&self) -> &BTreeSet<PathBuf> {
        &self.dir_tree
    }

    /// Restore install state loaded from the registry
    pub fn set_installed(&mut self, path: &str, installed_as: PathBuf) -> Result<()> {
        self.ensure_mutable()?;
        match self.files.get_mut(path) {
            Some(file) => {
                file.installed_as = Some(installed_as);
                Ok(())
            }
            None => Err(Error::NotFound(format!("{} is not in the manifest", path))),
        }
    }

    pub fn add_dir(&mut self, dir: PathBuf) -> Result<()> {
        self.ensure_mutable()?;
        self.dir_tree.insert(dir);
        Ok(())
    }

    /// Merge a committed transaction's install log
    pub fn apply(&mut self, log: &InstallLog) -> Result<()> {
        self.ensure_mutable()?;
        for (path, installed_as) in &log.installed {
            if let Some(file) = self.files.get_mut(path) {
                file.installed_as = Some(installed_as.clone());
            }
        }
        self.dir_tree.extend(log.dir_tree.iter().cloned());
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::InvalidPath(
                "Manifest is frozen after commit".to_string(),
            ));
        }
        Ok(())
    }
}

/// Descriptor generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSchema {
    Legacy,
    Extended,
}

impl DescriptorSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorSchema::Legacy => "1.0",
            DescriptorSchema::Extended => "2.0",
        }
    }
}

impl FromStr for DescriptorSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0" | "1" => Ok(DescriptorSchema::Legacy),
            "2.0" | "2" | "2.1" => Ok(DescriptorSchema::Extended),
            _ => Err(Error::ParseError(format!("Unsupported descriptor schema: {s}"))),
        }
    }
}

/// Read access shared by every descriptor generation
pub trait Descriptor {
    fn id(&self) -> &PackageId;
    fn dependencies(&self) -> &DependencySet;
    fn manifest(&self) -> &Manifest;
    fn manifest_mut(&mut self) -> &mut Manifest;
    fn schema(&self) -> DescriptorSchema;
    fn archive_url(&self) -> Option<&str>;

    fn key(&self) -> PackageKey {
        self.id().key()
    }
}

/// Flat-dependency descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyDescriptor {
    id: PackageId,
    dependencies: DependencySet,
    manifest: Manifest,
    archive_url: Option<String>,
}

impl LegacyDescriptor {
    pub fn new(id: PackageId, mut dependencies: DependencySet, manifest: Manifest) -> Result<Self> {
        if !dependencies.groups.is_empty() {
            return Err(Error::ParseError(format!(
                "{}: legacy descriptors cannot declare dependency groups",
                id
            )));
        }
        fill_channels(&mut dependencies, &id.channel);
        Ok(Self {
            id,
            dependencies,
            manifest,
            archive_url: None,
        })
    }
}

/// Sectioned-dependency descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedDescriptor {
    id: PackageId,
    dependencies: DependencySet,
    manifest: Manifest,
    archive_url: Option<String>,
}

impl ExtendedDescriptor {
    pub fn new(id: PackageId, mut dependencies: DependencySet, manifest: Manifest) -> Self {
        fill_channels(&mut dependencies, &id.channel);
        Self {
            id,
            dependencies,
            manifest,
            archive_url: None,
        }
    }
}

/// Package dependencies without a channel or URI live in the declaring channel
fn fill_channels(dependencies: &mut DependencySet, channel: &str) {
    let required = dependencies.required.iter_mut();
    let optional = dependencies.optional.iter_mut();
    let grouped = dependencies
        .groups
        .iter_mut()
        .flat_map(|g| g.dependencies.iter_mut());

    for dep in required.chain(optional).chain(grouped) {
        if dep.is_package() && dep.channel.is_none() && dep.uri.is_none() {
            dep.channel = Some(channel.to_string());
        }
    }
}

/// Descriptor of either generation
#[derive(Debug, Clone, PartialEq)]
pub enum PackageDescriptor {
    Legacy(LegacyDescriptor),
    Extended(ExtendedDescriptor),
}

impl PackageDescriptor {
    pub fn with_archive_url(mut self, url: &str) -> Self {
        let slot = match &mut self {
            PackageDescriptor::Legacy(d) => &mut d.archive_url,
            PackageDescriptor::Extended(d) => &mut d.archive_url,
        };
        *slot = Some(url.to_string());
        self
    }
}

impl From<LegacyDescriptor> for PackageDescriptor {
    fn from(d: LegacyDescriptor) -> Self {
        PackageDescriptor::Legacy(d)
    }
}

impl From<ExtendedDescriptor> for PackageDescriptor {
    fn from(d: ExtendedDescriptor) -> Self {
        PackageDescriptor::Extended(d)
    }
}

impl Descriptor for PackageDescriptor {
    fn id(&self) -> &PackageId {
        match self {
            PackageDescriptor::Legacy(d) => &d.id,
            PackageDescriptor::Extended(d) => &d.id,
        }
    }

    fn dependencies(&self) -> &DependencySet {
        match self {
            PackageDescriptor::Legacy(d) => &d.dependencies,
            PackageDescriptor::Extended(d) => &d.dependencies,
        }
    }

    fn manifest(&self) -> &Manifest {
        match self {
            PackageDescriptor::Legacy(d) => &d.manifest,
            PackageDescriptor::Extended(d) => &d.manifest,
        }
    }

    fn manifest_mut(&mut self) -> &mut Manifest {
        match self {
            PackageDescriptor::Legacy(d) => &mut d.manifest,
            PackageDescriptor::Extended(d) => &mut d.manifest,
        }
    }

    fn schema(&self) -> DescriptorSchema {
        match self {
            PackageDescriptor::Legacy(_) => DescriptorSchema::Legacy,
            PackageDescriptor::Extended(_) => DescriptorSchema::Extended,
        }
    }

    fn archive_url(&self) -> Option<&str> {
        match self {
            PackageDescriptor::Legacy(d) => d.archive_url.as_deref(),
            PackageDescriptor::Extended(d) => d.archive_url.as_deref(),
        }
    }
}
