// src/depdb/mod.rs

//! Reverse-dependency database
//!
//! Records, per installed package, the package dependencies it declared
//! (the forward index) and, per package, who depends on it (the inverse
//! index). Both indexes live in one JSON document written as a unit:
//!
//! ```json
//! {
//!   "_version": "1.0",
//!   "dependencies": {"chan": {"a": [{"dep": {...}, "type": "required", "group": null}]}},
//!   "packages": {"chan": {"b": [{"channel": "chan", "package": "a"}]}}
//! }
//! ```
//!
//! The document is derived data: it is rebuilt from the registry when it
//! is missing or was written by an older release. One written by a newer
//! major version is refused.

pub mod lock;

use crate::db::PackageRegistry;
use crate::db::paths;
use crate::error::{Error, Result};
use crate::package::{
    DependencyDeclaration, DependencySection, Descriptor, PackageKey, URI_CHANNEL, WireDependency,
};
use lock::{LockMode, RetryPolicy, StoreLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store format written by this release
pub const STORE_VERSION: &str = "1.0";

/// One forward record: a package dependency declared by an installed package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDependency {
    pub dep: WireDependency,
    /// Section the declaration came from
    #[serde(rename = "type")]
    pub section: String,
    #[serde(default)]
    pub group: Option<String>,
}

impl StoredDependency {
    fn from_declaration(
        dep: &DependencyDeclaration,
        section: DependencySection,
        group: Option<&str>,
    ) -> Self {
        Self {
            dep: dep.to_wire(),
            section: section.as_str().to_string(),
            group: group.map(str::to_string),
        }
    }

    /// Whether the dependent cannot work without the target
    pub fn is_required(&self) -> bool {
        self.section == DependencySection::Required.as_str()
    }

    pub fn declaration(&self) -> Result<DependencyDeclaration> {
        DependencyDeclaration::from_wire(&self.dep)
    }

    /// Package this record points at
    pub fn target(&self, dependent_channel: &str) -> PackageKey {
        match (&self.dep.uri, &self.dep.channel) {
            (Some(_), _) => PackageKey::new(URI_CHANNEL, &self.dep.name),
            (None, Some(channel)) => PackageKey::new(channel, &self.dep.name),
            (None, None) => PackageKey::new(dependent_channel, &self.dep.name),
        }
    }
}

type ChannelMap<T> = BTreeMap<String, BTreeMap<String, Vec<T>>>;

/// On-disk document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyStore {
    #[serde(rename = "_version")]
    pub version: String,
    #[serde(default)]
    pub dependencies: ChannelMap<StoredDependency>,
    #[serde(default)]
    pub packages: ChannelMap<PackageKey>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            ..Default::default()
        }
    }

    fn forward(&self, key: &PackageKey) -> &[StoredDependency] {
        self.dependencies
            .get(&key.channel)
            .and_then(|m| m.get(&key.name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn inverse(&self, key: &PackageKey) -> &[PackageKey] {
        self.packages
            .get(&key.channel)
            .and_then(|m| m.get(&key.name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the forward records of `dependent` (removing them if empty)
    fn set_forward(&mut self, dependent: &PackageKey, records: Vec<StoredDependency>) {
        if records.is_empty() {
            if let Some(channel) = self.dependencies.get_mut(&dependent.channel) {
                channel.remove(&dependent.name);
                if channel.is_empty() {
                    self.dependencies.remove(&dependent.channel);
                }
            }
        } else {
            self.dependencies
                .entry(dependent.channel.clone())
                .or_default()
                .insert(dependent.name.clone(), records);
        }
        self.reindex();
    }

    /// Recompute the inverse index from the forward one
    fn reindex(&mut self) {
        let mut packages: ChannelMap<PackageKey> = BTreeMap::new();
        for (channel, dependents) in &self.dependencies {
            for (name, records) in dependents {
                let dependent = PackageKey::new(channel, name);
                for record in records {
                    let target = record.target(channel);
                    let list = packages
                        .entry(target.channel)
                        .or_default()
                        .entry(target.name)
                        .or_default();
                    if !list.contains(&dependent) {
                        list.push(dependent.clone());
                    }
                }
            }
        }
        self.packages = packages;
    }

    /// Major component of the stored format version
    fn major(version: &str) -> u32 {
        version
            .split('.')
            .next()
            .and_then(|m| m.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Lifecycle of the on-disk store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Absent,
    Stale,
    Current,
}

/// Handle on one registry directory's reverse-dependency store
pub struct DependencyDb {
    store_path: PathBuf,
    lock_path: PathBuf,
    retry: RetryPolicy,
}

impl DependencyDb {
    /// Open the store in `registry_dir`, rebuilding it from `registry` when
    /// it is missing or stale
    pub fn open(registry_dir: &Path, registry: &dyn PackageRegistry) -> Result<Self> {
        let db = Self::at(registry_dir);
        db.assert_ready(registry)?;
        Ok(db)
    }

    /// Handle without any state check
    pub fn at(registry_dir: &Path) -> Self {
        Self {
            store_path: paths::dependency_store(registry_dir),
            lock_path: paths::dependency_lock(registry_dir),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock> {
        StoreLock::acquire_with(&self.lock_path, mode, self.retry)
    }

    /// Classify the on-disk store, refusing one from a newer major version
    pub fn state(&self) -> Result<StoreState> {
        let _guard = self.lock(LockMode::Shared)?;
        self.state_unlocked()
    }

    fn state_unlocked(&self) -> Result<StoreState> {
        let Some(store) = self.read_unlocked()? else {
            return Ok(StoreState::Absent);
        };
        Ok(if store.version == STORE_VERSION {
            StoreState::Current
        } else {
            StoreState::Stale
        })
    }

    /// Bring the store to the current state, rebuilding when needed
    pub fn assert_ready(&self, registry: &dyn PackageRegistry) -> Result<()> {
        let state = self.state()?;
        match state {
            StoreState::Current => Ok(()),
            StoreState::Absent | StoreState::Stale => {
                info!("Dependency store at {:?} is {:?}, rebuilding", self.store_path, state);
                self.rebuild(registry)
            }
        }
    }

    /// Record the dependencies of a freshly installed package, replacing
    /// any records from a previous version
    pub fn install_package(&self, descriptor: &dyn Descriptor) -> Result<()> {
        let key = descriptor.key();
        let records = records_of(descriptor);

        let _guard = self.lock(LockMode::Exclusive)?;
        let mut store = self.read_unlocked()?.unwrap_or_else(DependencyStore::new);
        store.set_forward(&key, records);
        self.write_unlocked(&store)?;

        debug!("Recorded dependencies of {}", key);
        Ok(())
    }

    /// Forget the dependencies declared by `key`
    pub fn uninstall_package(&self, key: &PackageKey) -> Result<()> {
        let _guard = self.lock(LockMode::Exclusive)?;
        let Some(mut store) = self.read_unlocked()? else {
            return Ok(());
        };
        store.set_forward(key, Vec::new());
        self.write_unlocked(&store)?;

        debug!("Removed dependency records of {}", key);
        Ok(())
    }

    /// Installed packages that declare a dependency on `key`
    pub fn get_dependent_packages(&self, key: &PackageKey) -> Result<Vec<PackageKey>> {
        let store = self.read()?;
        Ok(store.inverse(key).to_vec())
    }

    /// Dependents of `key` with the records through which they depend on it
    pub fn get_dependent_records(
        &self,
        key: &PackageKey,
    ) -> Result<Vec<(PackageKey, StoredDependency)>> {
        let store = self.read()?;
        let mut out = Vec::new();
        for dependent in store.inverse(key) {
            for record in store.forward(dependent) {
                if record.target(&dependent.channel) == *key {
                    out.push((dependent.clone(), record.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Forward records stored for `key`
    pub fn get_dependencies(&self, key: &PackageKey) -> Result<Vec<StoredDependency>> {
        let store = self.read()?;
        Ok(store.forward(key).to_vec())
    }

    /// Whether `package` depends on `target`, directly or transitively
    pub fn depends_on(&self, package: &PackageKey, target: &PackageKey) -> Result<bool> {
        let store = self.read()?;
        let mut visited = HashSet::new();
        Ok(reaches(&store, package, target, &mut visited))
    }

    /// Regenerate the store from every installed package
    pub fn rebuild(&self, registry: &dyn PackageRegistry) -> Result<()> {
        let installed = registry.installed_packages()?;

        let mut store = DependencyStore::new();
        for descriptor in &installed {
            let records = records_of(descriptor);
            if !records.is_empty() {
                let key = descriptor.key();
                store
                    .dependencies
                    .entry(key.channel)
                    .or_default()
                    .insert(key.name, records);
            }
        }
        store.reindex();

        let _guard = self.lock(LockMode::Exclusive)?;
        self.write_unlocked(&store)?;
        info!(
            "Rebuilt dependency store from {} installed package(s)",
            installed.len()
        );
        Ok(())
    }

    /// Throw the store away so the next [`assert_ready`](Self::assert_ready)
    /// rebuilds it from the registry
    ///
    /// Used when the registry changed but recording that change here
    /// failed. Takes no lock: the lock may be the reason the write failed.
    pub fn invalidate(&self) -> Result<()> {
        match fs::remove_file(&self.store_path) {
            Ok(()) => {
                warn!("Dropped dependency store {:?}, it will be rebuilt", self.store_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::IoError(format!(
                "Failed to remove {}: {}",
                self.store_path.display(),
                e
            ))),
        }
    }

    /// Current store contents under a shared lock; empty if absent
    pub fn read(&self) -> Result<DependencyStore> {
        let _guard = self.lock(LockMode::Shared)?;
        Ok(self.read_unlocked()?.unwrap_or_else(DependencyStore::new))
    }

    fn read_unlocked(&self) -> Result<Option<DependencyStore>> {
        let content = match fs::read_to_string(&self.store_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read {}: {}",
                    self.store_path.display(),
                    e
                )));
            }
        };

        let store: DependencyStore = match serde_json::from_str(&content) {
            Ok(store) => store,
            Err(e) => {
                warn!("Unreadable dependency store {:?}: {}", self.store_path, e);
                return Ok(Some(DependencyStore {
                    version: String::new(),
                    ..Default::default()
                }));
            }
        };

        if DependencyStore::major(&store.version) > DependencyStore::major(STORE_VERSION) {
            return Err(Error::IncompatibleStore {
                found: store.version,
                supported: STORE_VERSION.to_string(),
            });
        }
        Ok(Some(store))
    }

    /// Write via a temp file in the same directory and an atomic rename
    fn write_unlocked(&self, store: &DependencyStore) -> Result<()> {
        let dir = self
            .store_path
            .parent()
            .ok_or_else(|| Error::InvalidPath(self.store_path.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut temp, store)?;
        temp.flush()?;
        temp.persist(&self.store_path).map_err(|e| {
            Error::IoError(format!(
                "Failed to replace {}: {}",
                self.store_path.display(),
                e.error
            ))
        })?;
        Ok(())
    }
}

/// Forward records for every package dependency a descriptor declares
fn records_of(descriptor: &dyn Descriptor) -> Vec<StoredDependency> {
    descriptor
        .dependencies()
        .iter()
        .filter(|(_, _, dep)| dep.is_package())
        .map(|(section, group, dep)| StoredDependency::from_declaration(dep, section, group))
        .collect()
}

fn reaches(
    store: &DependencyStore,
    from: &PackageKey,
    target: &PackageKey,
    visited: &mut HashSet<PackageKey>,
) -> bool {
    if !visited.insert(from.clone()) {
        return false;
    }
    for record in store.forward(from) {
        let next = record.target(&from.channel);
        if next == *target || reaches(store, &next, target, visited) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRegistry;
    use crate::package::{DependencySet, ExtendedDescriptor, Manifest, PackageDescriptor, PackageId};
    use crate::version::{ReleaseState, Version};
    use tempfile::TempDir;

    fn descriptor(name: &str, requires: &[&str], optional: &[&str]) -> PackageDescriptor {
        let id = PackageId::new("c", name, Version::parse("1.0").unwrap(), ReleaseState::Stable);
        let mut deps = DependencySet::new();
        for r in requires {
            deps = deps.require(DependencyDeclaration::package("c", r));
        }
        for o in optional {
            deps = deps.recommend(DependencyDeclaration::package("c", o));
        }
        ExtendedDescriptor::new(id, deps, Manifest::new()).into()
    }

    fn key(name: &str) -> PackageKey {
        PackageKey::new("c", name)
    }

    #[test]
    fn test_install_records_both_indexes() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());

        db.install_package(&descriptor("A", &["B"], &["C"])).unwrap();

        assert_eq!(db.get_dependent_packages(&key("b")).unwrap(), vec![key("a")]);
        assert_eq!(db.get_dependent_packages(&key("c")).unwrap(), vec![key("a")]);
        let deps = db.get_dependencies(&key("a")).unwrap();
        assert_eq!(deps.len(), 2);
        assert!(deps[0].is_required());
        assert!(!deps[1].is_required());

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(db.path()).unwrap()).unwrap();
        assert_eq!(on_disk["_version"], STORE_VERSION);
        assert_eq!(on_disk["packages"]["c"]["b"][0]["package"], "a");
    }

    #[test]
    fn test_reinstall_replaces_records() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());

        db.install_package(&descriptor("A", &["B"], &[])).unwrap();
        db.install_package(&descriptor("A", &["D"], &[])).unwrap();

        assert!(db.get_dependent_packages(&key("b")).unwrap().is_empty());
        assert_eq!(db.get_dependent_packages(&key("d")).unwrap(), vec![key("a")]);
    }

    #[test]
    fn test_uninstall_removes_inverse_entries() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());

        db.install_package(&descriptor("A", &["B"], &[])).unwrap();
        db.uninstall_package(&key("a")).unwrap();

        assert!(db.get_dependent_packages(&key("b")).unwrap().is_empty());
        assert_eq!(db.read().unwrap(), DependencyStore::new());
    }

    #[test]
    fn test_depends_on_is_transitive_and_cycle_safe() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());

        db.install_package(&descriptor("A", &["B"], &[])).unwrap();
        db.install_package(&descriptor("B", &["C"], &[])).unwrap();
        db.install_package(&descriptor("C", &["A"], &[])).unwrap();

        assert!(db.depends_on(&key("a"), &key("c")).unwrap());
        assert!(db.depends_on(&key("c"), &key("b")).unwrap());
        assert!(!db.depends_on(&key("a"), &key("z")).unwrap());
    }

    #[test]
    fn test_dependent_records_carry_section() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());

        db.install_package(&descriptor("A", &["B"], &[])).unwrap();
        db.install_package(&descriptor("E", &[], &["B"])).unwrap();

        let records = db.get_dependent_records(&key("b")).unwrap();
        assert_eq!(records.len(), 2);
        let required: Vec<_> = records
            .iter()
            .filter(|(_, r)| r.is_required())
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(required, vec![key("a")]);
    }

    #[test]
    fn test_absent_store_is_rebuilt_from_registry() {
        let temp = TempDir::new().unwrap();
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.add_package(&descriptor("A", &["B"], &[])).unwrap();

        let db = DependencyDb::open(temp.path(), &registry).unwrap();
        assert_eq!(db.state().unwrap(), StoreState::Current);
        assert_eq!(db.get_dependent_packages(&key("b")).unwrap(), vec![key("a")]);
    }

    #[test]
    fn test_stale_store_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let store_path = paths::dependency_store(temp.path());
        fs::write(
            &store_path,
            r#"{"_version": "0.9", "dependencies": {}, "packages": {"c": {"x": []}}}"#,
        )
        .unwrap();

        let registry = SqliteRegistry::open_in_memory().unwrap();
        let db = DependencyDb::open(temp.path(), &registry).unwrap();
        assert_eq!(db.read().unwrap(), DependencyStore::new());
    }

    #[test]
    fn test_newer_major_is_incompatible() {
        let temp = TempDir::new().unwrap();
        fs::write(
            paths::dependency_store(temp.path()),
            r#"{"_version": "2.0", "dependencies": {}, "packages": {}}"#,
        )
        .unwrap();

        let registry = SqliteRegistry::open_in_memory().unwrap();
        let err = DependencyDb::open(temp.path(), &registry).err().unwrap();
        assert!(matches!(err, Error::IncompatibleStore { ref found, .. } if found == "2.0"));
    }

    #[test]
    fn test_held_lock_is_lock_error() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path()).with_retry(RetryPolicy::no_wait());
        let _held =
            StoreLock::acquire(paths::dependency_lock(temp.path()), LockMode::Exclusive).unwrap();

        let err = db.install_package(&descriptor("A", &["B"], &[])).err().unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_uri_dependency_target() {
        let temp = TempDir::new().unwrap();
        let db = DependencyDb::at(temp.path());
        let id = PackageId::new("c", "A", Version::parse("1.0").unwrap(), ReleaseState::Stable);
        let deps = DependencySet::new().require(
            DependencyDeclaration::new(crate::package::DependencyKind::Package, "Remote")
                .with_uri("https://example.test/Remote-1.0.tgz"),
        );
        let descriptor: PackageDescriptor = ExtendedDescriptor::new(id, deps, Manifest::new()).into();
        db.install_package(&descriptor).unwrap();

        assert_eq!(
            db.get_dependent_packages(&PackageKey::new(URI_CHANNEL, "remote"))
                .unwrap(),
            vec![key("a")]
        );
    }
}
