// src/db/mod.rs

//! Installed-package registry
//!
//! The registry records every installed package with its declared
//! dependencies, manifest, and the directories its install created. The
//! resolver, installer and dependency store only see it through the
//! [`PackageRegistry`] trait.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::{Error, Result};
use crate::package::{
    DependencyDeclaration, DependencyGroup, DependencySection, DependencySet, Descriptor,
    DescriptorSchema, ExtendedDescriptor, FileRole, LegacyDescriptor, Manifest, PackageDescriptor,
    PackageId, PackageKey, WireDependency,
};
use crate::version::{ReleaseState, Version};
use models::{DependencyEntry, DirectoryEntry, FileEntry, PackageEntry};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read and write access to installed packages
pub trait PackageRegistry {
    /// Every installed package
    fn installed_packages(&self) -> Result<Vec<PackageDescriptor>>;

    fn find_package(&self, key: &PackageKey) -> Result<Option<PackageDescriptor>>;

    /// Package that installed the file at `path`
    fn file_owner(&self, path: &Path) -> Result<Option<PackageKey>>;

    /// Record a package, replacing any installed version of it
    fn add_package(&self, descriptor: &PackageDescriptor) -> Result<()>;

    /// Forget a package; returns whether it was installed
    fn remove_package(&self, key: &PackageKey) -> Result<bool>;

    fn is_installed(&self, key: &PackageKey) -> Result<bool> {
        Ok(self.find_package(key)?.is_some())
    }
}

/// Registry stored in SQLite
pub struct SqliteRegistry {
    conn: Connection,
}

impl SqliteRegistry {
    /// Open (creating if needed) the registry database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Rebuild a descriptor from its rows
    fn load(&self, entry: &PackageEntry) -> Result<PackageDescriptor> {
        let package_id = entry
            .id
            .ok_or_else(|| Error::NotFound("Package row has no id".to_string()))?;

        let id = PackageId::new(
            &entry.channel,
            &entry.name,
            Version::parse(&entry.version)?,
            entry.state.parse::<ReleaseState>()?,
        );

        let mut deps = DependencySet::new();
        for row in DependencyEntry::find_by_package(&self.conn, package_id)? {
            let wire: WireDependency = serde_json::from_str(&row.record)?;
            let dep = DependencyDeclaration::from_wire(&wire)?;
            match row.section.parse::<DependencySection>()? {
                DependencySection::Required => deps.required.push(dep),
                DependencySection::Optional => deps.optional.push(dep),
                DependencySection::Group => {
                    let name = row.group_name.unwrap_or_default();
                    match deps.groups.iter_mut().find(|g| g.name == name) {
                        Some(group) => group.dependencies.push(dep),
                        None => deps.groups.push(DependencyGroup {
                            name,
                            hint: row.group_hint,
                            dependencies: vec![dep],
                        }),
                    }
                }
            }
        }

        let files = FileEntry::find_by_package(&self.conn, package_id)?;
        let mut manifest = Manifest::new();
        for file in &files {
            let role: FileRole = file.role.parse()?;
            manifest = match file.install_as {
                Some(ref target) => manifest.with_file_as(&file.source_path, role, target),
                None => manifest.with_file(&file.source_path, role),
            };
        }
        for file in &files {
            if let Some(ref installed) = file.installed_path {
                manifest.set_installed(&file.source_path, PathBuf::from(installed))?;
            }
        }
        for dir in DirectoryEntry::find_by_package(&self.conn, package_id)? {
            manifest.add_dir(PathBuf::from(dir.path))?;
        }
        manifest.freeze();

        let descriptor: PackageDescriptor = match entry.schema.parse::<DescriptorSchema>()? {
            DescriptorSchema::Legacy => LegacyDescriptor::new(id, deps, manifest)?.into(),
            DescriptorSchema::Extended => ExtendedDescriptor::new(id, deps, manifest).into(),
        };

        Ok(match entry.archive_url {
            Some(ref url) => descriptor.with_archive_url(url),
            None => descriptor,
        })
    }
}

impl PackageRegistry for SqliteRegistry {
    fn installed_packages(&self) -> Result<Vec<PackageDescriptor>> {
        PackageEntry::list_all(&self.conn)?
            .iter()
            .map(|entry| self.load(entry))
            .collect()
    }

    fn find_package(&self, key: &PackageKey) -> Result<Option<PackageDescriptor>> {
        match PackageEntry::find_by_name(&self.conn, &key.channel, &key.name)? {
            Some(entry) => Ok(Some(self.load(&entry)?)),
            None => Ok(None),
        }
    }

    fn file_owner(&self, path: &Path) -> Result<Option<PackageKey>> {
        let Some(file) = FileEntry::find_by_installed_path(&self.conn, &path.to_string_lossy())? else {
            return Ok(None);
        };
        Ok(PackageEntry::find_by_id(&self.conn, file.package_id)?
            .map(|p| PackageKey::new(&p.channel, &p.name)))
    }

    fn add_package(&self, descriptor: &PackageDescriptor) -> Result<()> {
        let id = descriptor.id();
        let tx = self.conn.unchecked_transaction()?;

        if let Some(existing) = PackageEntry::find_by_name(&tx, &id.channel, &id.name)?
            && let Some(existing_id) = existing.id
        {
            PackageEntry::delete(&tx, existing_id)?;
        }

        let mut entry = PackageEntry::new(
            id.channel.clone(),
            id.name.clone(),
            id.version.to_string(),
            id.state.as_str().to_string(),
            descriptor.schema().as_str().to_string(),
        );
        entry.archive_url = descriptor.archive_url().map(str::to_string);
        let package_id = entry.insert(&tx)?;

        let deps = descriptor.dependencies();
        for dep in &deps.required {
            DependencyEntry::new(package_id, "required", serde_json::to_string(&dep.to_wire())?)
                .insert(&tx)?;
        }
        for dep in &deps.optional {
            DependencyEntry::new(package_id, "optional", serde_json::to_string(&dep.to_wire())?)
                .insert(&tx)?;
        }
        for group in &deps.groups {
            for dep in &group.dependencies {
                DependencyEntry::new(package_id, "group", serde_json::to_string(&dep.to_wire())?)
                    .in_group(&group.name, group.hint.as_deref())
                    .insert(&tx)?;
            }
        }

        for (path, file) in descriptor.manifest().files() {
            let mut row = FileEntry::new(package_id, path.to_string(), file.role.as_str().to_string());
            row.install_as = file.install_as.clone();
            row.installed_path = file
                .installed_as
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned());
            row.insert(&tx)?;
        }

        for dir in descriptor.manifest().dir_tree() {
            DirectoryEntry::new(package_id, dir.to_string_lossy().into_owned()).insert(&tx)?;
        }

        tx.commit()?;
        debug!("Registered {}", id);
        Ok(())
    }

    fn remove_package(&self, key: &PackageKey) -> Result<bool> {
        match PackageEntry::find_by_name(&self.conn, &key.channel, &key.name)? {
            Some(PackageEntry { id: Some(id), .. }) => {
                PackageEntry::delete(&self.conn, id)?;
                debug!("Unregistered {}", key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
