// src/installer/mod.rs

//! Package install and removal on top of file transactions
//!
//! An install moves a staged release into its role directories through one
//! [`FileTransaction`], then records the package in the registry and the
//! reverse-dependency database. Backups taken of overwritten files are
//! removed by a second transaction once everything is recorded.
//!
//! Removal refuses to break installed dependents unless told otherwise,
//! deletes the package's files, prunes its directories and unregisters it.

use crate::config::Config;
use crate::db::PackageRegistry;
use crate::depdb::DependencyDb;
use crate::error::{Error, Result};
use crate::package::{Descriptor, PackageDescriptor, PackageId, PackageKey};
use crate::transaction::{FileOperation, FileTransaction, TransactionOptions};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Mode given to scripts and extension binaries
const EXECUTABLE_MODE: u32 = 0o755;

/// Policy flags for install and removal
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Remove packages even if installed dependents need them
    pub force: bool,
    /// Turn file and dependency problems into warnings
    pub ignore_errors: bool,
    /// Keep warnings out of the log
    pub soft: bool,
    /// Do not check dependents on removal
    pub nodeps: bool,
    /// Only update the registry; leave files alone
    pub register_only: bool,
}

impl InstallOptions {
    fn transaction(&self) -> TransactionOptions {
        TransactionOptions {
            soft: self.soft,
            ignore_errors: self.ignore_errors,
        }
    }
}

/// What an install or removal did
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub id: PackageId,
    /// Installed or removed files
    pub files: Vec<PathBuf>,
    /// Files left alone (owned by another package or failed preflight)
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

impl InstallReport {
    fn new(id: PackageId) -> Self {
        Self {
            id,
            files: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

pub struct Installer<'a> {
    config: &'a Config,
    registry: &'a dyn PackageRegistry,
    depdb: &'a DependencyDb,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: &'a Config,
        registry: &'a dyn PackageRegistry,
        depdb: &'a DependencyDb,
        options: InstallOptions,
    ) -> Self {
        Self {
            config,
            registry,
            depdb,
            options,
        }
    }

    /// Install a release whose files are unpacked under `staged_dir`
    pub fn install(&self, mut descriptor: PackageDescriptor, staged_dir: &Path) -> Result<InstallReport> {
        let key = descriptor.key();
        let mut report = InstallReport::new(descriptor.id().clone());
        let previous = self.registry.find_package(&key)?;

        match &previous {
            Some(old) => info!("Upgrading {} from {}", descriptor.id(), old.id().version),
            None => info!("Installing {}", descriptor.id()),
        }

        let mut backups = Vec::new();
        if !self.options.register_only {
            let mut tx = FileTransaction::new(Some(key.clone()), self.options.transaction());
            tx.begin(false);
            backups = self.queue_install(&mut tx, &descriptor, staged_dir, previous.as_ref())?;

            let committed = match tx.commit(self.registry) {
                Ok(committed) => committed,
                Err(e) => {
                    warn!("Install of {} failed, rolling back", descriptor.id());
                    tx.rollback();
                    return Err(e);
                }
            };

            let log = tx.take_install_log();
            report.files = log.installed.values().cloned().collect();
            report.skipped = committed.skipped;
            report.warnings = committed.warnings;

            let manifest = descriptor.manifest_mut();
            manifest.apply(&log)?;
        }
        descriptor.manifest_mut().freeze();

        self.registry.add_package(&descriptor)?;
        if let Err(e) = self.depdb.install_package(&descriptor) {
            self.depdb_failed(&descriptor.id().to_string(), e, &mut report);
        }

        if !backups.is_empty() || previous.is_some() {
            self.clean_up(&descriptor, previous.as_ref(), backups, &mut report);
        }

        info!(
            "Installed {} ({} file(s), {} skipped)",
            descriptor.id(),
            report.files.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Queue the file operations of an install; returns the backed up paths
    fn queue_install(
        &self,
        tx: &mut FileTransaction,
        descriptor: &PackageDescriptor,
        staged_dir: &Path,
        previous: Option<&PackageDescriptor>,
    ) -> Result<Vec<PathBuf>> {
        let manifest = descriptor.manifest();
        let mut backups = Vec::new();
        let mut targets = BTreeSet::new();

        for (path, file) in manifest.files() {
            if !file.role.is_installable() {
                debug!("Not installing {} ({} file)", path, file.role);
                continue;
            }

            let relative = manifest
                .install_path(path)
                .ok_or_else(|| Error::NotFound(format!("{} is not in the manifest", path)))?;
            check_relative(&relative)?;

            let base_dir = self.config.role_dir(file.role);
            let dest = base_dir.join(&relative);
            let relative_dir = relative.parent().map(Path::to_path_buf).unwrap_or_default();

            if let Some(parent) = dest.parent() {
                tx.queue(FileOperation::Mkdir(parent.to_path_buf()));
            }
            if dest.exists() {
                tx.queue(FileOperation::Backup(dest.clone()));
                backups.push(dest.clone());
            }
            tx.queue(FileOperation::Rename {
                from: staged_dir.join(path),
                to: dest.clone(),
            });
            if file.role.is_executable() {
                tx.queue(FileOperation::Chmod {
                    mode: EXECUTABLE_MODE,
                    path: dest.clone(),
                });
            }
            tx.queue(FileOperation::MarkInstalled {
                file: path.to_string(),
                installed_as: dest.clone(),
                base_dir,
                relative_dir,
            });
            targets.insert(dest);
        }

        // Files the new release no longer ships
        if let Some(old) = previous {
            for stale in old.manifest().installed_paths() {
                if targets.contains(&stale) {
                    continue;
                }
                tx.queue(FileOperation::Backup(stale.clone()));
                tx.queue(FileOperation::Delete(stale.clone()));
                backups.push(stale);
            }
        }

        Ok(backups)
    }

    /// Drop backups and directories the previous release left behind
    fn clean_up(
        &self,
        descriptor: &PackageDescriptor,
        previous: Option<&PackageDescriptor>,
        backups: Vec<PathBuf>,
        report: &mut InstallReport,
    ) {
        let mut tx = FileTransaction::new(Some(descriptor.key()), self.options.transaction());
        tx.begin(false);
        for path in backups {
            tx.queue(FileOperation::RemoveBackup(path));
        }
        if let Some(old) = previous {
            let current = descriptor.manifest().dir_tree();
            tx.queue_prune(
                old.manifest()
                    .dir_tree()
                    .iter()
                    .filter(|dir| !current.contains(*dir))
                    .cloned(),
            );
        }

        match tx.commit(self.registry) {
            Ok(committed) => report.warnings.extend(committed.warnings),
            Err(e) => {
                let message = format!("Cleanup after installing {} failed: {}", descriptor.id(), e);
                self.warn(&message);
                report.warnings.push(message);
            }
        }
    }

    /// Remove an installed package
    ///
    /// Packages in `also_removing` are going away in the same batch, so
    /// their dependencies on this one do not count.
    pub fn uninstall(&self, key: &PackageKey, also_removing: &[PackageKey]) -> Result<InstallReport> {
        let descriptor = self
            .registry
            .find_package(key)?
            .ok_or_else(|| Error::NotFound(format!("{} is not installed", key)))?;
        let mut report = InstallReport::new(descriptor.id().clone());

        if !self.options.nodeps {
            self.check_dependents(&descriptor, also_removing, &mut report)?;
        }

        info!("Removing {}", descriptor.id());
        if !self.options.register_only {
            let mut tx = FileTransaction::new(Some(key.clone()), self.options.transaction());
            tx.begin(false);
            let files = descriptor.manifest().installed_paths();
            for path in &files {
                tx.queue(FileOperation::Delete(path.clone()));
            }
            let committed = match tx.commit(self.registry) {
                Ok(committed) => committed,
                Err(e) => {
                    tx.rollback();
                    return Err(e);
                }
            };
            report.files = files
                .into_iter()
                .filter(|p| !committed.skipped.contains(p))
                .collect();
            report.skipped = committed.skipped;
            report.warnings.extend(committed.warnings);

            let mut prune = FileTransaction::new(Some(key.clone()), self.options.transaction());
            prune.begin(false);
            prune.queue_prune(descriptor.manifest().dir_tree().iter().cloned());
            match prune.commit(self.registry) {
                Ok(committed) => report.warnings.extend(committed.warnings),
                Err(e) => {
                    let message = format!("Could not prune directories of {}: {}", descriptor.id(), e);
                    self.warn(&message);
                    report.warnings.push(message);
                }
            }
        }

        self.registry.remove_package(key)?;
        if let Err(e) = self.depdb.uninstall_package(key) {
            self.depdb_failed(&descriptor.id().to_string(), e, &mut report);
        }
        info!("Removed {} ({} file(s))", descriptor.id(), report.files.len());
        Ok(report)
    }

    /// The registry already changed, so the store no longer matches it
    fn depdb_failed(&self, package: &str, error: Error, report: &mut InstallReport) {
        let mut message = format!("Could not record dependencies of {}: {}", package, error);
        if let Err(e) = self.depdb.invalidate() {
            message.push_str(&format!("; run rebuild-db ({})", e));
        }
        self.warn(&message);
        report.warnings.push(message);
    }

    fn check_dependents(
        &self,
        descriptor: &PackageDescriptor,
        also_removing: &[PackageKey],
        report: &mut InstallReport,
    ) -> Result<()> {
        self.depdb.assert_ready(self.registry)?;
        let key = descriptor.key();
        let mut reasons = Vec::new();

        for (dependent, record) in self.depdb.get_dependent_records(&key)? {
            if also_removing.contains(&dependent) {
                continue;
            }
            let dep = record.declaration()?;
            if dep.is_conflict() {
                continue;
            }
            let wanted = dep.describe(&dependent.channel);
            if record.is_required() {
                reasons.push(format!("{} requires {}", dependent, wanted));
            } else {
                let message = format!("{} can optionally use {}", dependent, wanted);
                self.warn(&message);
                report.warnings.push(message);
            }
        }

        if reasons.is_empty() {
            return Ok(());
        }
        if self.options.force || self.options.ignore_errors {
            for reason in reasons {
                let message = format!("Removing {} anyway: {}", descriptor.id(), reason);
                self.warn(&message);
                report.warnings.push(message);
            }
            return Ok(());
        }
        Err(Error::DependencyValidationFailure {
            package: descriptor.id().to_string(),
            reasons,
        })
    }

    fn warn(&self, message: &str) {
        if self.options.soft {
            debug!("{}", message);
        } else {
            warn!("{}", message);
        }
    }
}

/// Manifest paths must stay inside their role directory
fn check_relative(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty()
        || !path.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(Error::InvalidPath(format!(
            "{} escapes its install directory",
            path.display()
        )));
    }
    Ok(())
}
