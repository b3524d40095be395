// src/transaction/mod.rs

//! File transactions for package install and removal
//!
//! Operations are queued in memory and only touch the filesystem on
//! `commit`. A commit runs in two phases:
//!
//! - **Preflight**: every queued operation is checked (sources exist,
//!   destinations are writable, ownership) and all violations are reported
//!   together. Nothing is touched if preflight fails.
//! - **Apply**: operations run in queue order and stop at the first
//!   failure. The caller then decides whether to `rollback`.
//!
//! Rollback is best effort and runs over the applied operations in reverse.
//! Backups are restored, renamed files and new directories are removed, and
//! install-log entries are forgotten. Applied `chmod` and `delete`
//! operations are left as they are.

use crate::db::PackageRegistry;
use crate::package::{InstallLog, PackageKey};
use crate::Result;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One queued filesystem operation
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    /// Copy `path` to `path.bak` if it exists
    Backup(PathBuf),
    /// Remove `path.bak`
    RemoveBackup(PathBuf),
    /// Copy `from` over `to` keeping permissions, then delete `from`
    Rename { from: PathBuf, to: PathBuf },
    Chmod { mode: u32, path: PathBuf },
    Delete(PathBuf),
    /// Remove a directory if it is empty
    Rmdir(PathBuf),
    /// Create a directory and any missing parents
    Mkdir(PathBuf),
    /// Record a file as installed in the transaction's install log
    MarkInstalled {
        file: String,
        installed_as: PathBuf,
        base_dir: PathBuf,
        relative_dir: PathBuf,
    },
}

impl FileOperation {
    /// Path the operation acts on
    pub fn target(&self) -> &Path {
        match self {
            FileOperation::Backup(p)
            | FileOperation::RemoveBackup(p)
            | FileOperation::Delete(p)
            | FileOperation::Rmdir(p)
            | FileOperation::Mkdir(p) => p,
            FileOperation::Rename { to, .. } => to,
            FileOperation::Chmod { path, .. } => path,
            FileOperation::MarkInstalled { installed_as, .. } => installed_as,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileOperation::Backup(_) => "backup",
            FileOperation::RemoveBackup(_) => "remove-backup",
            FileOperation::Rename { .. } => "rename",
            FileOperation::Chmod { .. } => "chmod",
            FileOperation::Delete(_) => "delete",
            FileOperation::Rmdir(_) => "rmdir",
            FileOperation::Mkdir(_) => "mkdir",
            FileOperation::MarkInstalled { .. } => "mark-installed",
        }
    }
}

/// Policy flags for a transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Only log warnings at debug level
    pub soft: bool,
    /// Log preflight violations and skip the offending operations
    pub ignore_errors: bool,
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub applied: usize,
    /// Targets whose operations were turned into no-ops
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// An operation that reached the filesystem
#[derive(Debug)]
struct AppliedOperation {
    op: FileOperation,
    /// Directories created while applying, outermost first
    created_dirs: Vec<PathBuf>,
}

/// Queue of file operations for one package
pub struct FileTransaction {
    owner: Option<PackageKey>,
    options: TransactionOptions,
    operations: Vec<FileOperation>,
    applied: Vec<AppliedOperation>,
    log: InstallLog,
}

impl FileTransaction {
    /// Transaction acting on behalf of `owner`
    pub fn new(owner: Option<PackageKey>, options: TransactionOptions) -> Self {
        Self {
            owner,
            options,
            operations: Vec::new(),
            applied: Vec::new(),
            log: InstallLog::new(),
        }
    }

    /// Start a fresh queue, rolling back whatever is pending if asked to
    pub fn begin(&mut self, rollback_pending: bool) {
        if rollback_pending && (!self.operations.is_empty() || !self.applied.is_empty()) {
            log::debug!("Rolling back {} pending operation(s)", self.operations.len());
            self.rollback();
        }
        self.operations.clear();
        self.applied.clear();
    }

    pub fn queue(&mut self, op: FileOperation) {
        self.operations.push(op);
    }

    /// Queue removal of `dirs`, deepest first
    pub fn queue_prune<I: IntoIterator<Item = PathBuf>>(&mut self, dirs: I) {
        for dir in deepest_first(dirs) {
            self.operations.push(FileOperation::Rmdir(dir));
        }
    }

    pub fn operations(&self) -> &[FileOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn install_log(&self) -> &InstallLog {
        &self.log
    }

    pub fn take_install_log(&mut self) -> InstallLog {
        std::mem::take(&mut self.log)
    }

    /// Check and apply every queued operation
    pub fn commit(&mut self, registry: &dyn PackageRegistry) -> Result<CommitReport> {
        let mut report = CommitReport::default();
        let skip = self.preflight(registry, &mut report)?;

        let operations = std::mem::take(&mut self.operations);
        self.applied.clear();

        for (index, op) in operations.into_iter().enumerate() {
            if skip.contains(&index) {
                continue;
            }

            match self.apply(&op) {
                Ok(created_dirs) => {
                    self.applied.push(AppliedOperation { op, created_dirs });
                    report.applied += 1;
                }
                Err(e) => {
                    let path = op.target().to_path_buf();
                    log::error!("{} of {} failed: {}", op.kind(), path.display(), e);
                    return Err(crate::Error::TransactionCommitFailure {
                        paths: vec![path],
                        messages: vec![format!("{} failed: {}", op.kind(), e)],
                    });
                }
            }
        }

        log::debug!(
            "Committed {} file operation(s), skipped {}",
            report.applied,
            report.skipped.len()
        );
        self.applied.clear();
        Ok(report)
    }

    /// Collect every violation; returns the indexes to skip
    fn preflight(
        &self,
        registry: &dyn PackageRegistry,
        report: &mut CommitReport,
    ) -> Result<HashSet<usize>> {
        let mut skip = HashSet::new();
        let mut foreign: HashSet<PathBuf> = HashSet::new();
        let mut violations: Vec<(usize, PathBuf, String)> = Vec::new();

        for (index, op) in self.operations.iter().enumerate() {
            match op {
                FileOperation::Rename { from, to } => {
                    if self.owned_by_other(registry, to)? {
                        foreign.insert(to.clone());
                        skip.insert(index);
                        continue;
                    }
                    if !from.exists() {
                        violations.push((
                            index,
                            from.clone(),
                            format!("cannot install, {} does not exist", from.display()),
                        ));
                    }
                    if !writable_target(to) {
                        violations.push((
                            index,
                            to.clone(),
                            format!("cannot install, {} is not writable", to.display()),
                        ));
                    }
                }
                FileOperation::Delete(path) => {
                    if self.owned_by_other(registry, path)? {
                        foreign.insert(path.clone());
                        skip.insert(index);
                        continue;
                    }
                    if !path.exists() {
                        self.warn(
                            report,
                            format!("{} does not exist, cannot be deleted", path.display()),
                        );
                    } else if !writable_target(path) || !path.parent().is_some_and(writable_target) {
                        violations.push((
                            index,
                            path.clone(),
                            format!("cannot delete {}, not writable", path.display()),
                        ));
                    }
                }
                FileOperation::Chmod { path, .. } => {
                    if !writable_target(path) {
                        violations.push((
                            index,
                            path.clone(),
                            format!("cannot chmod {}, not writable", path.display()),
                        ));
                    }
                }
                _ => {}
            }
        }

        // Follow-up operations on a skipped destination are skipped too
        for (index, op) in self.operations.iter().enumerate() {
            if matches!(op, FileOperation::Chmod { .. } | FileOperation::MarkInstalled { .. })
                && foreign.contains(op.target())
            {
                skip.insert(index);
            }
        }
        for path in &foreign {
            self.warn(
                report,
                format!("{} belongs to another package, leaving it alone", path.display()),
            );
            report.skipped.push(path.clone());
        }

        if violations.is_empty() {
            return Ok(skip);
        }

        if self.options.ignore_errors {
            let mut dropped = HashSet::new();
            for (index, path, message) in violations {
                self.warn(report, message);
                dropped.insert(self.operations[index].target().to_path_buf());
                report.skipped.push(path);
                skip.insert(index);
            }
            for (index, op) in self.operations.iter().enumerate() {
                if matches!(op, FileOperation::MarkInstalled { .. }) && dropped.contains(op.target()) {
                    skip.insert(index);
                }
            }
            return Ok(skip);
        }

        for (_, _, message) in &violations {
            log::error!("{}", message);
        }
        let (paths, messages) = violations
            .into_iter()
            .map(|(_, path, message)| (path, message))
            .unzip();
        Err(crate::Error::TransactionCommitFailure { paths, messages })
    }

    fn owned_by_other(&self, registry: &dyn PackageRegistry, path: &Path) -> Result<bool> {
        Ok(match registry.file_owner(path)? {
            Some(owner) => self.owner.as_ref() != Some(&owner),
            None => false,
        })
    }

    fn warn(&self, report: &mut CommitReport, message: String) {
        if self.options.soft {
            log::debug!("{}", message);
        } else {
            log::warn!("{}", message);
        }
        report.warnings.push(message);
    }

    fn apply(&mut self, op: &FileOperation) -> io::Result<Vec<PathBuf>> {
        match op {
            FileOperation::Backup(path) => {
                if path.exists() {
                    fs::copy(path, backup_path(path))?;
                }
                Ok(Vec::new())
            }
            FileOperation::RemoveBackup(path) => {
                remove_if_exists(&backup_path(path))?;
                Ok(Vec::new())
            }
            FileOperation::Rename { from, to } => {
                let created = match to.parent() {
                    Some(parent) => create_dirs(parent)?,
                    None => Vec::new(),
                };
                fs::copy(from, to)?;
                fs::remove_file(from)?;
                Ok(created)
            }
            FileOperation::Chmod { mode, path } => {
                set_mode(path, *mode)?;
                Ok(Vec::new())
            }
            FileOperation::Delete(path) => {
                remove_if_exists(path)?;
                Ok(Vec::new())
            }
            FileOperation::Rmdir(dir) => {
                remove_dir_if_empty(dir)?;
                Ok(Vec::new())
            }
            FileOperation::Mkdir(dir) => create_dirs(dir),
            FileOperation::MarkInstalled {
                file,
                installed_as,
                base_dir,
                relative_dir,
            } => {
                self.log.record(file, installed_as, base_dir, relative_dir);
                Ok(Vec::new())
            }
        }
    }

    /// Undo the applied operations, newest first, and drop the queue
    pub fn rollback(&mut self) {
        let applied = std::mem::take(&mut self.applied);
        for AppliedOperation { op, created_dirs } in applied.into_iter().rev() {
            let outcome = match &op {
                FileOperation::Backup(path) => restore_backup(path),
                FileOperation::Rename { from, to } => {
                    let removed = remove_if_exists(to);
                    let _ = remove_if_exists(from);
                    removed.and_then(|_| remove_created(&created_dirs))
                }
                FileOperation::Mkdir(_) => remove_created(&created_dirs),
                FileOperation::MarkInstalled { file, .. } => {
                    self.log.forget(file);
                    Ok(())
                }
                FileOperation::RemoveBackup(_)
                | FileOperation::Chmod { .. }
                | FileOperation::Delete(_)
                | FileOperation::Rmdir(_) => Ok(()),
            };

            if let Err(e) = outcome {
                log::warn!(
                    "Rollback of {} {} failed: {}",
                    op.kind(),
                    op.target().display(),
                    e
                );
            }
        }

        self.operations.clear();
        log::debug!("File transaction rolled back");
    }
}

/// `path` with `.bak` appended to its file name
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Order directories so children come before their parents
pub fn deepest_first<I: IntoIterator<Item = PathBuf>>(dirs: I) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
    dirs.sort();
    dirs.dedup();
    dirs.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| b.cmp(a))
    });
    dirs
}

fn restore_backup(path: &Path) -> io::Result<()> {
    let backup = backup_path(path);
    if backup.exists() {
        remove_if_exists(path)?;
        fs::copy(&backup, path)?;
        fs::remove_file(&backup)?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn remove_dir_if_empty(dir: &Path) -> io::Result<()> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                fs::remove_dir(dir)?;
            } else {
                log::debug!("Keeping non-empty directory {}", dir.display());
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create `dir` and missing parents; returns what was created, outermost first
fn create_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        missing.push(path.to_path_buf());
        current = path.parent();
    }
    missing.reverse();

    if !missing.is_empty() {
        fs::create_dir_all(dir)?;
    }
    Ok(missing)
}

fn remove_created(created: &[PathBuf]) -> io::Result<()> {
    for dir in created.iter().rev() {
        remove_dir_if_empty(dir)?;
    }
    Ok(())
}

/// Whether `path` could be written, judged at its nearest existing ancestor
fn writable_target(path: &Path) -> bool {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if candidate.exists() {
            return is_writable(candidate);
        }
        current = candidate.parent();
    }
    false
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRegistry;
    use crate::package::{
        DependencySet, ExtendedDescriptor, FileRole, Manifest, PackageDescriptor, PackageId,
    };
    use crate::version::{ReleaseState, Version};
    use tempfile::TempDir;

    fn owner() -> Option<PackageKey> {
        Some(PackageKey::new("c", "a"))
    }

    fn registry() -> SqliteRegistry {
        SqliteRegistry::open_in_memory().unwrap()
    }

    #[test]
    fn test_rename_and_mark_installed() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("A.php");
        fs::write(&staged, b"<?php").unwrap();
        let dest = temp.path().join("root/code/A.php");

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.begin(false);
        tx.queue(FileOperation::Mkdir(temp.path().join("root/code")));
        tx.queue(FileOperation::Rename {
            from: staged.clone(),
            to: dest.clone(),
        });
        tx.queue(FileOperation::MarkInstalled {
            file: "A.php".into(),
            installed_as: dest.clone(),
            base_dir: temp.path().join("root/code"),
            relative_dir: PathBuf::new(),
        });

        let report = tx.commit(&registry()).unwrap();
        assert_eq!(report.applied, 3);
        assert!(!staged.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"<?php");
        assert_eq!(tx.install_log().installed.get("A.php"), Some(&dest));
        assert!(tx.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_keeps_permissions_and_chmod_applies() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("tool");
        fs::write(&staged, b"#!/bin/sh").unwrap();
        fs::set_permissions(&staged, fs::Permissions::from_mode(0o640)).unwrap();
        let dest = temp.path().join("bin/tool");
        let other = temp.path().join("data");
        fs::write(&other, b"x").unwrap();

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue(FileOperation::Rename {
            from: staged,
            to: dest.clone(),
        });
        tx.queue(FileOperation::Chmod {
            mode: 0o755,
            path: other.clone(),
        });
        tx.commit(&registry()).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dest), 0o640);
        assert_eq!(mode(&other), 0o755);
    }

    #[test]
    fn test_preflight_reports_all_errors_and_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("keep.php");
        fs::write(&existing, b"old").unwrap();
        let new_dir = temp.path().join("newdir");

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue(FileOperation::Mkdir(new_dir.clone()));
        tx.queue(FileOperation::Backup(existing.clone()));
        tx.queue(FileOperation::Rename {
            from: temp.path().join("missing1"),
            to: temp.path().join("out1"),
        });
        tx.queue(FileOperation::Rename {
            from: temp.path().join("missing2"),
            to: temp.path().join("out2"),
        });

        let err = tx.commit(&registry()).err().unwrap();
        match err {
            crate::Error::TransactionCommitFailure { paths, messages } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(messages.len(), 2);
                assert!(paths.contains(&temp.path().join("missing1")));
                assert!(paths.contains(&temp.path().join("missing2")));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!new_dir.exists());
        assert!(!backup_path(&existing).exists());
        assert_eq!(tx.operations().len(), 4);
    }

    #[test]
    fn test_ignore_errors_skips_bad_operations() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good");
        fs::write(&good, b"g").unwrap();

        let options = TransactionOptions {
            ignore_errors: true,
            ..Default::default()
        };
        let mut tx = FileTransaction::new(owner(), options);
        tx.queue(FileOperation::Rename {
            from: temp.path().join("missing"),
            to: temp.path().join("out/missing"),
        });
        tx.queue(FileOperation::Rename {
            from: good,
            to: temp.path().join("out/good"),
        });

        let report = tx.commit(&registry()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, vec![temp.path().join("missing")]);
        assert!(temp.path().join("out/good").exists());
    }

    #[test]
    fn test_foreign_destination_is_skipped_with_warning() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("shared.php");
        fs::write(&dest, b"owned by c").unwrap();
        let staged = temp.path().join("staged.php");
        fs::write(&staged, b"from a").unwrap();

        let registry = registry();
        let mut manifest = Manifest::new().with_file("shared.php", FileRole::RuntimeCode);
        manifest.set_installed("shared.php", dest.clone()).unwrap();
        let other: PackageDescriptor = ExtendedDescriptor::new(
            PackageId::new("c", "C", Version::parse("1.0").unwrap(), ReleaseState::Stable),
            DependencySet::new(),
            manifest,
        )
        .into();
        registry.add_package(&other).unwrap();

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue(FileOperation::Rename {
            from: staged.clone(),
            to: dest.clone(),
        });
        tx.queue(FileOperation::MarkInstalled {
            file: "shared.php".into(),
            installed_as: dest.clone(),
            base_dir: temp.path().to_path_buf(),
            relative_dir: PathBuf::new(),
        });

        let report = tx.commit(&registry).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.skipped, vec![dest.clone()]);
        assert!(report.warnings[0].contains("belongs to another package"));
        assert_eq!(fs::read(&dest).unwrap(), b"owned by c");
        assert!(staged.exists());
        assert!(tx.install_log().is_empty());
    }

    #[test]
    fn test_rollback_after_apply_failure() {
        let temp = TempDir::new().unwrap();
        let existing = temp.path().join("lib/A.php");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"old").unwrap();
        let staged = temp.path().join("A.php");
        fs::write(&staged, b"new").unwrap();
        let doomed = temp.path().join("doomed");
        fs::write(&doomed, b"bye").unwrap();
        let new_dir = temp.path().join("fresh/nested");

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue(FileOperation::Mkdir(new_dir.clone()));
        tx.queue(FileOperation::Backup(existing.clone()));
        tx.queue(FileOperation::Rename {
            from: staged.clone(),
            to: existing.clone(),
        });
        tx.queue(FileOperation::Delete(doomed.clone()));
        tx.queue(FileOperation::MarkInstalled {
            file: "A.php".into(),
            installed_as: existing.clone(),
            base_dir: temp.path().join("lib"),
            relative_dir: PathBuf::new(),
        });
        // Passes preflight (parent is writable) but the file never appears
        tx.queue(FileOperation::Chmod {
            mode: 0o644,
            path: temp.path().join("vanishes"),
        });

        assert!(tx.commit(&registry()).is_err());
        assert_eq!(fs::read(&existing).unwrap(), b"new");
        assert!(!doomed.exists());

        tx.rollback();
        assert_eq!(fs::read(&existing).unwrap(), b"old");
        assert!(!backup_path(&existing).exists());
        assert!(!temp.path().join("fresh").exists());
        assert!(!doomed.exists());
        assert!(tx.install_log().is_empty());
    }

    #[test]
    fn test_prune_deepest_first_only_empty() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("a");
        fs::create_dir_all(base.join("b/c")).unwrap();
        fs::create_dir_all(base.join("keep")).unwrap();
        fs::write(base.join("keep/file"), b"x").unwrap();

        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue_prune(vec![
            base.clone(),
            base.join("b"),
            base.join("b/c"),
            base.join("keep"),
        ]);
        assert_eq!(tx.operations()[0], FileOperation::Rmdir(base.join("b/c")));
        tx.commit(&registry()).unwrap();

        assert!(!base.join("b").exists());
        assert!(base.join("keep/file").exists());
        assert!(base.exists());
    }

    #[test]
    fn test_begin_discards_pending_queue() {
        let mut tx = FileTransaction::new(owner(), TransactionOptions::default());
        tx.queue(FileOperation::Delete(PathBuf::from("/nonexistent/x")));
        tx.begin(true);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_deepest_first_order() {
        let dirs = deepest_first(vec![
            PathBuf::from("/r"),
            PathBuf::from("/r/a/b"),
            PathBuf::from("/r/a"),
            PathBuf::from("/r/a/b"),
        ]);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/r/a/b"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r")
            ]
        );
    }
}
