// src/session.rs

//! Session orchestration
//!
//! A [`Session`] ties the pieces together for one invocation: it owns the
//! configuration, the installed-package registry, a release source and the
//! reverse-dependency databases it has opened, keyed by registry directory.

use crate::config::Config;
use crate::db::{PackageRegistry, SqliteRegistry, paths};
use crate::depdb::DependencyDb;
use crate::error::{Error, Result};
use crate::installer::{InstallOptions, InstallReport, Installer};
use crate::package::{Descriptor, PackageDescriptor, PackageKey, PackageRef, URI_CHANNEL};
use crate::repository::{
    MetadataClient, ReleaseSource, RestChannelSource, extract_archive, url_basename,
};
use crate::resolver::{
    HostEnvironment, Resolution, ResolveFailure, ResolveOptions, Resolver, sort_for_install,
    sort_for_uninstall,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Policy flags shared by every session operation
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    pub soft: bool,
    pub ignore_errors: bool,
    pub nodeps: bool,
    pub force: bool,
    pub alldeps: bool,
    pub onlyreqdeps: bool,
    /// Replace a different installed version with a newer one
    pub upgrade: bool,
    /// Cached metadata and already downloaded archives only
    pub offline: bool,
    pub register_only: bool,
}

impl Policy {
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            soft: self.soft,
            ignore_errors: self.ignore_errors,
            nodeps: self.nodeps,
            force: self.force,
            alldeps: self.alldeps,
            onlyreqdeps: self.onlyreqdeps,
            upgrade: self.upgrade,
            offline: self.offline,
            downloadonly: false,
        }
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            force: self.force,
            ignore_errors: self.ignore_errors,
            soft: self.soft,
            nodeps: self.nodeps,
            register_only: self.register_only,
        }
    }
}

/// Outcome of a session install
#[derive(Debug, Default)]
pub struct InstallSummary {
    /// One report per installed package, in install order
    pub installed: Vec<InstallReport>,
    pub warnings: Vec<String>,
    /// Requests or dependencies dropped during resolution
    pub failures: Vec<ResolveFailure>,
}

pub struct Session {
    config: Config,
    registry: SqliteRegistry,
    source: Box<dyn ReleaseSource>,
    /// Fetches remote archives; `None` for offline sessions
    client: Option<MetadataClient>,
    dbs: HashMap<PathBuf, DependencyDb>,
}

impl Session {
    /// Session against the configured channels over HTTP
    pub fn open(config: Config) -> Result<Self> {
        let source = RestChannelSource::new(MetadataClient::new(&config)?, config.clone());
        let client = MetadataClient::new(&config)?;
        let mut session = Self::with_source(config, Box::new(source))?;
        session.client = Some(client);
        Ok(session)
    }

    /// Session against any release source; archives must be local files
    pub fn with_source(config: Config, source: Box<dyn ReleaseSource>) -> Result<Self> {
        let registry = SqliteRegistry::open(&paths::registry_db(&config.registry_dir()))?;
        Ok(Self {
            config,
            registry,
            source,
            client: None,
            dbs: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &dyn PackageRegistry {
        &self.registry
    }

    /// Open the database for the configured registry directory once, and
    /// rebuild it whenever it was dropped since
    fn ensure_dependency_db(&mut self) -> Result<PathBuf> {
        let dir = self.config.registry_dir();
        match self.dbs.get(&dir) {
            Some(db) => db.assert_ready(&self.registry)?,
            None => {
                let db = DependencyDb::open(&dir, &self.registry)?;
                self.dbs.insert(dir.clone(), db);
            }
        }
        Ok(dir)
    }

    fn dependency_db(&self, dir: &Path) -> Result<&DependencyDb> {
        self.dbs
            .get(dir)
            .ok_or_else(|| Error::NotFound(format!("no dependency database for {}", dir.display())))
    }

    pub fn resolve(&mut self, requests: &[PackageRef], policy: &Policy) -> Result<Resolution> {
        self.resolve_with(requests, &policy.resolve_options())
    }

    fn resolve_with(&mut self, requests: &[PackageRef], options: &ResolveOptions) -> Result<Resolution> {
        self.source.set_offline(options.offline);
        let dir = self.ensure_dependency_db()?;
        let db = self.dependency_db(&dir)?;
        let environment = HostEnvironment::from_config(&self.config);
        Resolver::new(self.source.as_ref(), &self.registry, &environment, &self.config)
            .with_dependency_db(db)
            .resolve(requests, options)
    }

    /// Resolve, order, fetch and install `requests`
    pub fn install(&mut self, requests: &[PackageRef], policy: &Policy) -> Result<InstallSummary> {
        let resolution = self.resolve(requests, policy)?;
        let dir = self.ensure_dependency_db()?;
        let db = self.dependency_db(&dir)?;
        let installer = Installer::new(&self.config, &self.registry, db, policy.install_options());

        let mut summary = InstallSummary {
            warnings: resolution.warnings,
            failures: resolution.failures,
            ..Default::default()
        };

        for entry in sort_for_install(resolution.entries) {
            let descriptor = entry.descriptor;
            let report = if policy.register_only {
                installer.install(descriptor, Path::new(""))?
            } else {
                let staging = paths::staging_dir(&dir).join(descriptor.id().to_string().replace('/', "_"));
                let outcome = self
                    .fetch_archive(&descriptor, policy.offline)
                    .and_then(|archive| extract_archive(&archive, &staging))
                    .and_then(|staged| installer.install(descriptor, &staged));
                if let Err(e) = fs::remove_dir_all(&staging) {
                    debug!("Could not clean {}: {}", staging.display(), e);
                }
                outcome?
            };
            summary.warnings.extend(report.warnings.iter().cloned());
            summary.installed.push(report);
        }

        info!("Installed {} package(s)", summary.installed.len());
        Ok(summary)
    }

    /// Upgrade every installed channel package that has a newer release
    pub fn upgrade_all(&mut self, policy: &Policy) -> Result<InstallSummary> {
        let requests: Vec<PackageRef> = self
            .registry
            .installed_packages()?
            .iter()
            .map(|d| d.key())
            .filter(|key| key.channel != URI_CHANNEL)
            .map(|key| PackageRef::new(&key.channel, &key.name))
            .collect();
        if requests.is_empty() {
            info!("No packages installed, nothing to upgrade");
            return Ok(InstallSummary::default());
        }

        let policy = Policy {
            upgrade: true,
            ..*policy
        };
        match self.install(&requests, &policy) {
            Err(Error::NoValidPackages) => {
                info!("Every installed package is up to date");
                Ok(InstallSummary::default())
            }
            other => other,
        }
    }

    /// Resolve `requests` and fetch their archives without installing
    ///
    /// Dependencies are not looked up and installed versions do not matter.
    /// Returns the archive paths in install order.
    pub fn download(&mut self, requests: &[PackageRef], policy: &Policy) -> Result<Vec<PathBuf>> {
        let options = ResolveOptions {
            downloadonly: true,
            ..policy.resolve_options()
        };
        let resolution = self.resolve_with(requests, &options)?;

        let mut archives = Vec::with_capacity(resolution.entries.len());
        for entry in sort_for_install(resolution.entries) {
            archives.push(self.fetch_archive(&entry.descriptor, policy.offline)?);
        }
        info!("Downloaded {} archive(s)", archives.len());
        Ok(archives)
    }

    /// Local path of a release's archive, downloading it when needed
    fn fetch_archive(&self, descriptor: &PackageDescriptor, offline: bool) -> Result<PathBuf> {
        let url = descriptor
            .archive_url()
            .ok_or_else(|| Error::NotFound(format!("{} has no archive", descriptor.id())))?;

        if let Some(path) = local_archive(url) {
            return Ok(path);
        }

        let download_dir = self.config.download_dir();
        if offline {
            return url_basename(url)
                .map(|name| download_dir.join(name))
                .filter(|path| path.is_file())
                .ok_or_else(|| {
                    Error::NotFound(format!("{} was never downloaded, cannot fetch it offline", url))
                });
        }

        let client = self.client.as_ref().ok_or_else(|| {
            Error::ConfigError(format!("Cannot download {} in an offline session", url))
        })?;
        client.download(url, &download_dir, Some(&descriptor.id().channel))
    }

    /// Remove installed packages, dependents first
    pub fn uninstall(&mut self, refs: &[PackageRef], policy: &Policy) -> Result<Vec<InstallReport>> {
        let dir = self.ensure_dependency_db()?;
        let db = self.dependency_db(&dir)?;

        let mut keys: Vec<PackageKey> = Vec::new();
        for r in refs {
            let key = r.key();
            if !self.registry.is_installed(&key)? {
                return Err(Error::NotFound(format!("{} is not installed", key)));
            }
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let order = sort_for_uninstall(keys.clone(), db)?;
        let installer = Installer::new(&self.config, &self.registry, db, policy.install_options());

        let mut reports = Vec::with_capacity(order.len());
        for key in &order {
            let others: Vec<PackageKey> = keys.iter().filter(|k| *k != key).cloned().collect();
            reports.push(installer.uninstall(key, &others)?);
        }
        Ok(reports)
    }

    /// Recreate the reverse-dependency database from the registry
    pub fn rebuild_dependency_db(&mut self) -> Result<()> {
        let dir = self.config.registry_dir();
        let db = DependencyDb::at(&dir);
        db.rebuild(&self.registry)?;
        self.dbs.insert(dir, db);
        Ok(())
    }
}

/// Path of an archive URL that points at the local filesystem
fn local_archive(url: &str) -> Option<PathBuf> {
    match url::Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_archive_detection() {
        assert_eq!(local_archive("/tmp/a.tgz"), Some(PathBuf::from("/tmp/a.tgz")));
        assert_eq!(local_archive("file:///tmp/a.tgz"), Some(PathBuf::from("/tmp/a.tgz")));
        assert_eq!(local_archive("https://pkg.example.org/get/a.tgz"), None);
    }

    #[test]
    fn test_policy_maps_flags() {
        let policy = Policy {
            force: true,
            register_only: true,
            ..Default::default()
        };
        assert!(policy.resolve_options().force);
        assert!(!policy.resolve_options().downloadonly);
        assert!(policy.install_options().register_only);
        assert!(!policy.install_options().ignore_errors);

        let upgrade = Policy {
            upgrade: true,
            offline: true,
            ..Default::default()
        };
        assert!(upgrade.resolve_options().upgrade);
        assert!(upgrade.resolve_options().offline);
    }
}
