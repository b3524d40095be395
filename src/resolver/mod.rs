// src/resolver/mod.rs

//! Dependency resolution
//!
//! Turns a list of package requests into a download set: concrete releases
//! for the requests plus every package dependency they pull in, checked
//! against what is installed and what the host provides.
//!
//! Resolution runs in passes, each building a new entry list:
//!
//! 1. select a release per request
//! 2. drop exact duplicates
//! 3. expand dependencies to a fixed point
//! 4. reject two versions of one package
//! 5. drop entries that would replace an installed package
//! 6. validate every entry, dropping failures and revalidating the rest

pub mod environment;
pub mod graph;
mod validate;

pub use environment::{EnvCheck, Environment, HostEnvironment, check_environment};
pub use graph::{OrderGraph, OrderNode, sort_for_install, sort_for_uninstall};
pub use validate::{EntryReport, Validator};

use crate::config::Config;
use crate::db::PackageRegistry;
use crate::depdb::DependencyDb;
use crate::error::{Error, Result};
use crate::package::{
    DependencyDeclaration, DependencyGroup, Descriptor, PackageDescriptor, PackageId, PackageKey,
    PackageRef, URI_CHANNEL,
};
use crate::repository::{ReleaseSource, select_release};
use crate::version::{ReleaseState, Version, VersionConstraint};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Group used when a request names none
pub const DEFAULT_GROUP: &str = "default";

/// Policy flags for one resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Keep diagnostics out of the log (they are still returned)
    pub soft: bool,
    /// Keep entries whose dependencies fail
    pub ignore_errors: bool,
    /// Do not pull in dependencies
    pub nodeps: bool,
    /// Ignore what is installed
    pub force: bool,
    /// Also pull in optional dependencies
    pub alldeps: bool,
    /// Pull in required dependencies only, not group members
    pub onlyreqdeps: bool,
    /// Let a different installed version be replaced by a newer one
    pub upgrade: bool,
    /// Work from cached metadata; do not look for dependencies
    pub offline: bool,
    /// Fetch archives only; what is installed does not matter
    pub downloadonly: bool,
}

/// Why an entry is in the download set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Requested,
    DependencyOf(PackageKey),
}

/// A selected release and how it got selected
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub descriptor: PackageDescriptor,
    pub origin: Origin,
    /// Dependency group asked for
    pub group: Option<String>,
    /// State asked for explicitly, inherited by dependencies
    pub explicit_state: Option<ReleaseState>,
}

impl DownloadEntry {
    pub fn new(descriptor: PackageDescriptor, origin: Origin) -> Self {
        Self {
            descriptor,
            origin,
            group: None,
            explicit_state: None,
        }
    }

    pub fn key(&self) -> PackageKey {
        self.descriptor.key()
    }

    pub fn id(&self) -> &PackageId {
        self.descriptor.id()
    }

    pub fn version(&self) -> &Version {
        &self.descriptor.id().version
    }

    pub fn is_requested(&self) -> bool {
        self.origin == Origin::Requested
    }

    /// The asked-for group, or the one named `default` if there is one
    pub fn selected_group(&self) -> Option<&DependencyGroup> {
        let deps = self.descriptor.dependencies();
        match self.group.as_deref() {
            Some(name) => deps.group(name),
            None => deps.group(DEFAULT_GROUP),
        }
    }

    fn same_release(&self, other: &DownloadEntry) -> bool {
        self.key() == other.key() && self.version() == other.version()
    }
}

impl OrderNode for DownloadEntry {
    fn order_key(&self) -> PackageKey {
        self.key()
    }

    fn order_dependencies(&self) -> Vec<PackageKey> {
        self.descriptor.order_dependencies()
    }
}

/// A request or entry removed from the download set
#[derive(Debug)]
pub struct ResolveFailure {
    pub package: String,
    pub error: Error,
}

/// Outcome of a resolution
#[derive(Debug, Default)]
pub struct Resolution {
    pub entries: Vec<DownloadEntry>,
    pub warnings: Vec<String>,
    pub failures: Vec<ResolveFailure>,
}

impl Resolution {
    pub fn descriptors(&self) -> impl Iterator<Item = &PackageDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn ids(&self) -> Vec<PackageId> {
        self.entries.iter().map(|e| e.id().clone()).collect()
    }
}

/// Resolves requests against a release source
pub struct Resolver<'a> {
    source: &'a dyn ReleaseSource,
    registry: &'a dyn PackageRegistry,
    environment: &'a dyn Environment,
    depdb: Option<&'a DependencyDb>,
    default_channel: String,
    preferred_state: ReleaseState,
}

impl<'a> Resolver<'a> {
    pub fn new(
        source: &'a dyn ReleaseSource,
        registry: &'a dyn PackageRegistry,
        environment: &'a dyn Environment,
        config: &Config,
    ) -> Self {
        Self {
            source,
            registry,
            environment,
            depdb: None,
            default_channel: config.default_channel.clone(),
            preferred_state: config.preferred_state,
        }
    }

    /// Also check installed dependents recorded in `db`
    pub fn with_dependency_db(mut self, db: &'a DependencyDb) -> Self {
        self.depdb = Some(db);
        self
    }

    pub fn resolve(&self, requests: &[PackageRef], options: &ResolveOptions) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        let mut entries = Vec::new();
        for request in requests {
            match self.select_request(request) {
                Ok(entry) => entries.push(entry),
                Err(e @ Error::UnresolvedReference { .. }) => {
                    self.note(&mut resolution, options, e.to_string());
                    resolution.failures.push(ResolveFailure {
                        package: request.to_string(),
                        error: e,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let request_failures = resolution.failures.len();
        let mut entries = dedup_exact(entries);

        if options.offline {
            debug!("Skipping dependency lookup, working offline");
        } else if options.downloadonly {
            debug!("Skipping dependency lookup, downloading only");
        } else if !options.nodeps {
            entries = self.expand(entries, options, &mut resolution)?;
        }

        let entries = reject_duplicates(entries)?;
        let entries = self.remove_installed(entries, options, &mut resolution)?;
        resolution.entries = self.validate_all(entries, options, &mut resolution)?;

        dedup_warnings(&mut resolution.warnings);

        if resolution.entries.is_empty() && !requests.is_empty() {
            if requests.len() == 1 && request_failures == 1 {
                return Err(resolution.failures.remove(0).error);
            }
            return Err(Error::NoValidPackages);
        }

        info!(
            "Resolved {} request(s) to {} package(s)",
            requests.len(),
            resolution.entries.len()
        );
        Ok(resolution)
    }

    fn select_request(&self, request: &PackageRef) -> Result<DownloadEntry> {
        let constraint = match &request.version {
            Some(v) => VersionConstraint::Exact(v.clone()),
            None => VersionConstraint::Any,
        };
        let min_state = request.state.unwrap_or(self.preferred_state);
        let descriptor = self.select(&request.channel, &request.name, &constraint, min_state)?;

        let mut entry = DownloadEntry::new(descriptor, Origin::Requested);
        entry.group = request.group.clone();
        entry.explicit_state = request.state;
        Ok(entry)
    }

    /// Release of `channel/name` matching `constraint` at `min_state` or better
    fn select(
        &self,
        channel: &str,
        name: &str,
        constraint: &VersionConstraint,
        min_state: ReleaseState,
    ) -> Result<PackageDescriptor> {
        let package = PackageKey::new(channel, name).to_string();
        let releases = self.source.releases(channel, name)?;
        if releases.is_empty() {
            return Err(Error::UnresolvedReference {
                package,
                reason: "no releases found".to_string(),
            });
        }

        let Some(chosen) = select_release(&releases, constraint, min_state) else {
            let reason = match constraint.pinned() {
                Some(v) => format!("version {} does not exist", v),
                None => {
                    let newest = releases.iter().max_by(|a, b| a.version.cmp(&b.version));
                    match newest {
                        Some(r) => format!(
                            "no {} or more stable release satisfies {} (newest is {} {})",
                            min_state, constraint, r.version, r.state
                        ),
                        None => "no releases found".to_string(),
                    }
                }
            };
            return Err(Error::UnresolvedReference { package, reason });
        };

        debug!("Selected {} {} ({})", package, chosen.version, chosen.state);
        match self.source.descriptor(channel, name, &chosen.version) {
            Err(Error::NotFound(what)) => Err(Error::UnresolvedReference {
                package,
                reason: format!("release metadata missing: {}", what),
            }),
            other => other,
        }
    }

    fn select_dependency(
        &self,
        dep: &DependencyDeclaration,
        parent: &DownloadEntry,
    ) -> Result<DownloadEntry> {
        let descriptor = match &dep.uri {
            Some(uri) => match self.source.descriptor_from_uri(uri) {
                Err(Error::NotFound(_)) => {
                    return Err(Error::UnresolvedReference {
                        package: uri.clone(),
                        reason: "nothing found at URI".to_string(),
                    });
                }
                other => {
                    let descriptor = other?;
                    let wanted = dep.target_key(URI_CHANNEL);
                    if descriptor.key().name != wanted.name {
                        return Err(Error::UnresolvedReference {
                            package: uri.clone(),
                            reason: format!(
                                "URI serves {}, expected {}",
                                descriptor.id(),
                                dep.name
                            ),
                        });
                    }
                    descriptor
                }
            },
            None => {
                let target = dep.target_ref(&parent.id().channel);
                let min_state = parent.explicit_state.unwrap_or(self.preferred_state);
                self.select(&target.channel, &target.name, &dep.constraint(), min_state)?
            }
        };

        let mut entry = DownloadEntry::new(descriptor, Origin::DependencyOf(parent.key()));
        entry.explicit_state = parent.explicit_state;
        Ok(entry)
    }

    /// Package dependencies an entry pulls in, with whether each is required
    fn followed<'e>(
        &self,
        entry: &'e DownloadEntry,
        options: &ResolveOptions,
    ) -> Vec<(&'e DependencyDeclaration, bool)> {
        let deps = entry.descriptor.dependencies();
        let mut out: Vec<(&DependencyDeclaration, bool)> =
            deps.required_packages().map(|d| (d, true)).collect();

        if options.onlyreqdeps && !options.alldeps {
            return out;
        }
        if options.alldeps {
            out.extend(
                deps.optional
                    .iter()
                    .filter(|d| d.is_package() && !d.is_conflict())
                    .map(|d| (d, false)),
            );
        }
        if let Some(group) = entry.selected_group() {
            out.extend(
                group
                    .dependencies
                    .iter()
                    .filter(|d| d.is_package() && !d.is_conflict())
                    .map(|d| (d, false)),
            );
        }
        out
    }

    /// Whether `dep` is already covered by the set or by what is installed
    fn satisfied(
        &self,
        dep: &DependencyDeclaration,
        channel: &str,
        set: &[&DownloadEntry],
        options: &ResolveOptions,
    ) -> Result<bool> {
        let key = dep.target_key(channel);
        let constraint = dep.constraint();

        if set
            .iter()
            .any(|e| e.key() == key && constraint.satisfies(e.version()))
        {
            return Ok(true);
        }
        if options.force {
            return Ok(false);
        }
        Ok(self
            .registry
            .find_package(&key)?
            .is_some_and(|installed| constraint.satisfies(&installed.id().version)))
    }

    /// Add dependencies until nothing new is needed
    ///
    /// An entry whose required dependency cannot be resolved is rejected and
    /// expansion restarts from the requests without it. A rejected release
    /// is never selected again.
    fn expand(
        &self,
        initial: Vec<DownloadEntry>,
        options: &ResolveOptions,
        resolution: &mut Resolution,
    ) -> Result<Vec<DownloadEntry>> {
        let mut rejected: HashSet<(PackageKey, Version)> = HashSet::new();

        'restart: loop {
            let mut current: Vec<DownloadEntry> = initial
                .iter()
                .filter(|e| !rejected.contains(&(e.key(), e.version().clone())))
                .cloned()
                .collect();

            loop {
                let mut next: Vec<DownloadEntry> = Vec::new();

                for entry in &current {
                    let mut pulled: Vec<DownloadEntry> = Vec::new();

                    for (dep, required) in self.followed(entry, options) {
                        let known: Vec<&DownloadEntry> =
                            current.iter().chain(&next).chain(&pulled).collect();
                        if self.satisfied(dep, &entry.id().channel, &known, options)? {
                            continue;
                        }

                        let outcome = self.select_dependency(dep, entry).and_then(|candidate| {
                            if rejected.contains(&(candidate.key(), candidate.version().clone())) {
                                Err(Error::UnresolvedReference {
                                    package: candidate.id().to_string(),
                                    reason: "release was rejected earlier".to_string(),
                                })
                            } else {
                                Ok(candidate)
                            }
                        });

                        match outcome {
                            Ok(candidate) => {
                                debug!("{} pulls in {}", entry.id(), candidate.id());
                                pulled.push(candidate);
                            }
                            Err(e @ Error::UnresolvedReference { .. }) if required && !options.ignore_errors => {
                                let message = format!(
                                    "{} dropped: requires {}: {}",
                                    entry.id(),
                                    dep.describe(&entry.id().channel),
                                    e
                                );
                                self.note(resolution, options, message);
                                rejected.insert((entry.key(), entry.version().clone()));
                                resolution.failures.push(ResolveFailure {
                                    package: entry.id().to_string(),
                                    error: e,
                                });
                                continue 'restart;
                            }
                            Err(e @ Error::UnresolvedReference { .. }) => {
                                let message = format!(
                                    "{}: cannot resolve {}: {}",
                                    entry.id(),
                                    dep.describe(&entry.id().channel),
                                    e
                                );
                                self.note(resolution, options, message);
                            }
                            Err(e) => return Err(e),
                        }
                    }

                    next.push(entry.clone());
                    next.extend(pulled);
                }

                // Only a release not already in the set counts as growth
                let before = current.len();
                current = dedup_exact(next);
                if current.len() == before {
                    return Ok(current);
                }
            }
        }
    }

    /// Drop entries that would replace an installed package
    ///
    /// An equal or newer installed version always wins. A different one
    /// wins too unless upgrading (or `soft`).
    fn remove_installed(
        &self,
        entries: Vec<DownloadEntry>,
        options: &ResolveOptions,
        resolution: &mut Resolution,
    ) -> Result<Vec<DownloadEntry>> {
        if options.force || options.downloadonly {
            return Ok(entries);
        }
        let replace_older = options.upgrade || options.soft;

        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.registry.find_package(&entry.key())? {
                Some(installed)
                    if installed.id().version >= *entry.version() || !replace_older =>
                {
                    self.note(
                        resolution,
                        options,
                        format!(
                            "Skipping {}, version {} is already installed",
                            entry.id(),
                            installed.id().version
                        ),
                    );
                }
                _ => kept.push(entry),
            }
        }
        Ok(kept)
    }

    fn validate_all(
        &self,
        mut entries: Vec<DownloadEntry>,
        options: &ResolveOptions,
        resolution: &mut Resolution,
    ) -> Result<Vec<DownloadEntry>> {
        let validator = Validator {
            registry: self.registry,
            environment: self.environment,
            depdb: self.depdb,
        };

        'revalidate: loop {
            let mut warnings = Vec::new();

            for i in 0..entries.len() {
                let report = validator.validate(&entries[i], &entries)?;
                warnings.extend(report.warnings);
                if report.errors.is_empty() {
                    continue;
                }

                if options.ignore_errors || options.nodeps || options.downloadonly {
                    let id = entries[i].id().to_string();
                    warnings.extend(report.errors.into_iter().map(|e| format!("{}: {}", id, e)));
                    continue;
                }

                let failed = entries.remove(i);
                let error = Error::DependencyValidationFailure {
                    package: failed.id().to_string(),
                    reasons: report.errors,
                };
                self.note(resolution, options, error.to_string());
                resolution.failures.push(ResolveFailure {
                    package: failed.id().to_string(),
                    error,
                });
                continue 'revalidate;
            }

            for warning in warnings {
                self.note(resolution, options, warning);
            }
            return Ok(entries);
        }
    }

    /// Record a diagnostic; `soft` keeps it out of the log
    fn note(&self, resolution: &mut Resolution, options: &ResolveOptions, message: String) {
        if options.soft {
            debug!("{}", message);
        } else {
            warn!("{}", message);
        }
        resolution.warnings.push(message);
    }
}

/// Drop entries that repeat an earlier one exactly, group included
fn dedup_exact(entries: Vec<DownloadEntry>) -> Vec<DownloadEntry> {
    let mut out: Vec<DownloadEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !out
            .iter()
            .any(|e| e.same_release(&entry) && e.group == entry.group)
        {
            out.push(entry);
        }
    }
    out
}

/// Merge same-release entries and fail on two versions of one package
fn reject_duplicates(entries: Vec<DownloadEntry>) -> Result<Vec<DownloadEntry>> {
    let mut out: Vec<DownloadEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !out.iter().any(|e| e.same_release(&entry)) {
            out.push(entry);
        }
    }

    let mut conflicts = Vec::new();
    for (i, a) in out.iter().enumerate() {
        for b in &out[i + 1..] {
            if a.key() == b.key() {
                conflicts.push(format!("{} and {}", a.id(), b.id()));
            }
        }
    }

    if conflicts.is_empty() {
        Ok(out)
    } else {
        Err(Error::ConflictingVersions { conflicts })
    }
}

fn dedup_warnings(warnings: &mut Vec<String>) {
    let mut seen = HashSet::new();
    warnings.retain(|w| seen.insert(w.clone()));
}
