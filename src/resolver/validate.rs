// src/resolver/validate.rs

//! Dependency validation of download set entries

use super::environment::{EnvCheck, Environment, check_environment};
use super::DownloadEntry;
use crate::db::PackageRegistry;
use crate::depdb::DependencyDb;
use crate::error::Result;
use crate::package::{DependencyDeclaration, DependencySection, Descriptor};
use crate::version::Version;

/// Problems found with one entry
#[derive(Debug, Default)]
pub struct EntryReport {
    /// Required dependency problems
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl EntryReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks entries against the registry, the download set and the host
pub struct Validator<'a> {
    pub registry: &'a dyn PackageRegistry,
    pub environment: &'a dyn Environment,
    pub depdb: Option<&'a DependencyDb>,
}

impl Validator<'_> {
    pub fn validate(&self, entry: &DownloadEntry, set: &[DownloadEntry]) -> Result<EntryReport> {
        let mut report = EntryReport::default();
        let id = entry.descriptor.id();
        let selected_group = entry.selected_group().map(|g| g.name.clone());

        for (section, group, dep) in entry.descriptor.dependencies().iter() {
            if section == DependencySection::Group
                && !group.is_some_and(|g| selected_group.as_deref() == Some(g))
            {
                continue;
            }

            let problem = if dep.is_package() {
                self.check_package(dep, &id.channel, set)?
            } else {
                match check_environment(self.environment, dep) {
                    EnvCheck::Satisfied => None,
                    EnvCheck::Unmet(message) => Some(message),
                    EnvCheck::Unknown(message) => {
                        report.warnings.push(format!("{}: {}", id, message));
                        None
                    }
                }
            };

            if let Some(problem) = problem {
                match section {
                    DependencySection::Required => report.errors.push(problem),
                    DependencySection::Optional => report
                        .warnings
                        .push(format!("{}: can optionally use {}", id, strip_verb(&problem))),
                    DependencySection::Group => report.warnings.push(format!(
                        "{}: group {} {}",
                        id,
                        group.unwrap_or_default(),
                        problem
                    )),
                }
            }
        }

        self.check_dependents(entry, set, &mut report)?;
        Ok(report)
    }

    /// Installed packages recorded as depending on this one must accept it
    fn check_dependents(
        &self,
        entry: &DownloadEntry,
        set: &[DownloadEntry],
        report: &mut EntryReport,
    ) -> Result<()> {
        let Some(db) = self.depdb else {
            return Ok(());
        };
        let id = entry.descriptor.id();

        for (dependent, record) in db.get_dependent_records(&entry.key())? {
            if set.iter().any(|e| e.key() == dependent) {
                continue;
            }
            let dep = record.declaration()?;
            let accepted = dep.constraint().satisfies(&id.version);
            let broken = if dep.is_conflict() { accepted } else { !accepted };
            if !broken {
                continue;
            }

            let verb = if dep.is_conflict() { "conflicts with" } else { "requires" };
            let message = format!(
                "installed {} {} {}",
                dependent,
                verb,
                dep.describe(&dependent.channel)
            );
            if record.is_required() {
                report.errors.push(message);
            } else {
                report.warnings.push(format!("{}: {}", id, message));
            }
        }
        Ok(())
    }

    /// Problem with a package dependency, if any
    fn check_package(
        &self,
        dep: &DependencyDeclaration,
        channel: &str,
        set: &[DownloadEntry],
    ) -> Result<Option<String>> {
        let key = dep.target_key(channel);
        let constraint = dep.constraint();

        let (found, source): (Option<Version>, &str) =
            match set.iter().find(|e| e.key() == key) {
                Some(e) => (Some(e.descriptor.id().version.clone()), "being installed"),
                None => (
                    self.registry
                        .find_package(&key)?
                        .map(|d| d.id().version.clone()),
                    "installed",
                ),
            };

        let wanted = dep.describe(channel);
        Ok(match found {
            Some(version) if dep.is_conflict() && constraint.satisfies(&version) => Some(format!(
                "conflicts with {}, {} {}",
                wanted, version, source
            )),
            Some(_) if dep.is_conflict() => None,
            None if dep.is_conflict() => None,
            Some(version) if !constraint.satisfies(&version) => Some(format!(
                "requires {}, {} {}",
                wanted, version, source
            )),
            Some(_) => None,
            None => Some(format!("requires {}", wanted)),
        })
    }
}

fn strip_verb(problem: &str) -> &str {
    problem.strip_prefix("requires ").unwrap_or(problem)
}
