// src/repository/channel.rs

//! Release metadata published by channels
//!
//! A channel serves two documents per package:
//! - `{base}/r/{name}/allreleases.json`: `{"releases": [{"version", "state"}]}`
//! - `{base}/r/{name}/{version}.json`: the release descriptor
//!
//! Release descriptors declare a `schema`; this module is the only place
//! that looks at it.

use super::client::MetadataClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::{
    DependencySet, Descriptor, DescriptorSchema, ExtendedDescriptor, FileRole, LegacyDescriptor,
    Manifest, OneOrMany, PackageDescriptor, PackageId, PackageKey, URI_CHANNEL, WireDependency,
    WireDependencySet,
};
use crate::version::{ReleaseState, Version, VersionConstraint};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One entry of a package's release listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReleaseSummary {
    pub version: Version,
    pub state: ReleaseState,
}

#[derive(Debug, Deserialize)]
struct ReleaseListing {
    #[serde(default)]
    releases: Option<OneOrMany<ReleaseSummary>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    name: String,
    role: String,
    #[serde(default)]
    install_as: Option<String>,
}

fn default_schema() -> String {
    "1.0".to_string()
}

/// Release descriptor document
#[derive(Debug, Deserialize)]
pub struct ReleaseDocument {
    #[serde(default)]
    channel: Option<String>,
    name: String,
    version: Version,
    state: ReleaseState,
    #[serde(default = "default_schema")]
    schema: String,
    #[serde(default)]
    archive: Option<String>,
    #[serde(default)]
    deps: serde_json::Value,
    #[serde(default)]
    files: Vec<ReleaseFile>,
}

impl ReleaseDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::ParseError(format!("Invalid release document: {e}")))
    }

    /// Build the descriptor; `channel` fills in a missing channel field
    pub fn into_descriptor(self, channel: &str) -> Result<PackageDescriptor> {
        let channel = self.channel.as_deref().unwrap_or(channel);
        let id = PackageId::new(channel, &self.name, self.version.clone(), self.state);

        let mut manifest = Manifest::new();
        for file in &self.files {
            let role: FileRole = file.role.parse()?;
            manifest = match file.install_as {
                Some(ref target) => manifest.with_file_as(&file.name, role, target),
                None => manifest.with_file(&file.name, role),
            };
        }

        let descriptor: PackageDescriptor = match self.schema.parse::<DescriptorSchema>()? {
            DescriptorSchema::Legacy => {
                let deps = if self.deps.is_null() {
                    DependencySet::new()
                } else {
                    let records: OneOrMany<WireDependency> = serde_json::from_value(self.deps)
                        .map_err(|e| Error::ParseError(format!("{}: invalid deps: {e}", id)))?;
                    DependencySet::from_legacy(&records)?
                };
                LegacyDescriptor::new(id, deps, manifest)?.into()
            }
            DescriptorSchema::Extended => {
                let deps = if self.deps.is_null() {
                    DependencySet::new()
                } else {
                    let wire: WireDependencySet = serde_json::from_value(self.deps)
                        .map_err(|e| Error::ParseError(format!("{}: invalid deps: {e}", id)))?;
                    DependencySet::from_wire(&wire)?
                };
                ExtendedDescriptor::new(id, deps, manifest).into()
            }
        };

        Ok(match self.archive {
            Some(ref url) => descriptor.with_archive_url(url),
            None => descriptor,
        })
    }
}

/// Where the resolver looks up releases
pub trait ReleaseSource {
    /// Every published release of a package, empty if the package is unknown
    fn releases(&self, channel: &str, name: &str) -> Result<Vec<ReleaseSummary>>;

    fn descriptor(&self, channel: &str, name: &str, version: &Version) -> Result<PackageDescriptor>;

    /// Descriptor of a package known only by URI
    fn descriptor_from_uri(&self, uri: &str) -> Result<PackageDescriptor>;

    /// Stop (or resume) going to the network; sources without one ignore it
    fn set_offline(&mut self, _offline: bool) {}
}

/// Pick a release: an exact pin wins regardless of state; otherwise the
/// most stable acceptable state, then the newest version within it
pub fn select_release<'a>(
    releases: &'a [ReleaseSummary],
    constraint: &VersionConstraint,
    min_state: ReleaseState,
) -> Option<&'a ReleaseSummary> {
    if let Some(pinned) = constraint.pinned() {
        return releases.iter().find(|r| &r.version == pinned);
    }

    releases
        .iter()
        .filter(|r| min_state.accepts(r.state) && constraint.satisfies(&r.version))
        .max_by(|a, b| a.state.cmp(&b.state).then_with(|| a.version.cmp(&b.version)))
}

/// Channel REST source backed by the metadata client
pub struct RestChannelSource {
    client: MetadataClient,
    config: Config,
}

impl RestChannelSource {
    pub fn new(client: MetadataClient, config: Config) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &MetadataClient {
        &self.client
    }

    fn package_url(&self, channel: &str, name: &str, document: &str) -> String {
        format!(
            "{}/r/{}/{}",
            self.config.channel_base_url(channel),
            name.to_ascii_lowercase(),
            document
        )
    }
}

impl ReleaseSource for RestChannelSource {
    fn releases(&self, channel: &str, name: &str) -> Result<Vec<ReleaseSummary>> {
        let url = self.package_url(channel, name, "allreleases.json");
        match self.client.retrieve_json::<ReleaseListing>(&url, Some(channel)) {
            Ok(listing) => Ok(listing.releases.map(OneOrMany::into_vec).unwrap_or_default()),
            Err(Error::NotFound(_)) => {
                debug!("{} has no release listing at {}", name, url);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn descriptor(&self, channel: &str, name: &str, version: &Version) -> Result<PackageDescriptor> {
        let url = self.package_url(channel, name, &format!("{}.json", version));
        let body = self.client.retrieve(&url, Some(channel))?;
        ReleaseDocument::parse(&body)?.into_descriptor(channel)
    }

    fn set_offline(&mut self, offline: bool) {
        self.client.set_offline(offline);
    }

    fn descriptor_from_uri(&self, uri: &str) -> Result<PackageDescriptor> {
        let body = self.client.retrieve(uri, None)?;
        let mut document = ReleaseDocument::parse(&body)?;
        // URI packages never belong to a channel
        document.channel = None;
        document.into_descriptor(URI_CHANNEL)
    }
}

/// In-memory release source
#[derive(Debug, Default, Clone)]
pub struct MemoryReleaseSource {
    packages: BTreeMap<PackageKey, Vec<PackageDescriptor>>,
    uris: BTreeMap<String, PackageDescriptor>,
}

impl MemoryReleaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: PackageDescriptor) {
        self.packages
            .entry(descriptor.key())
            .or_default()
            .push(descriptor);
    }

    pub fn add_uri(&mut self, uri: &str, descriptor: PackageDescriptor) {
        self.uris.insert(uri.to_string(), descriptor);
    }
}

impl ReleaseSource for MemoryReleaseSource {
    fn releases(&self, channel: &str, name: &str) -> Result<Vec<ReleaseSummary>> {
        Ok(self
            .packages
            .get(&PackageKey::new(channel, name))
            .map(|list| {
                list.iter()
                    .map(|d| ReleaseSummary {
                        version: d.id().version.clone(),
                        state: d.id().state,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn descriptor(&self, channel: &str, name: &str, version: &Version) -> Result<PackageDescriptor> {
        self.packages
            .get(&PackageKey::new(channel, name))
            .and_then(|list| list.iter().find(|d| &d.id().version == version))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{}/{}-{}", channel, name, version)))
    }

    fn descriptor_from_uri(&self, uri: &str) -> Result<PackageDescriptor> {
        self.uris
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::NotFound(uri.to_string()))
    }
}
