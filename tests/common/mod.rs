// tests/common/mod.rs

//! Shared helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use orchard::package::{
    DependencyDeclaration, DependencySet, ExtendedDescriptor, FileRole, Manifest,
};
use orchard::repository::MemoryReleaseSource;
use orchard::{Config, PackageDescriptor, PackageId, PackageRef, ReleaseState, Session, Version};
use std::fs::File;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CHANNEL: &str = "pkg.example.org";

pub fn version(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// Required package dependency on `name` in the test channel
pub fn requires(name: &str) -> DependencyDeclaration {
    DependencyDeclaration::package(CHANNEL, name)
}

pub fn refs(requests: &[&str]) -> Vec<PackageRef> {
    requests
        .iter()
        .map(|r| PackageRef::parse(r, CHANNEL).unwrap())
        .collect()
}

/// Release builder for the in-memory channel
pub struct Release {
    name: String,
    version: String,
    state: ReleaseState,
    deps: DependencySet,
    files: Vec<(String, FileRole, String)>,
}

impl Release {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            state: ReleaseState::Stable,
            deps: DependencySet::new(),
            files: Vec::new(),
        }
    }

    pub fn state(mut self, state: ReleaseState) -> Self {
        self.state = state;
        self
    }

    pub fn require(mut self, dep: DependencyDeclaration) -> Self {
        self.deps = self.deps.require(dep);
        self
    }

    pub fn recommend(mut self, dep: DependencyDeclaration) -> Self {
        self.deps = self.deps.recommend(dep);
        self
    }

    pub fn file(mut self, path: &str, role: FileRole, content: &str) -> Self {
        self.files.push((path.to_string(), role, content.to_string()));
        self
    }

    fn descriptor(&self) -> PackageDescriptor {
        let mut manifest = Manifest::new();
        for (path, role, _) in &self.files {
            manifest = manifest.with_file(path, *role);
        }
        ExtendedDescriptor::new(
            PackageId::new(CHANNEL, &self.name, version(&self.version), self.state),
            self.deps.clone(),
            manifest,
        )
        .into()
    }
}

/// A scratch install root with an in-memory channel of archived releases
pub struct TestChannel {
    pub temp: TempDir,
    pub source: MemoryReleaseSource,
}

impl TestChannel {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            source: MemoryReleaseSource::new(),
        }
    }

    /// Publish a release, packing its files into a `.tgz`
    pub fn publish(&mut self, release: Release) -> &mut Self {
        let archive = self.build_archive(&release);
        let descriptor = release
            .descriptor()
            .with_archive_url(archive.to_str().unwrap());
        self.source.add(descriptor);
        self
    }

    fn build_archive(&self, release: &Release) -> PathBuf {
        let dir = self.temp.path().join("archives");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}-{}.tgz", release.name, release.version));

        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut tar = tar::Builder::new(encoder);
        let prefix = format!("{}-{}", release.name, release.version);
        for (file, _, content) in &release.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, format!("{}/{}", prefix, file), content.as_bytes())
                .unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap();
        path
    }

    pub fn config(&self) -> Config {
        Config {
            default_channel: CHANNEL.to_string(),
            ..Config::with_root(&self.root())
        }
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("root")
    }

    pub fn code(&self, path: &str) -> PathBuf {
        self.config().role_dir(FileRole::RuntimeCode).join(path)
    }

    /// A fresh session over the current channel contents
    pub fn session(&self) -> Session {
        Session::with_source(self.config(), Box::new(self.source.clone())).unwrap()
    }
}
