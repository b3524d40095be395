// src/repository/cache.rs

//! On-disk cache for channel metadata responses
//!
//! Each URL maps to two files named by the SHA-256 of the URL:
//! `<hash>.cacheid` holds `{age, lastChange}` (fetch time and the
//! validators returned with the body) and `<hash>.cachefile` holds the
//! body itself.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Conditional-request validators returned by a server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    #[serde(default, rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl CacheValidators {
    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheId {
    /// Unix timestamp of the last fetch or revalidation
    age: i64,
    #[serde(rename = "lastChange")]
    last_change: CacheValidators,
}

/// A cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub validators: CacheValidators,
    pub body: Vec<u8>,
}

impl CacheEntry {
    /// Younger than `ttl` at `now`
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(elapsed) => elapsed < ttl,
            // Fetched "in the future": clock moved backwards
            Err(_) => false,
        }
    }
}

/// Metadata response cache rooted at one directory
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let hash = hex::encode(Sha256::digest(url.as_bytes()));
        (
            self.dir.join(format!("{}.cacheid", hash)),
            self.dir.join(format!("{}.cachefile", hash)),
        )
    }

    /// Cached response for `url`, if both halves are present and readable
    pub fn lookup(&self, url: &str) -> Result<Option<CacheEntry>> {
        let (id_path, body_path) = self.paths(url);
        if !id_path.is_file() || !body_path.is_file() {
            return Ok(None);
        }

        let id: CacheId = match fs::read(&id_path).map(|b| serde_json::from_slice(&b)) {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                warn!("Ignoring corrupt cache entry {}: {}", id_path.display(), e);
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to read {}: {}",
                    id_path.display(),
                    e
                )));
            }
        };

        let body = fs::read(&body_path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", body_path.display(), e))
        })?;

        let fetched_at = DateTime::from_timestamp(id.age, 0).unwrap_or_default();

        Ok(Some(CacheEntry {
            fetched_at,
            validators: id.last_change,
            body,
        }))
    }

    /// Store a freshly fetched body
    pub fn store(&self, url: &str, body: &[u8], validators: &CacheValidators) -> Result<()> {
        self.store_at(url, body, validators, Utc::now())
    }

    pub(crate) fn store_at(
        &self,
        url: &str,
        body: &[u8],
        validators: &CacheValidators,
        now: DateTime<Utc>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::IoError(format!("Failed to create cache dir {}: {}", self.dir.display(), e))
        })?;

        let (id_path, body_path) = self.paths(url);
        write_guarded(&body_path, body)?;
        self.write_id(&id_path, validators, now)?;
        debug!("Cached {} ({} bytes)", url, body.len());
        Ok(())
    }

    /// Refresh the age of an entry after a not-modified response
    pub fn touch(&self, url: &str, validators: &CacheValidators) -> Result<()> {
        let (id_path, _) = self.paths(url);
        self.write_id(&id_path, validators, Utc::now())
    }

    fn write_id(&self, path: &Path, validators: &CacheValidators, now: DateTime<Utc>) -> Result<()> {
        let id = CacheId {
            age: now.timestamp(),
            last_change: validators.clone(),
        };
        write_guarded(path, &serde_json::to_vec(&id)?)
    }
}

/// Create or overwrite a file, refusing symlinks and files owned by others
pub(crate) fn write_guarded(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = match fs::symlink_metadata(path) {
        Ok(meta) => {
            if meta.file_type().is_symlink() {
                return Err(Error::InvalidPath(format!(
                    "{} is a symlink, refusing to write through it",
                    path.display()
                )));
            }
            check_owner(path, &meta)?;
            OpenOptions::new().write(true).truncate(true).open(path)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            OpenOptions::new().write(true).create_new(true).open(path)
        }
        Err(e) => Err(e),
    }
    .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

    file.write_all(contents)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))
}

#[cfg(unix)]
fn check_owner(path: &Path, meta: &fs::Metadata) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    if euid != 0 && meta.uid() != euid {
        return Err(Error::InvalidPath(format!(
            "{} is owned by another user, refusing to overwrite",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_owner(_path: &Path, _meta: &fs::Metadata) -> Result<()> {
    Ok(())
}
