// src/repository/archive.rs

//! Package archive extraction
//!
//! Archives are gzip-compressed tarballs whose files usually sit under a
//! single `name-version/` directory.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Unpack `archive` into `dest` and return the directory holding the
/// package files (the single top-level directory, if there is one)
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let file = File::open(archive)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", archive.display(), e)))?;

    fs::create_dir_all(dest)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut tar = Archive::new(GzDecoder::new(file));
    let entries = tar
        .entries()
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", archive.display(), e)))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry
            .map_err(|e| Error::IoError(format!("Corrupt archive {}: {}", archive.display(), e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::IoError(format!("Bad entry path: {}", e)))?
            .into_owned();

        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::InvalidPath(format!(
                "Archive entry escapes the extraction root: {}",
                path.display()
            )));
        }

        entry
            .unpack_in(dest)
            .map_err(|e| Error::IoError(format!("Failed to unpack {}: {}", path.display(), e)))?;
        count += 1;
    }

    debug!("Extracted {} entries from {}", count, archive.display());
    package_root(dest)
}

/// Directory holding the package files under an extraction root
fn package_root(dest: &Path) -> Result<PathBuf> {
    let mut children = fs::read_dir(dest)
        .map_err(|e| Error::IoError(format!("Failed to list {}: {}", dest.display(), e)))?
        .collect::<std::io::Result<Vec<_>>>()?;

    if children.len() == 1 && children[0].file_type()?.is_dir() {
        return Ok(children.remove(0).path());
    }
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn build_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_strips_single_top_level_dir() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("A-1.0.tgz");
        build_archive(&archive, &[("A-1.0/A.php", b"<?php"), ("A-1.0/doc/README", b"hi")]);

        let root = extract_archive(&archive, &temp.path().join("x")).unwrap();
        assert_eq!(root, temp.path().join("x").join("A-1.0"));
        assert_eq!(fs::read(root.join("doc/README")).unwrap(), b"hi");
    }

    #[test]
    fn test_extract_flat_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("B.tgz");
        build_archive(&archive, &[("B.php", b"b"), ("c.txt", b"c")]);

        let root = extract_archive(&archive, &temp.path().join("x")).unwrap();
        assert_eq!(root, temp.path().join("x"));
    }
}
