// src/db/models/file_entry.rs

//! FileEntry model - manifest files and where they were installed

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A manifest file of an installed package
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    /// Path inside the package archive
    pub source_path: String,
    pub role: String,
    pub install_as: Option<String>,
    /// Absolute path on disk, unset for files never installed
    pub installed_path: Option<String>,
}

impl FileEntry {
    pub fn new(package_id: i64, source_path: String, role: String) -> Self {
        Self {
            id: None,
            package_id,
            source_path,
            role,
            install_as: None,
            installed_path: None,
        }
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO files (package_id, source_path, role, install_as, installed_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.package_id,
                &self.source_path,
                &self.role,
                &self.install_as,
                &self.installed_path,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find the file installed at an absolute path
    pub fn find_by_installed_path(conn: &Connection, path: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, source_path, role, install_as, installed_path
             FROM files WHERE installed_path = ?1",
        )?;

        let file = stmt.query_row([path], Self::from_row).optional()?;

        Ok(file)
    }

    /// Find all files belonging to a package
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, source_path, role, install_as, installed_path
             FROM files WHERE package_id = ?1 ORDER BY id",
        )?;

        let files = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            source_path: row.get(2)?,
            role: row.get(3)?,
            install_as: row.get(4)?,
            installed_path: row.get(5)?,
        })
    }
}
