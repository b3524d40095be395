// src/db/models/directory.rs

//! DirectoryEntry model - directories created by a package install

use crate::error::Result;
use rusqlite::{Connection, params};

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub package_id: i64,
    pub path: String,
}

impl DirectoryEntry {
    pub fn new(package_id: i64, path: String) -> Self {
        Self { package_id, path }
    }

    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO directories (package_id, path) VALUES (?1, ?2)",
            params![&self.package_id, &self.path],
        )?;
        Ok(())
    }

    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare("SELECT package_id, path FROM directories WHERE package_id = ?1 ORDER BY path")?;

        let dirs = stmt
            .query_map([package_id], |row| {
                Ok(Self {
                    package_id: row.get(0)?,
                    path: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(dirs)
    }
}
