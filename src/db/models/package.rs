// src/db/models/package.rs

//! PackageEntry model - one installed package

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, channel, name, version, state, schema, archive_url, installed_at";

/// An installed package row
#[derive(Debug, Clone)]
pub struct PackageEntry {
    pub id: Option<i64>,
    pub channel: String,
    pub name: String,
    pub version: String,
    pub state: String,
    pub schema: String,
    pub archive_url: Option<String>,
    pub installed_at: Option<String>,
}

impl PackageEntry {
    pub fn new(channel: String, name: String, version: String, state: String, schema: String) -> Self {
        Self {
            id: None,
            channel,
            name,
            version,
            state,
            schema,
            archive_url: None,
            installed_at: None,
        }
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (channel, name, version, state, schema, archive_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &self.channel,
                &self.name,
                &self.version,
                &self.state,
                &self.schema,
                &self.archive_url,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a package by channel and name, ignoring case
    pub fn find_by_name(conn: &Connection, channel: &str, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM packages WHERE channel = ?1 AND name = ?2"
        ))?;

        let package = stmt
            .query_row([channel, name], Self::from_row)
            .optional()?;

        Ok(package)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM packages WHERE id = ?1"))?;
        Ok(stmt.query_row([id], Self::from_row).optional()?)
    }

    /// All installed packages in install order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM packages ORDER BY id"))?;

        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Delete a package; dependencies, files and directories cascade
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            channel: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
            state: row.get(4)?,
            schema: row.get(5)?,
            archive_url: row.get(6)?,
            installed_at: row.get(7)?,
        })
    }
}
