// src/db/models/dependency.rs

//! DependencyEntry model - declared dependencies of an installed package

use crate::error::Result;
use rusqlite::{Connection, Row, params};

/// One declared dependency, stored as its JSON wire record
#[derive(Debug, Clone)]
pub struct DependencyEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    /// "required", "optional" or "group"
    pub section: String,
    pub group_name: Option<String>,
    pub group_hint: Option<String>,
    pub record: String,
}

impl DependencyEntry {
    pub fn new(package_id: i64, section: &str, record: String) -> Self {
        Self {
            id: None,
            package_id,
            section: section.to_string(),
            group_name: None,
            group_hint: None,
            record,
        }
    }

    pub fn in_group(mut self, name: &str, hint: Option<&str>) -> Self {
        self.group_name = Some(name.to_string());
        self.group_hint = hint.map(str::to_string);
        self
    }

    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO dependencies (package_id, section, group_name, group_hint, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.package_id,
                &self.section,
                &self.group_name,
                &self.group_hint,
                &self.record,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Dependencies of a package in declaration order
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, section, group_name, group_hint, record
             FROM dependencies WHERE package_id = ?1 ORDER BY id",
        )?;

        let deps = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(deps)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package_id: row.get(1)?,
            section: row.get(2)?,
            group_name: row.get(3)?,
            group_hint: row.get(4)?,
            record: row.get(5)?,
        })
    }
}
