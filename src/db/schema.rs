use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema extraction error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Schema extraction error: database has no tables")]
    NoTables,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type as written in the DDL; SQLite allows it to be empty.
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Compact `table(col, col, ...)` form.
    pub fn signature(&self) -> String {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        format!("{}({})", self.name, columns.join(", "))
    }
}

/// Text description of a database handed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# DATABASE SCHEMA")?;
        for table in &self.tables {
            writeln!(f)?;
            writeln!(f, "### Table: {}", table.name)?;
            for column in &table.columns {
                let data_type = if column.data_type.is_empty() {
                    "ANY"
                } else {
                    column.data_type.as_str()
                };
                write!(f, "- {} ({}", column.name, data_type)?;
                if column.primary_key {
                    write!(f, ", PK")?;
                }
                if !column.nullable {
                    write!(f, ", NOT NULL")?;
                }
                writeln!(f, ")")?;
            }
        }
        Ok(())
    }
}

/// Reads table and column metadata from the SQLite catalog.
pub fn extract_schema(db_path: &Path) -> Result<SchemaDescription, SchemaError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let description = describe_connection(&conn)?;
    info!(
        "Extracted schema with {} tables from {}",
        description.tables.len(),
        db_path.display()
    );
    Ok(description)
}

pub fn describe_connection(conn: &Connection) -> Result<SchemaDescription, SchemaError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let table_names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;

    if table_names.is_empty() {
        return Err(SchemaError::NoTables);
    }

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        let mut col_stmt = conn.prepare(&format!(
            "PRAGMA table_info(\"{}\")",
            table_name.replace('"', "\"\"")
        ))?;
        let columns: Vec<ColumnSchema> = col_stmt
            .query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get(1)?,
                    data_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    nullable: row.get::<_, i32>(3)? == 0, // notnull is 0 when nullable
                    primary_key: row.get::<_, i32>(5)? > 0,
                })
            })?
            .collect::<Result<_, _>>()?;

        debug!("Table {} has {} columns", table_name, columns.len());
        tables.push(TableSchema {
            name: table_name,
            columns,
        });
    }

    Ok(SchemaDescription { tables })
}
