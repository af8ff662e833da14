//! Table schema definitions and management
//!
//! Record types describe their table with a [`TableSchema`] built at compile
//! time. The [`SchemaManager`] materialises the tables bound to a database.

use crate::database::error::{DatabaseError, DbResult};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Table description of a record type
///
/// Every table has an integer primary key (`id` unless renamed) followed by
/// the declared columns in declaration order. Record values are bound in
/// that same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: "id".to_string(),
            columns: Vec::new(),
        }
    }

    /// Rename the integer primary key column
    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_key = name.to_string();
        self
    }

    /// Add a nullable column
    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable: true,
        });
        self
    }

    /// Add a `NOT NULL` column
    pub fn required(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable: false,
        });
        self
    }

    /// Primary key followed by the declared columns
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.as_str())
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.primary_key == name || self.columns.iter().any(|c| c.name == name)
    }

    /// Check the definition itself is usable
    pub fn validate(&self) -> DbResult<()> {
        if self.table.is_empty() {
            return Err(DatabaseError::Schema("table name must not be empty".into()));
        }
        let mut seen = BTreeSet::new();
        for name in self.column_names() {
            if name.is_empty() {
                return Err(DatabaseError::Schema(format!(
                    "table {} has an unnamed column",
                    self.table
                )));
            }
            if !seen.insert(name) {
                return Err(DatabaseError::Schema(format!(
                    "table {} declares column {} twice",
                    self.table, name
                )));
            }
        }
        Ok(())
    }

    pub fn create_sql(&self) -> String {
        let mut defs = vec![format!(
            "{} INTEGER PRIMARY KEY",
            quote_ident(&self.primary_key)
        )];
        for column in &self.columns {
            let mut def = format!("{} {}", quote_ident(&column.name), column.column_type.sql());
            if !column.nullable {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.table),
            defs.join(", ")
        )
    }
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema manager for one connection
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create every table in `schemas`
    ///
    /// Fails with [`DatabaseError::Schema`] without touching the database when
    /// two schemas map the same table differently, or when an existing table
    /// has other columns than its schema declares.
    pub fn create_all<'s, I>(&self, schemas: I) -> DbResult<()>
    where
        I: IntoIterator<Item = &'s TableSchema>,
    {
        let mut tables: BTreeMap<&str, &TableSchema> = BTreeMap::new();
        for schema in schemas {
            schema.validate()?;
            match tables.get(schema.table.as_str()) {
                Some(existing) if *existing != schema => {
                    return Err(DatabaseError::Schema(format!(
                        "conflicting definitions for table {}",
                        schema.table
                    )));
                }
                Some(_) => {}
                None => {
                    tables.insert(schema.table.as_str(), schema);
                }
            }
        }

        for schema in tables.values() {
            if let Some(columns) = self.existing_columns(&schema.table)? {
                let declared: BTreeSet<&str> = schema.column_names().into_iter().collect();
                let actual: BTreeSet<&str> = columns.iter().map(|c| c.as_str()).collect();
                if declared != actual {
                    return Err(DatabaseError::Schema(format!(
                        "table {} already exists with columns ({})",
                        schema.table,
                        columns.join(", ")
                    )));
                }
            }
        }

        for schema in tables.values() {
            self.conn.execute(&schema.create_sql(), [])?;
        }
        Ok(())
    }

    /// Column names of an existing table, or `None` if it does not exist
    pub fn existing_columns(&self, table: &str) -> DbResult<Option<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(columns))
        }
    }
}
