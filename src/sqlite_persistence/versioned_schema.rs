use anyhow::{bail, Context, Result};
use rusqlite::{params, types::Type, Connection};
use std::path::Path;
use tracing::info;

/// Offset added to schema versions before they are written to `user_version`,
/// so a file created by another tool is never mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                check: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }

    fn from_sql(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            _ => None,
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<S>,
    /// Expression of a column `CHECK` constraint.
    pub check: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    fn create_sql(&self) -> String {
        let mut column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut def = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.is_primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    def.push_str(" NOT NULL");
                }
                if column.is_unique {
                    def.push_str(" UNIQUE");
                }
                if let Some(default_value) = column.default_value {
                    def.push_str(&format!(" DEFAULT {}", default_value));
                }
                if let Some(check) = column.check {
                    def.push_str(&format!(" CHECK ({})", check));
                }
                if let Some(fk) = column.foreign_key {
                    def.push_str(&format!(
                        " REFERENCES {}({}) ON DELETE {}",
                        fk.foreign_table,
                        fk.foreign_column,
                        fk.on_delete.as_sql()
                    ));
                }
                def
            })
            .collect();

        for unique_constraint in self.unique_constraints {
            column_defs.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }
        format!("CREATE TABLE {} ({});", self.name, column_defs.join(", "))
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])?;
        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns = stmt
            .query_map(params![], |row| {
                let type_name: String = row.get(2)?;
                let sql_type = SqlType::from_sql(&type_name).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(2, type_name.clone(), Type::Text)
                })?;
                Ok(Column {
                    name: row.get::<_, String>(1)?,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                    is_unique: false,
                    check: None,
                    foreign_key: None,
                })
            })?
            .collect::<Result<Vec<Column<'_, String>>, _>>()
            .with_context(|| format!("Failed to read columns of table {}", self.name))?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}",
                self.name,
                actual_columns.len(),
                self.columns.len()
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, _column) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }

    /// Unique constraints (column-level and table-level) show up as unique
    /// entries in `PRAGMA index_list`.
    fn validate_unique_constraints(&self, conn: &Connection) -> Result<()> {
        let mut expected: Vec<Vec<&str>> = self
            .unique_constraints
            .iter()
            .map(|cols| cols.to_vec())
            .collect();
        expected.extend(
            self.columns
                .iter()
                .filter(|c| c.is_unique)
                .map(|c| vec![c.name]),
        );
        if expected.is_empty() {
            return Ok(());
        }

        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
            .filter_map(|r| r.ok())
            .filter(|(_, is_unique)| *is_unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut actual: Vec<Vec<String>> = Vec::with_capacity(unique_indices.len());
        for index_name in &unique_indices {
            let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut cols: Vec<String> = idx_stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            cols.sort();
            actual.push(cols);
        }

        for mut cols in expected {
            cols.sort();
            let found = actual
                .iter()
                .any(|a| a.iter().map(String::as_str).eq(cols.iter().copied()));
            if !found {
                bail!(
                    "Table {} is missing unique constraint on columns ({})",
                    self.name,
                    cols.join(", ")
                );
            }
        }
        Ok(())
    }

    /// `CHECK` constraints are not reported by any pragma, so they are looked
    /// up in the table's stored `CREATE TABLE` statement.
    fn validate_checks(&self, conn: &Connection) -> Result<()> {
        let mut checks = self.columns.iter().filter_map(|c| c.check.map(|e| (c.name, e)));
        let Some(first) = checks.next() else {
            return Ok(());
        };
        let table_sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
                params![self.name],
                |r| r.get(0),
            )
            .with_context(|| format!("Failed to read definition of table {}", self.name))?;

        for (column_name, expression) in std::iter::once(first).chain(checks) {
            if !table_sql.contains(&format!("CHECK ({})", expression)) {
                bail!(
                    "Table {} column {} is missing CHECK ({})",
                    self.name,
                    column_name,
                    expression
                );
            }
        }
        Ok(())
    }

    fn validate_foreign_keys(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        // id, seq, table, from, to, on_update, on_delete, match
        let actual: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| {
                Ok((row.get(3)?, row.get(2)?, row.get(4)?, row.get(6)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for column in self.columns {
            let Some(fk) = column.foreign_key else {
                continue;
            };
            let found = actual.iter().any(|(from, table, to, on_delete)| {
                from == column.name
                    && table == fk.foreign_table
                    && to == fk.foreign_column
                    && on_delete == fk.on_delete.as_sql()
            });
            if !found {
                bail!(
                    "Table {} column {} is missing foreign key REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    fk.foreign_table,
                    fk.foreign_column,
                    fk.on_delete.as_sql()
                );
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", (BASE_DB_VERSION + self.version) as i64)?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate_columns(conn)?;
            table.validate_indices(conn)?;
            table.validate_unique_constraints(conn)?;
            table.validate_checks(conn)?;
            table.validate_foreign_keys(conn)?;
        }
        Ok(())
    }
}

/// Open (or create) a SQLite file described by `schemas`.
///
/// A brand new file receives the latest schema. An existing file is validated
/// against the schema of its recorded version, then every later migration is
/// applied inside one transaction.
pub fn open_versioned_db(
    path: &Path,
    schemas: &'static [VersionedSchema],
    label: &str,
) -> Result<Connection> {
    let latest = schemas
        .last()
        .with_context(|| format!("No schema defined for {} database", label))?;

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open {} database at {:?}", label, path))?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!(
            "Creating {} database at {:?} (schema version {})",
            label, path, latest.version
        );
        latest.create(&conn)?;
        return Ok(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 0 {
        bail!(
            "{:?} is not a {} database (user_version {})",
            path,
            label,
            raw_version
        );
    }
    let db_version = db_version as usize;

    let current = schemas
        .iter()
        .find(|s| s.version == db_version)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?;
    current.validate(&conn).with_context(|| {
        format!(
            "{} database schema validation failed for version {}",
            label, db_version
        )
    })?;

    if db_version < latest.version {
        let tx = conn.transaction()?;
        for schema in schemas.iter().filter(|s| s.version > db_version) {
            if let Some(migration) = schema.migration {
                info!(
                    "Migrating {} database to version {}",
                    label, schema.version
                );
                migration(&tx)?;
            }
        }
        tx.pragma_update(None, "user_version", (BASE_DB_VERSION + latest.version) as i64)?;
        tx.commit()?;
        latest.validate(&conn).with_context(|| {
            format!(
                "{} database schema validation failed after migrating to version {}",
                label, latest.version
            )
        })?;
    }

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_TABLE: Table = Table {
        name: "parents",
        columns: &[
            sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("code", &SqlType::Text, non_null = true, is_unique = true),
        ],
        indices: &[("idx_parents_code", "code")],
        unique_constraints: &[],
    };

    const CHILD_TABLE: Table = Table {
        name: "children",
        columns: &[
            sqlite_column!(
                "parent_rowid",
                &SqlType::Integer,
                non_null = true,
                foreign_key = Some(&ForeignKey {
                    foreign_table: "parents",
                    foreign_column: "rowid",
                    on_delete: ForeignKeyOnChange::Cascade,
                })
            ),
            sqlite_column!("position", &SqlType::Integer, non_null = true),
        ],
        indices: &[],
        unique_constraints: &[&["parent_rowid", "position"]],
    };

    const SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
        version: 0,
        tables: &[PARENT_TABLE, CHILD_TABLE],
        migration: None,
    }];

    const PARENT_TABLE_V1: Table = Table {
        name: "parents",
        columns: &[
            sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("code", &SqlType::Text, non_null = true, is_unique = true),
            sqlite_column!(
                "weight",
                &SqlType::Integer,
                non_null = true,
                default_value = Some("0"),
                check = Some("weight >= 0")
            ),
        ],
        indices: &[("idx_parents_code", "code")],
        unique_constraints: &[],
    };

    fn add_parent_weight(conn: &Connection) -> Result<()> {
        conn.execute(
            "ALTER TABLE parents ADD COLUMN weight INTEGER NOT NULL DEFAULT 0 CHECK (weight >= 0)",
            [],
        )?;
        Ok(())
    }

    const MIGRATED_SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 0,
            tables: &[PARENT_TABLE, CHILD_TABLE],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[PARENT_TABLE_V1, CHILD_TABLE],
            migration: Some(add_parent_weight),
        },
    ];

    fn user_version(conn: &Connection) -> i64 {
        conn.query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        SCHEMAS[0].validate(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, BASE_DB_VERSION as i64);
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE parents (rowid INTEGER PRIMARY KEY, code TEXT NOT NULL UNIQUE)",
            [],
        )
        .unwrap();

        let err = PARENT_TABLE.validate_indices(&conn).unwrap_err();
        assert!(err.to_string().contains("idx_parents_code"));
    }

    #[test]
    fn test_validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE parents (rowid INTEGER PRIMARY KEY)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE children (parent_rowid INTEGER NOT NULL REFERENCES parents(rowid) ON DELETE CASCADE, position INTEGER NOT NULL)",
            [],
        )
        .unwrap();

        let err = CHILD_TABLE.validate_unique_constraints(&conn).unwrap_err();
        assert!(err.to_string().contains("parent_rowid, position"));
    }

    #[test]
    fn test_validate_detects_wrong_on_delete() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE parents (rowid INTEGER PRIMARY KEY)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE children (parent_rowid INTEGER NOT NULL REFERENCES parents(rowid) ON DELETE SET NULL, position INTEGER NOT NULL)",
            [],
        )
        .unwrap();

        let err = CHILD_TABLE.validate_foreign_keys(&conn).unwrap_err();
        assert!(err.to_string().contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_open_versioned_db_reopens_existing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");

        {
            let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
            conn.execute("INSERT INTO parents (code) VALUES ('a')", [])
                .unwrap();
        }

        let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_versioned_db_migrates_older_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");

        {
            let conn = open_versioned_db(&path, SCHEMAS, "test").unwrap();
            conn.execute("INSERT INTO parents (code) VALUES ('a')", [])
                .unwrap();
            assert_eq!(user_version(&conn), BASE_DB_VERSION as i64);
        }

        let conn = open_versioned_db(&path, MIGRATED_SCHEMAS, "test").unwrap();
        assert_eq!(user_version(&conn), (BASE_DB_VERSION + 1) as i64);
        MIGRATED_SCHEMAS[1].validate(&conn).unwrap();

        let weight: i64 = conn
            .query_row("SELECT weight FROM parents WHERE code = 'a'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(weight, 0);
        assert!(conn
            .execute("INSERT INTO parents (code, weight) VALUES ('b', -1)", [])
            .is_err());

        // Reopening at the latest version runs no migration.
        drop(conn);
        let conn = open_versioned_db(&path, MIGRATED_SCHEMAS, "test").unwrap();
        assert_eq!(user_version(&conn), (BASE_DB_VERSION + 1) as i64);
    }

    #[test]
    fn test_validate_detects_missing_check() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[0].create(&conn).unwrap();
        conn.execute(
            "ALTER TABLE parents ADD COLUMN weight INTEGER NOT NULL DEFAULT 0",
            [],
        )
        .unwrap();

        let err = PARENT_TABLE_V1.validate_checks(&conn).unwrap_err();
        assert!(err.to_string().contains("CHECK (weight >= 0)"));
    }

    #[test]
    fn test_open_versioned_db_rejects_foreign_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("foreign.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE something (x INTEGER)", []).unwrap();
        }

        assert!(open_versioned_db(&path, SCHEMAS, "test").is_err());
    }
}
