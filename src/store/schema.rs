// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Relational schema of the rice database.
//!
//! The `config`, `file`, `program`, and `config_file_relations` tables are
//! the on-disk contract. Columns beyond the canonical set are purely
//! additive so older readers keep working:
//!
//! - `file.program_id` records the owning program of each file.
//! - `file.use_bytes` and `file.encoding` record how content is read.
//! - `program.executable` and `program.config_path` complete a program.
//! - `config_program_relations` records which rices list which programs.
//!
//! `config_file_relations` is an index of which rices use a file. It never
//! decides ownership, that is `file.program_id`'s job.

use crate::store::Result;

use rusqlite::Connection;

pub const CONFIG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
"#;

/// Program table.
///
/// `config_id` is the rice that first registered the program. `file_id` is
/// the tracked file living at the program's own `config_path`, if any.
pub const PROGRAM_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS program (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    path TEXT,
    config_id INTEGER REFERENCES config(id) ON DELETE SET NULL,
    file_id TEXT REFERENCES file(id) ON DELETE SET NULL,
    executable TEXT NOT NULL DEFAULT '',
    config_path TEXT NOT NULL DEFAULT ''
);
"#;

/// File table.
///
/// `contents` holds text for text files and a blob for binary ones. `hash`
/// is the hex SHA-256 of whatever `contents` holds.
pub const FILE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS file (
    id TEXT PRIMARY KEY NOT NULL,
    hash TEXT,
    contents TEXT,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    program_id TEXT REFERENCES program(id),
    use_bytes INTEGER NOT NULL DEFAULT 0,
    encoding TEXT NOT NULL DEFAULT 'utf-8'
);

CREATE INDEX IF NOT EXISTS idx_file_program_id ON file(program_id);
"#;

pub const CONFIG_FILE_RELATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config_file_relations (
    config_id INTEGER NOT NULL REFERENCES config(id),
    file_id TEXT NOT NULL REFERENCES file(id),
    PRIMARY KEY (config_id, file_id)
);

CREATE INDEX IF NOT EXISTS idx_config_file_relations_file_id ON config_file_relations(file_id);
"#;

pub const CONFIG_PROGRAM_RELATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS config_program_relations (
    config_id INTEGER NOT NULL REFERENCES config(id),
    program_id TEXT NOT NULL REFERENCES program(id),
    PRIMARY KEY (config_id, program_id)
);

CREATE INDEX IF NOT EXISTS idx_config_program_relations_program_id
    ON config_program_relations(program_id);
"#;

/// Get all schema creation statements in dependency order.
pub fn all_schemas() -> Vec<&'static str> {
    vec![
        CONFIG_TABLE,
        PROGRAM_TABLE,
        FILE_TABLE,
        CONFIG_FILE_RELATIONS_TABLE,
        CONFIG_PROGRAM_RELATIONS_TABLE,
    ]
}

/// Create every table that does not exist yet.
///
/// Safe to call on an initialized database.
///
/// # Errors
///
/// - Return [`StoreError::Sqlite`](crate::store::StoreError::Sqlite) if a
///   statement fails.
pub fn create_schema(conn: &Connection) -> Result<()> {
    for sql in all_schemas() {
        conn.execute_batch(sql)?;
    }

    Ok(())
}

/// Check whether the schema has been created, without creating it.
///
/// # Errors
///
/// - Return [`StoreError::Sqlite`](crate::store::StoreError::Sqlite) if the
///   catalog of tables cannot be queried.
pub fn is_initialized(conn: &Connection) -> Result<bool> {
    let tables: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'table'
           AND name IN (
               'config', 'program', 'file',
               'config_file_relations', 'config_program_relations'
           )",
        [],
        |row| row.get(0),
    )?;

    Ok(tables == all_schemas().len() as i64)
}
