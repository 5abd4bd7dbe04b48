// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Row level reads and writes.
//!
//! Writers take a plain [`Connection`] so callers can hand in a
//! [`Transaction`](rusqlite::Transaction) and decide where the atomic
//! boundary sits. None of these functions open transactions themselves.

use crate::{
    catalog::{File, FileContents, FileId, Program, ProgramId, TextEncoding},
    path::{CanonicalPath, PathResolver},
    store::{Result, StoreError},
};

use rusqlite::{
    params,
    types::{Value, ValueRef},
    Connection, OptionalExtension,
};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Rice as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConfig {
    pub id: i64,
    pub name: String,
    pub programs: Vec<Program>,
    pub files: Vec<StoredFile>,
}

/// File as read back from the database, with its captured content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file: File,
    pub contents: Option<FileContents>,
}

/// Hex SHA-256 digest of content.
pub fn content_hash(contents: &FileContents) -> String {
    hex::encode(Sha256::digest(contents.as_bytes()))
}

/// Insert rice row if missing, yielding its row id either way.
pub fn upsert_config(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO config (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        [name],
    )?;

    Ok(conn.query_row("SELECT id FROM config WHERE name = ?1", [name], |row| {
        row.get(0)
    })?)
}

/// Insert or update program row, and list it under rice `config_id`.
///
/// The first rice to register a program stays its `config_id`.
pub fn upsert_program(conn: &Connection, program: &Program, config_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO program (id, name, path, config_id, executable, config_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             path = excluded.path,
             executable = excluded.executable,
             config_path = excluded.config_path,
             config_id = COALESCE(program.config_id, excluded.config_id)",
        params![
            program.id().to_string(),
            program.name(),
            program.path().map(CanonicalPath::to_string_lossy),
            config_id,
            program.executable(),
            program.config_path().to_string_lossy(),
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO config_program_relations (config_id, program_id) VALUES (?1, ?2)",
        params![config_id, program.id().to_string()],
    )?;

    Ok(())
}

/// Insert program row without listing it under any rice.
///
/// Used for owners of files whose program is listed by a different rice.
/// Existing rows are left untouched.
pub fn ensure_program(conn: &Connection, program: &Program) -> Result<()> {
    conn.execute(
        "INSERT INTO program (id, name, path, executable, config_path)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO NOTHING",
        params![
            program.id().to_string(),
            program.name(),
            program.path().map(CanonicalPath::to_string_lossy),
            program.executable(),
            program.config_path().to_string_lossy(),
        ],
    )?;

    Ok(())
}

/// Insert or update file row, and list it under rice `config_id`.
///
/// Missing `contents` keeps whatever content was captured before.
pub fn upsert_file(
    conn: &Connection,
    file: &File,
    contents: Option<&FileContents>,
    config_id: i64,
) -> Result<()> {
    let hash = contents.map(content_hash);
    let value = match contents {
        Some(FileContents::Text(text)) => Value::Text(text.clone()),
        Some(FileContents::Bytes(bytes)) => Value::Blob(bytes.clone()),
        None => Value::Null,
    };

    conn.execute(
        "INSERT INTO file (id, hash, contents, path, name, program_id, use_bytes, encoding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             hash = COALESCE(excluded.hash, file.hash),
             contents = COALESCE(excluded.contents, file.contents),
             path = excluded.path,
             name = excluded.name,
             program_id = excluded.program_id,
             use_bytes = excluded.use_bytes,
             encoding = excluded.encoding",
        params![
            file.id().to_string(),
            hash,
            value,
            file.path().to_string_lossy(),
            file.name(),
            file.program().to_string(),
            file.use_bytes(),
            file.encoding().to_string(),
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO config_file_relations (config_id, file_id) VALUES (?1, ?2)",
        params![config_id, file.id().to_string()],
    )?;

    Ok(())
}

/// Point program at the tracked file holding its own configuration.
pub fn set_program_file(conn: &Connection, program: ProgramId, file: FileId) -> Result<()> {
    conn.execute(
        "UPDATE program SET file_id = ?2 WHERE id = ?1",
        params![program.to_string(), file.to_string()],
    )?;

    Ok(())
}

/// Drop every association row of rice `config_id`.
pub fn clear_links(conn: &Connection, config_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM config_file_relations WHERE config_id = ?1",
        [config_id],
    )?;
    conn.execute(
        "DELETE FROM config_program_relations WHERE config_id = ?1",
        [config_id],
    )?;

    Ok(())
}

/// Delete files and programs no rice refers to anymore.
///
/// A program survives as long as any rice lists it, or any surviving file
/// belongs to it. Programs whose registering rice is gone are handed over
/// to another rice that still lists them.
pub fn prune_orphans(conn: &Connection) -> Result<(usize, usize)> {
    let files = conn.execute(
        "DELETE FROM file WHERE id NOT IN (SELECT file_id FROM config_file_relations)",
        [],
    )?;
    let programs = conn.execute(
        "DELETE FROM program
         WHERE id NOT IN (SELECT program_id FROM config_program_relations)
           AND id NOT IN (SELECT program_id FROM file WHERE program_id IS NOT NULL)",
        [],
    )?;
    conn.execute(
        "UPDATE program SET config_id = (
             SELECT MIN(config_id) FROM config_program_relations
             WHERE config_program_relations.program_id = program.id
         )
         WHERE config_id IS NULL",
        [],
    )?;
    debug!("pruned {files} orphaned files and {programs} orphaned programs");

    Ok((files, programs))
}

/// Check whether rice `name` is stored.
pub fn config_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM config WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(found.is_some())
}

/// Delete rice `name` along with its association rows.
///
/// Programs listed by the deleted rice that own files of other rices are
/// listed under those rices instead. Yields `false` if no such rice is
/// stored.
pub fn delete_config(conn: &Connection, name: &str) -> Result<bool> {
    let id: Option<i64> = conn
        .query_row("SELECT id FROM config WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(id) = id else {
        return Ok(false);
    };

    conn.execute(
        "INSERT OR IGNORE INTO config_program_relations (config_id, program_id)
         SELECT DISTINCT r.config_id, f.program_id
         FROM config_file_relations r
         JOIN file f ON f.id = r.file_id
         WHERE r.config_id != ?1
           AND f.program_id IN (
               SELECT program_id FROM config_program_relations WHERE config_id = ?1
           )",
        [id],
    )?;
    clear_links(conn, id)?;
    conn.execute("UPDATE program SET config_id = NULL WHERE config_id = ?1", [id])?;
    conn.execute("DELETE FROM config WHERE id = ?1", [id])?;
    prune_orphans(conn)?;

    Ok(true)
}

/// Delete every row of every table. The schema stays.
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DELETE FROM config_file_relations;
        DELETE FROM config_program_relations;
        UPDATE program SET file_id = NULL;
        DELETE FROM file;
        DELETE FROM program;
        DELETE FROM config;
        ",
    )?;

    Ok(())
}

struct ProgramRow {
    id: String,
    name: String,
    executable: String,
    config_path: String,
    path: Option<String>,
}

struct FileRow {
    id: String,
    name: String,
    path: String,
    program_id: Option<String>,
    use_bytes: bool,
    encoding: String,
    contents: Option<FileContents>,
}

fn corrupt(table: &'static str, id: &str, reason: impl ToString) -> StoreError {
    StoreError::CorruptRow {
        table,
        id: id.into(),
        reason: reason.to_string(),
    }
}

/// Read every stored rice in creation order.
///
/// Paths pass through `resolver` again, which leaves canonical paths as
/// they are. Content is only kept when `with_contents` is set.
pub fn read_configs(
    conn: &Connection,
    resolver: &PathResolver,
    with_contents: bool,
) -> Result<Vec<StoredConfig>> {
    let mut stmt = conn.prepare("SELECT id, name FROM config ORDER BY id")?;
    let configs = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stored = Vec::with_capacity(configs.len());
    for (id, name) in configs {
        stored.push(StoredConfig {
            id,
            name,
            programs: read_programs(conn, resolver, id)?,
            files: read_files(conn, resolver, id, with_contents)?,
        });
    }

    Ok(stored)
}

fn read_programs(conn: &Connection, resolver: &PathResolver, config_id: i64) -> Result<Vec<Program>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.executable, p.config_path, p.path
         FROM program p
         JOIN config_program_relations r ON r.program_id = p.id
         WHERE r.config_id = ?1
         ORDER BY r.rowid",
    )?;
    let rows = stmt
        .query_map([config_id], |row| {
            Ok(ProgramRow {
                id: row.get(0)?,
                name: row.get(1)?,
                executable: row.get(2)?,
                config_path: row.get(3)?,
                path: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|row| {
            let id = row
                .id
                .parse::<ProgramId>()
                .map_err(|error| corrupt("program", &row.id, error))?;
            Ok(Program::restore(
                id,
                row.name,
                row.executable,
                resolver.normalize_path(row.config_path),
                row.path
                    .filter(|path| !path.is_empty())
                    .map(|path| resolver.normalize_path(path)),
            ))
        })
        .collect()
}

fn read_files(
    conn: &Connection,
    resolver: &PathResolver,
    config_id: i64,
    with_contents: bool,
) -> Result<Vec<StoredFile>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.name, f.path, f.program_id, f.use_bytes, f.encoding, f.contents
         FROM file f
         JOIN config_file_relations r ON r.file_id = f.id
         WHERE r.config_id = ?1
         ORDER BY r.rowid",
    )?;
    let rows = stmt
        .query_map([config_id], |row| {
            let use_bytes: bool = row.get(4)?;
            let contents = match row.get_ref(6)? {
                ValueRef::Text(text) if !use_bytes => Some(FileContents::Text(
                    String::from_utf8_lossy(text).into_owned(),
                )),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(FileContents::Bytes(bytes.to_vec()))
                }
                _ => None,
            };

            Ok(FileRow {
                id: row.get(0)?,
                name: row.get(1)?,
                path: row.get(2)?,
                program_id: row.get(3)?,
                use_bytes,
                encoding: row.get(5)?,
                contents,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|row| {
            let id = row
                .id
                .parse::<FileId>()
                .map_err(|error| corrupt("file", &row.id, error))?;
            let program = row
                .program_id
                .as_deref()
                .ok_or_else(|| corrupt("file", &row.id, "no owning program"))?
                .parse::<ProgramId>()
                .map_err(|error| corrupt("file", &row.id, error))?;
            let encoding = row
                .encoding
                .parse::<TextEncoding>()
                .map_err(|error| corrupt("file", &row.id, error))?;

            Ok(StoredFile {
                file: File::restore(
                    id,
                    row.name,
                    resolver.normalize_path(row.path),
                    program,
                    row.use_bytes,
                    encoding,
                ),
                contents: if with_contents { row.contents } else { None },
            })
        })
        .collect()
}
