// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rice database connection management.
//!
//! The __store__ is the relational database that persists a catalog. A
//! [`Store`] knows how to reach its database through a connection string of
//! the form `<driver>://<target>`, e.g., `sqlite://~/.config/rice/rice.db`,
//! but does not touch it until asked to.
//!
//! # Connection Lifecycle
//!
//! A store is either closed or open. Connecting an open store reuses the
//! live handle, and closing a closed store does nothing. This makes it safe
//! to keep one connection open across many catalog operations in a single
//! run, while [`Store::with_connection`] still guarantees that a connection
//! opened just for one operation is released again on every exit path.
//!
//! # Drivers
//!
//! Drivers are looked up by name in a [`DriverRegistry`] when connecting.
//! Unknown drivers are only reported at that point.

pub mod rows;
pub mod schema;

use rusqlite::Connection;
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, info, instrument};

/// Open connection to a driver specific target.
pub type Connector = fn(&str) -> Result<Connection>;

/// Mapping of driver names to connectors.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Connector>,
}

impl DriverRegistry {
    /// Construct registry without any drivers.
    pub fn empty() -> Self {
        Self {
            drivers: BTreeMap::new(),
        }
    }

    /// Register `connector` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, connector: Connector) -> &mut Self {
        self.drivers.insert(name.into(), connector);
        self
    }

    pub fn get(&self, name: &str) -> Option<Connector> {
        self.drivers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("sqlite", connect_sqlite);
        registry
    }
}

/// Connect to SQLite database file, or `:memory:` for a private one.
///
/// Creates missing parent directories of the database file.
///
/// # Errors
///
/// - Return [`StoreError::Io`] if parent directories cannot be created.
/// - Return [`StoreError::Sqlite`] if the database cannot be opened.
pub fn connect_sqlite(target: &str) -> Result<Connection> {
    if target == ":memory:" {
        return Ok(Connection::open_in_memory()?);
    }

    if let Some(parent) = Path::new(target).parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(Connection::open(target)?)
}

/// Handle to the rice database.
#[derive(Debug)]
pub struct Store {
    conn_str: String,
    registry: DriverRegistry,
    connection: Option<Connection>,
}

impl Store {
    /// Construct closed store with the default driver registry.
    pub fn new(conn_str: impl Into<String>) -> Self {
        Self::with_registry(conn_str, DriverRegistry::default())
    }

    /// Construct closed store with a custom driver registry.
    pub fn with_registry(conn_str: impl Into<String>, registry: DriverRegistry) -> Self {
        Self {
            conn_str: conn_str.into(),
            registry,
            connection: None,
        }
    }

    pub fn conn_str(&self) -> &str {
        self.conn_str.as_str()
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Check whether the database already exists, without creating it.
    ///
    /// An open store always exists. A closed private `sqlite://:memory:`
    /// database never does. SQLite files are looked up on disk. Targets of
    /// other drivers are assumed to exist, and malformed connection strings
    /// are left for [`Store::connect`] to report.
    pub fn exists(&self) -> bool {
        if self.is_open() {
            return true;
        }

        match self.conn_str.split_once("://") {
            Some(("sqlite", ":memory:")) => false,
            Some(("sqlite", target)) => Path::new(target).exists(),
            _ => true,
        }
    }

    /// Connect to database, or reuse the live connection.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::MalformedConnectionString`] if connection
    ///   string lacks a driver.
    /// - Return [`StoreError::UnsupportedDriver`] if driver is unknown.
    /// - Return [`StoreError::Connection`] if the driver fails to connect.
    #[instrument(skip(self), fields(conn_str = %self.conn_str), level = "debug")]
    pub fn connect(&mut self) -> Result<&mut Connection> {
        if self.connection.is_none() {
            let (driver, target) = self
                .conn_str
                .split_once("://")
                .ok_or_else(|| StoreError::MalformedConnectionString(self.conn_str.clone()))?;
            let connector = self
                .registry
                .get(driver)
                .ok_or_else(|| StoreError::UnsupportedDriver(driver.into()))?;

            let conn = connector(target).map_err(|source| StoreError::Connection {
                source: Box::new(source),
                conn_str: self.conn_str.clone(),
            })?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            info!("connected to {}", self.conn_str);
            self.connection = Some(conn);
        } else {
            debug!("reuse open connection");
        }

        self.connection.as_mut().ok_or(StoreError::Closed)
    }

    /// Keep connection open for a long running session.
    ///
    /// # Errors
    ///
    /// See [`Store::connect`].
    pub fn open(&mut self) -> Result<()> {
        self.connect().map(|_| ())
    }

    /// Release connection. Closing a closed store does nothing.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Sqlite`] if the database refuses to close.
    #[instrument(skip(self), level = "debug")]
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            conn.close().map_err(|(_, error)| error)?;
            info!("closed connection to {}", self.conn_str);
        }

        Ok(())
    }

    /// Borrow live connection.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Closed`] if the store is not open.
    pub fn connection(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(StoreError::Closed)
    }

    /// Run `f` with a live connection.
    ///
    /// Connection is released afterwards, whether `f` succeeds or not, if
    /// and only if this call was the one that opened it. An open session
    /// stays open.
    ///
    /// # Errors
    ///
    /// - Return whatever [`Store::connect`] or `f` return.
    pub fn with_connection<T, E>(
        &mut self,
        f: impl FnOnce(&mut Connection) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let opened_here = !self.is_open();
        let result = match self.connect() {
            Ok(conn) => f(conn),
            Err(error) => return Err(error.into()),
        };

        if opened_here {
            let closed = self.close();
            if let (Ok(_), Err(error)) = (&result, closed) {
                return Err(error.into());
            }
        }

        result
    }

    /// Create every missing table.
    ///
    /// # Errors
    ///
    /// See [`Store::connect`] and [`schema::create_schema`].
    pub fn create_schema(&mut self) -> Result<()> {
        self.with_connection(|conn| schema::create_schema(conn))
    }

    /// Export the whole database into a fresh SQLite file at `path`.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::BackupExists`] if `path` already exists.
    /// - Return [`StoreError::Io`] if parent directories cannot be created.
    /// - Return [`StoreError::Sqlite`] if the export fails.
    #[instrument(skip(self, path), level = "debug")]
    pub fn backup_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StoreError::BackupExists(path.to_path_buf()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.with_connection(|conn| {
            conn.execute("VACUUM INTO ?1", [path.to_string_lossy().into_owned()])?;
            Ok::<_, StoreError>(())
        })?;
        info!("backed up {} to {}", self.conn_str, path.display());

        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection string has no `<driver>://` prefix.
    #[error("malformed connection string {0:?}, expected <driver>://<target>")]
    MalformedConnectionString(String),

    /// No connector registered under driver name.
    #[error("unsupported database driver {0:?}")]
    UnsupportedDriver(String),

    /// Connector failed to reach its target.
    #[error("failed to connect to {conn_str:?}")]
    Connection {
        #[source]
        source: Box<StoreError>,
        conn_str: String,
    },

    /// Operation needs an open store.
    #[error("store is not connected")]
    Closed,

    /// Backup target is taken.
    #[error("backup target {0:?} already exists")]
    BackupExists(std::path::PathBuf),

    /// Stored row cannot be turned back into an entry.
    #[error("corrupt {table} row {id:?}: {reason}")]
    CorruptRow {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
