// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Catalog of dotfile configurations.
//!
//! A __rice__ is a named configuration of a desktop setup: the programs that
//! make it up and the configuration files they read. A user keeps any
//! number of rices in a __catalog__, which is persisted into a relational
//! database together with the content of every tracked file at the time it
//! was persisted.
//!
//! # Layout
//!
//! - [`path`] turns user supplied paths into canonical absolute paths.
//! - [`runner`] runs external commands to locate executables.
//! - [`catalog`] holds the in-memory model and its validation rules.
//! - [`store`] manages the database connection, schema, and rows.
//! - [`service`] moves catalogs in and out of the store.
//! - [`settings`] reads the `rice.toml` settings file.

pub mod catalog;
pub mod path;
pub mod runner;
pub mod service;
pub mod settings;
pub mod store;

pub use catalog::{Catalog, CatalogError, File, Program, RiceConfig};
pub use service::{CatalogService, DeleteTarget, ServiceError};
pub use settings::RiceSettings;
pub use store::{Store, StoreError};
