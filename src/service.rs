// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Catalog persistence orchestration.
//!
//! [`CatalogService`] ties path resolution, the catalog, and the store
//! together. It owns the transactional boundaries: every rice is written in
//! its own transaction, so a failing rice never leaves half of its rows
//! behind, and never takes the rices written before it down with it.
//!
//! Operations take the catalog by mutable reference. Only one writer can
//! hold a catalog, and with it the store connection, at any given time.

use crate::{
    catalog::{
        Catalog, CatalogError, ConfigReport, ContentEntry, FileContents, FileReport, Program,
        Report, RiceConfig,
    },
    path::{CanonicalPath, NoWayHome, PathResolver},
    runner::{whoami, CommandRunner, ShellRunner},
    settings::{RiceSettings, SettingsError},
    store::{
        rows::{self, StoredConfig},
        schema, DriverRegistry, Store, StoreError,
    },
};

use chrono::Utc;
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// What [`CatalogService::delete`] should remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// Every rice of the catalog.
    Catalog,

    /// A single rice, by name.
    Config(String),
}

/// Orchestrates catalog creation, persistence, retrieval, and deletion.
#[derive(Debug)]
pub struct CatalogService<R = ShellRunner>
where
    R: CommandRunner,
{
    settings: RiceSettings,
    resolver: PathResolver,
    runner: R,
    registry: DriverRegistry,
}

impl CatalogService<ShellRunner> {
    /// Construct service that shells out with the configured timeout.
    pub fn with_shell(settings: RiceSettings, resolver: PathResolver) -> Self {
        let runner = ShellRunner::new(settings.command_timeout());
        Self::new(settings, resolver, runner)
    }

    /// Construct service for the current user and working directory.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::NoWayHome`] if home directory is unknown.
    /// - Return [`ServiceError::Settings`] if settings file is unusable.
    pub fn from_env() -> Result<Self> {
        let resolver = PathResolver::from_env()?;
        let settings = RiceSettings::load(&resolver)?;
        Ok(Self::with_shell(settings, resolver))
    }
}

impl<R> CatalogService<R>
where
    R: CommandRunner,
{
    /// Construct new service.
    pub fn new(settings: RiceSettings, resolver: PathResolver, runner: R) -> Self {
        Self {
            settings,
            resolver,
            runner,
            registry: DriverRegistry::default(),
        }
    }

    /// Use custom driver registry for stores created from now on.
    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &RiceSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Construct new catalog bound to the configured store.
    ///
    /// The owning user is asked of the system, falling back to the
    /// environment. The store is not connected yet.
    pub fn create_catalog(&self) -> Catalog {
        let system_user = whoami(&self.runner)
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".into());
        let home = self.resolver.normalize_path(&self.settings.home);
        let store = Store::with_registry(self.settings.connection_string(), self.registry.clone());

        Catalog::new(system_user, home, store)
    }

    /// Resolve executable path of program, best effort.
    pub fn discover<'p>(&self, program: &'p mut Program) -> Option<&'p CanonicalPath> {
        program.discover_path(&self.runner, &self.resolver)
    }

    /// Write every rice of catalog to the store.
    ///
    /// Schema is created when missing. Each rice is replaced in its own
    /// transaction: its row, its programs, its files along with their
    /// current content, and its association rows. File content that cannot
    /// be read is left as previously captured. Rows no rice refers to
    /// anymore are pruned once every rice has been written.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Catalog`] if a file refers to a program the
    ///   catalog does not track. Nothing is written in that case.
    /// - Return [`ServiceError::Persist`] naming the rice whose transaction
    ///   was rolled back.
    /// - Return [`ServiceError::Store`] if the store cannot be reached.
    #[instrument(skip(self, catalog), level = "debug")]
    pub fn persist(&self, catalog: &mut Catalog) -> Result<()> {
        catalog.check_integrity()?;

        let owners: Vec<Program> = catalog
            .configs
            .iter()
            .flat_map(|config| config.programs().iter().cloned())
            .collect();
        let Catalog { store, configs, .. } = catalog;
        store.with_connection(|conn| {
            schema::create_schema(conn)?;
            for config in configs.iter() {
                persist_config(conn, config, &owners).map_err(|source| ServiceError::Persist {
                    config: config.name().into(),
                    source,
                })?;
                info!("persisted rice {:?}", config.name());
            }

            // INVARIANT: Prune only after every rice is written, so a file
            // moving between rices keeps its captured content.
            prune(conn)?;

            Ok(())
        })
    }

    /// Replace catalog's rices with the ones stored.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Store`] if stored rows cannot be read.
    /// - Return [`ServiceError::Catalog`] if stored rows conflict.
    #[instrument(skip(self, catalog), level = "debug")]
    pub fn load(&self, catalog: &mut Catalog) -> Result<()> {
        let stored = self.read_stored(catalog, false)?;
        let mut configs = Vec::with_capacity(stored.len());
        for entry in stored {
            let mut config = RiceConfig::new(entry.name)?;
            config.add_programs(entry.programs)?;
            config.add_files(entry.files.into_iter().map(|stored| stored.file))?;
            configs.push(config);
        }

        catalog.configs.clear();
        catalog.add_configs(configs)?;
        info!("loaded {} rices", catalog.configs.len());

        Ok(())
    }

    /// List stored file paths and program names of every stored rice.
    ///
    /// Content comes from what was captured at persist time. Neither the
    /// store nor the filesystem is modified.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Store`] if stored rows cannot be read.
    #[instrument(skip(self, catalog), level = "debug")]
    pub fn retrieve_all(&self, catalog: &mut Catalog, include_content: bool) -> Result<Report> {
        let stored = self.read_stored(catalog, include_content)?;
        let configs = stored
            .into_iter()
            .map(|entry| ConfigReport {
                name: entry.name,
                programs: entry
                    .programs
                    .iter()
                    .map(|program| program.name().to_string())
                    .collect(),
                files: entry
                    .files
                    .into_iter()
                    .map(|stored| FileReport {
                        name: stored.file.name().into(),
                        path: stored.file.path().clone(),
                        contents: match (include_content, stored.contents) {
                            (false, _) => ContentEntry::Omitted,
                            (true, Some(contents)) => ContentEntry::Loaded(contents),
                            (true, None) => {
                                ContentEntry::Unavailable("content was never captured".into())
                            }
                        },
                    })
                    .collect(),
            })
            .collect();

        Ok(Report { configs })
    }

    /// Remove rice or entire catalog from store and memory.
    ///
    /// With `backup` set, the store is first exported to a file stamped with
    /// the time of this call, whose path is returned. Nothing is exported
    /// while nothing is stored yet. Files and programs still used by a
    /// surviving rice are kept.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Catalog`] if the named rice exists neither
    ///   in the store nor in the catalog.
    /// - Return [`ServiceError::Store`] if backup or deletion fails. Nothing
    ///   is removed in that case.
    #[instrument(skip(self, catalog), level = "debug")]
    pub fn delete(
        &self,
        catalog: &mut Catalog,
        target: DeleteTarget,
        backup: bool,
    ) -> Result<Option<PathBuf>> {
        let stamp = Utc::now();
        let initialized = self.is_initialized(catalog)?;
        if let DeleteTarget::Config(name) = &target {
            let stored = initialized
                && catalog
                    .store
                    .with_connection(|conn| rows::config_exists(conn, name))?;
            if !stored && catalog.config(name).is_none() {
                return Err(CatalogError::UnknownConfig(name.clone()).into());
            }
        }

        let backup_path = if backup && initialized {
            let path = self
                .settings
                .backup_dir()
                .join(format!("rice-{}.db", stamp.format("%Y%m%dT%H%M%S%.3fZ")));
            catalog.store.backup_to(&path)?;
            Some(path)
        } else {
            if backup {
                warn!("nothing stored yet, no backup written");
            }
            None
        };

        if initialized {
            catalog.store.with_connection(|conn| {
                let tx = conn.transaction()?;
                match &target {
                    DeleteTarget::Catalog => rows::clear_all(&tx)?,
                    DeleteTarget::Config(name) => {
                        rows::delete_config(&tx, name)?;
                    }
                }
                tx.commit()?;
                Ok::<_, StoreError>(())
            })?;
        }

        match target {
            DeleteTarget::Catalog => {
                catalog.configs.clear();
                warn!("deleted every rice");
            }
            DeleteTarget::Config(name) => {
                catalog.remove_config(&name);
                warn!("deleted rice {name:?}");
            }
        }

        Ok(backup_path)
    }

    /// Check whether the store holds a schema, without creating either.
    fn is_initialized(&self, catalog: &mut Catalog) -> Result<bool> {
        if !catalog.store.exists() {
            debug!("no database behind {}", catalog.store.conn_str());
            return Ok(false);
        }

        Ok(catalog
            .store
            .with_connection(|conn| schema::is_initialized(conn))?)
    }

    // INVARIANT: Reading never creates the database nor its schema.
    fn read_stored(&self, catalog: &mut Catalog, with_contents: bool) -> Result<Vec<StoredConfig>> {
        if !self.is_initialized(catalog)? {
            return Ok(Vec::new());
        }

        let resolver = &self.resolver;
        Ok(catalog
            .store
            .with_connection(|conn| rows::read_configs(conn, resolver, with_contents))?)
    }
}

fn persist_config(
    conn: &mut Connection,
    config: &RiceConfig,
    owners: &[Program],
) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    let config_id = rows::upsert_config(&tx, config.name())?;

    // INVARIANT: Stored membership mirrors the in-memory rice exactly.
    rows::clear_links(&tx, config_id)?;
    for program in config.programs() {
        rows::upsert_program(&tx, program, config_id)?;
    }

    for file in config.files() {
        if config.programs().iter().all(|program| program.id() != file.program()) {
            if let Some(owner) = owners.iter().find(|owner| owner.id() == file.program()) {
                rows::ensure_program(&tx, owner)?;
            }
        }

        let contents = match file.contents() {
            Ok(contents) => Some(contents),
            Err(CatalogError::Decode { encoding, .. }) => {
                warn!("content of {:?} is not {encoding}, keeping raw bytes", file.name());
                file.read_bytes().ok().map(FileContents::Bytes)
            }
            Err(error) => {
                warn!("cannot capture content of {:?}: {error}", file.name());
                None
            }
        };
        rows::upsert_file(&tx, file, contents.as_ref(), config_id)?;
    }

    for program in config.programs() {
        let own = config
            .files()
            .iter()
            .find(|file| file.program() == program.id() && file.path() == program.config_path());
        if let Some(file) = own {
            rows::set_program_file(&tx, program.id(), file.id())?;
        }
    }

    tx.commit()?;

    Ok(())
}

fn prune(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    rows::prune_orphans(&tx)?;
    tx.commit()?;

    Ok(())
}

/// Service error types.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Catalog validation or integrity failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Store could not be reached or queried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rice could not be written, its transaction was rolled back.
    #[error("failed to persist rice {config:?}")]
    Persist {
        config: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

/// Friendly result alias :3
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::File, runner::CommandError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct NoCommands;

    impl CommandRunner for NoCommands {
        fn run(&self, command_line: &str) -> crate::runner::Result<String> {
            Err(CommandError::NotFound {
                command: command_line.into(),
            })
        }
    }

    fn service(dir: &TempDir) -> CatalogService<NoCommands> {
        let resolver = PathResolver::new(dir.path(), dir.path());
        let settings = RiceSettings::new(dir.path().join(".config").join("rice"));
        CatalogService::new(settings, resolver, NoCommands)
    }

    fn count(service: &CatalogService<NoCommands>, table: &str) -> anyhow::Result<i64> {
        let mut store = Store::new(service.settings().connection_string());
        Ok(store.with_connection(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(StoreError::from)
        })?)
    }

    #[test]
    fn create_catalog_binds_configured_store() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let catalog = service.create_catalog();
        assert!(!catalog.store().is_open());
        assert_eq!(catalog.store().conn_str(), service.settings().connection_string());
        assert_eq!(
            catalog.home().as_path(),
            dir.path().join(".config").join("rice").as_path()
        );

        Ok(())
    }

    #[test]
    fn persist_rejects_dangling_owner_before_writing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let resolver = service.resolver().clone();
        let program = Program::new(&resolver, "kitty", "kitty", "~/.config/kitty")?;
        let file = File::new(&resolver, "kitty.conf", "~/.config/kitty/kitty.conf", &program)?;

        let mut catalog = service.create_catalog();
        let mut rice = RiceConfig::new("default")?;
        rice.add_file(file)?;
        catalog.add_config(rice)?;

        let error = service.persist(&mut catalog).unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Catalog(CatalogError::MissingProgram { .. })
        ));
        assert!(!service.settings().database_path().exists());

        Ok(())
    }

    #[test]
    fn persist_is_repeatable_and_mirrors_membership() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let resolver = service.resolver().clone();
        std::fs::write(dir.path().join(".vimrc"), "set number\n")?;

        let vim = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let vimrc = File::new(&resolver, "vimrc", "~/.vimrc", &vim)?;
        let mut rice = RiceConfig::new("default")?;
        rice.add_program(vim)?;
        rice.add_file(vimrc)?;

        let mut catalog = service.create_catalog();
        catalog.add_config(rice)?;
        service.persist(&mut catalog)?;
        service.persist(&mut catalog)?;
        assert_eq!(count(&service, "config")?, 1);
        assert_eq!(count(&service, "file")?, 1);
        assert_eq!(count(&service, "program")?, 1);
        assert_eq!(count(&service, "config_file_relations")?, 1);

        let report = service.retrieve_all(&mut catalog, true)?;
        let default = report.config("default").expect("default stored");
        assert_eq!(
            default.files[0].contents,
            ContentEntry::Loaded(FileContents::Text("set number\n".into()))
        );

        Ok(())
    }

    #[test]
    fn load_restores_identities() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let resolver = service.resolver().clone();
        let vim = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let vimrc = File::new(&resolver, "vimrc", "~/.vimrc", &vim)?;
        let mut rice = RiceConfig::new("default")?;
        rice.add_program(vim.clone())?;
        rice.add_file(vimrc.clone())?;

        let mut catalog = service.create_catalog();
        catalog.add_config(rice)?;
        service.persist(&mut catalog)?;

        let mut fresh = service.create_catalog();
        service.load(&mut fresh)?;
        let default = fresh.config("default").expect("default loaded");
        assert_eq!(default.programs(), [vim].as_slice());
        assert_eq!(default.files(), [vimrc].as_slice());

        Ok(())
    }

    #[test]
    fn delete_unknown_rice_fails() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let mut catalog = service.create_catalog();
        let error = service
            .delete(&mut catalog, DeleteTarget::Config("nope".into()), true)
            .unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Catalog(CatalogError::UnknownConfig(_))
        ));
        assert!(!service.settings().database_path().exists());

        Ok(())
    }

    #[test]
    fn delete_unknown_rice_writes_no_backup() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let mut catalog = service.create_catalog();
        catalog.add_config(RiceConfig::new("dark")?)?;
        service.persist(&mut catalog)?;

        let error = service
            .delete(&mut catalog, DeleteTarget::Config("nope".into()), true)
            .unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Catalog(CatalogError::UnknownConfig(name)) if name == "nope"
        ));
        assert!(!service.settings().backup_dir().exists());
        assert_eq!(count(&service, "config")?, 1);
        assert!(catalog.config("dark").is_some());

        Ok(())
    }

    #[test]
    fn reading_fresh_home_creates_nothing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let mut catalog = service.create_catalog();

        assert!(service.retrieve_all(&mut catalog, true)?.configs.is_empty());
        service.load(&mut catalog)?;
        assert!(catalog.configs().is_empty());
        assert!(!catalog.store().is_open());
        assert!(!service.settings().database_path().exists());
        assert!(!service.settings().home.exists());

        Ok(())
    }

    #[test]
    fn reading_foreign_database_creates_no_schema() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let db = service.settings().database_path();
        std::fs::create_dir_all(&service.settings().home)?;
        Connection::open(&db)?.execute_batch("CREATE TABLE unrelated (id INTEGER);")?;

        let mut catalog = service.create_catalog();
        assert!(service.retrieve_all(&mut catalog, false)?.configs.is_empty());
        let conn = Connection::open(&db)?;
        assert!(!schema::is_initialized(&conn)?);

        Ok(())
    }

    #[test]
    fn failing_rice_rolls_back_alone() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let resolver = service.resolver().clone();
        let mut store = Store::new(service.settings().connection_string());
        store.with_connection(|conn| {
            schema::create_schema(conn)?;
            conn.execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON file
                 WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
            )?;
            Ok::<_, StoreError>(())
        })?;

        let vim = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let vimrc = File::new(&resolver, "vimrc", "~/.vimrc", &vim)?;
        let boom = File::new(&resolver, "boom", "~/.boomrc", &vim)?;
        let mut first = RiceConfig::new("first")?;
        first.add_program(vim.clone())?;
        first.add_file(vimrc)?;
        let mut second = RiceConfig::new("second")?;
        second.add_program(vim)?;
        second.add_file(boom)?;

        let mut catalog = service.create_catalog();
        catalog.add_configs([first, second])?;
        let error = service.persist(&mut catalog).unwrap_err();
        assert!(matches!(
            &error,
            ServiceError::Persist { config, .. } if config == "second"
        ));

        let report = service.retrieve_all(&mut catalog, false)?;
        assert_eq!(report.configs.len(), 1);
        assert_eq!(report.configs[0].name, "first");
        assert_eq!(report.configs[0].files.len(), 1);
        assert_eq!(count(&service, "config")?, 1);
        assert_eq!(count(&service, "file")?, 1);
        assert_eq!(count(&service, "config_file_relations")?, 1);
        assert_eq!(count(&service, "config_program_relations")?, 1);

        Ok(())
    }

    #[test]
    fn delete_catalog_with_backup() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let service = service(&dir);
        let mut catalog = service.create_catalog();
        catalog.add_configs([RiceConfig::new("dark")?, RiceConfig::new("light")?])?;
        service.persist(&mut catalog)?;

        let backup = service
            .delete(&mut catalog, DeleteTarget::Catalog, true)?
            .expect("backup requested");
        assert!(backup.starts_with(service.settings().backup_dir()));
        assert!(backup.exists());
        assert!(catalog.configs().is_empty());
        assert_eq!(count(&service, "config")?, 0);

        let mut restored = Store::new(format!("sqlite://{}", backup.display()));
        let names: i64 = restored.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM config", [], |row| row.get(0))
                .map_err(StoreError::from)
        })?;
        assert_eq!(names, 2);

        Ok(())
    }
}
