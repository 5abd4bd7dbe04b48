// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rice catalog domain representation.
//!
//! A __rice__ is a named bundle of customizations: a set of tracked programs
//! along with the configuration files that belong to them. All rices of a
//! user live inside one [`Catalog`], which also holds the [`Store`] that
//! persists them.
//!
//! # Ownership
//!
//! Every [`File`] is owned by exactly one [`Program`], but that ownership is
//! only a [`ProgramId`] reference. The owning program must be tracked
//! somewhere in the same catalog before the catalog can be persisted. Files
//! themselves may be shared by as many rices as the user likes.
//!
//! # Batch Additions
//!
//! Additions to rices and catalogs are all-or-nothing. A batch is validated
//! completely before anything is inserted, so a rejected batch leaves the
//! target exactly as it was. Adding an entry that is already present is a
//! no-op.

pub mod entity;
pub mod report;

pub use entity::{ConfigId, File, FileContents, FileId, Program, ProgramId, TextEncoding};
pub use report::{ConfigReport, ContentEntry, ContentMode, FileReport, Report};

use crate::{path::CanonicalPath, store::Store};

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::warn;

/// Named bundle of tracked programs and files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiceConfig {
    id: ConfigId,
    name: String,
    files: Vec<File>,
    programs: Vec<Program>,
}

impl RiceConfig {
    /// Construct new empty rice.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::EmptyName`] if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id: ConfigId::new(),
            name: entity::require_name("rice", name.into())?,
            files: Vec::new(),
            programs: Vec::new(),
        })
    }

    /// Track single file.
    ///
    /// # Errors
    ///
    /// See [`RiceConfig::add_files`].
    pub fn add_file(&mut self, file: File) -> Result<()> {
        self.add_files([file])
    }

    /// Track batch of files.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::DuplicateFile`] if another file already
    ///   tracks the same path.
    /// - Return [`CatalogError::IdCollision`] if a different file shares an
    ///   identifier with a tracked one.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = File>) -> Result<()> {
        let mut accepted: Vec<File> = Vec::new();
        for file in files {
            let known = self.files.iter().chain(accepted.iter());
            if let Some(existing) = known.clone().find(|known| known.id() == file.id()) {
                if *existing == file {
                    continue;
                }
                return Err(CatalogError::IdCollision {
                    id: file.id().to_string(),
                });
            }

            if known.clone().any(|known| known.path() == file.path()) {
                return Err(CatalogError::DuplicateFile {
                    path: file.path().clone(),
                    config: self.name.clone(),
                });
            }

            accepted.push(file);
        }

        self.files.extend(accepted);
        Ok(())
    }

    /// Track single program.
    ///
    /// # Errors
    ///
    /// See [`RiceConfig::add_programs`].
    pub fn add_program(&mut self, program: Program) -> Result<()> {
        self.add_programs([program])
    }

    /// Track batch of programs.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::DuplicateProgram`] if another program with
    ///   the same name is already tracked.
    /// - Return [`CatalogError::IdCollision`] if a different program shares
    ///   an identifier with a tracked one.
    pub fn add_programs(&mut self, programs: impl IntoIterator<Item = Program>) -> Result<()> {
        let mut accepted: Vec<Program> = Vec::new();
        for program in programs {
            let known = self.programs.iter().chain(accepted.iter());
            if let Some(existing) = known.clone().find(|known| known.id() == program.id()) {
                if *existing == program {
                    continue;
                }
                return Err(CatalogError::IdCollision {
                    id: program.id().to_string(),
                });
            }

            if known.clone().any(|known| known.name() == program.name()) {
                return Err(CatalogError::DuplicateProgram {
                    name: program.name().into(),
                    config: self.name.clone(),
                });
            }

            accepted.push(program);
        }

        self.programs.extend(accepted);
        Ok(())
    }

    pub fn id(&self) -> ConfigId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn files(&self) -> &[File] {
        self.files.as_slice()
    }

    pub fn programs(&self) -> &[Program] {
        self.programs.as_slice()
    }

    /// Look up tracked program by name.
    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|program| program.name() == name)
    }

    /// Look up tracked program by name for modification.
    pub fn program_mut(&mut self, name: &str) -> Option<&mut Program> {
        self.programs.iter_mut().find(|program| program.name() == name)
    }
}

/// Top-level collection of every rice owned by one user.
#[derive(Debug)]
pub struct Catalog {
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) system_user: String,
    pub(crate) home: CanonicalPath,
    pub(crate) store: Store,
    pub(crate) configs: Vec<RiceConfig>,
}

impl Catalog {
    /// Construct new empty catalog.
    ///
    /// Creation time is captured now. The store is not connected yet.
    pub fn new(system_user: impl Into<String>, home: CanonicalPath, store: Store) -> Self {
        Self {
            created_at: Utc::now(),
            system_user: system_user.into(),
            home,
            store,
            configs: Vec::new(),
        }
    }

    /// Construct new catalog holding `configs`.
    ///
    /// # Errors
    ///
    /// See [`Catalog::add_configs`].
    pub fn with_configs(
        system_user: impl Into<String>,
        home: CanonicalPath,
        store: Store,
        configs: impl IntoIterator<Item = RiceConfig>,
    ) -> Result<Self> {
        let mut catalog = Self::new(system_user, home, store);
        catalog.add_configs(configs)?;
        Ok(catalog)
    }

    /// Add single rice.
    ///
    /// # Errors
    ///
    /// See [`Catalog::add_configs`].
    pub fn add_config(&mut self, config: RiceConfig) -> Result<()> {
        self.add_configs([config])
    }

    /// Add batch of rices.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::DuplicateConfig`] if rice names collide.
    /// - Return [`CatalogError::IdCollision`] if rice identifiers collide.
    pub fn add_configs(&mut self, configs: impl IntoIterator<Item = RiceConfig>) -> Result<()> {
        let mut accepted: Vec<RiceConfig> = Vec::new();
        for config in configs {
            let mut known = self.configs.iter().chain(accepted.iter());
            if known.clone().any(|known| known.id() == config.id()) {
                return Err(CatalogError::IdCollision {
                    id: config.id().to_string(),
                });
            }

            if known.any(|known| known.name() == config.name()) {
                return Err(CatalogError::DuplicateConfig {
                    name: config.name().into(),
                });
            }

            accepted.push(config);
        }

        self.configs.extend(accepted);
        Ok(())
    }

    /// Take rice out of catalog.
    ///
    /// Programs of the removed rice that still own files of other rices are
    /// listed under those rices instead, so ownership never dangles.
    pub fn remove_config(&mut self, name: &str) -> Option<RiceConfig> {
        let index = self.configs.iter().position(|config| config.name() == name)?;
        let removed = self.configs.remove(index);

        let listed: HashSet<ProgramId> = self
            .configs
            .iter()
            .flat_map(|config| config.programs().iter().map(Program::id))
            .collect();
        for program in removed.programs() {
            if listed.contains(&program.id()) {
                continue;
            }

            for config in &mut self.configs {
                if config.files().iter().all(|file| file.program() != program.id()) {
                    continue;
                }

                if let Err(error) = config.add_program(program.clone()) {
                    warn!("rice {:?} cannot take over program: {error}", config.name());
                }
            }
        }

        Some(removed)
    }

    pub fn config(&self, name: &str) -> Option<&RiceConfig> {
        self.configs.iter().find(|config| config.name() == name)
    }

    pub fn config_mut(&mut self, name: &str) -> Option<&mut RiceConfig> {
        self.configs.iter_mut().find(|config| config.name() == name)
    }

    pub fn configs(&self) -> &[RiceConfig] {
        self.configs.as_slice()
    }

    /// Look up program by name across every rice.
    pub fn program_by_name(&self, name: &str) -> Option<&Program> {
        self.configs.iter().find_map(|config| config.program(name))
    }

    /// Verify every tracked file refers to a program tracked by the catalog.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::MissingProgram`] on the first dangling
    ///   ownership reference.
    pub fn check_integrity(&self) -> Result<()> {
        let programs: HashSet<ProgramId> = self
            .configs
            .iter()
            .flat_map(|config| config.programs().iter().map(Program::id))
            .collect();

        for config in &self.configs {
            for file in config.files() {
                if !programs.contains(&file.program()) {
                    return Err(CatalogError::MissingProgram {
                        file: file.name().into(),
                        program: file.program(),
                    });
                }
            }
        }

        Ok(())
    }

    /// List tracked file paths and program names of every rice.
    ///
    /// Rices without files or programs are listed empty. Content is read
    /// from disk according to `mode`.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::FileAccess`] or [`CatalogError::Decode`] if
    ///   content cannot be read in [`ContentMode::Strict`].
    pub fn retrieve_all_files(&self, mode: impl Into<ContentMode>) -> Result<Report> {
        let mode = mode.into();
        let mut report = Report::default();
        for config in &self.configs {
            let mut listing = ConfigReport {
                name: config.name().into(),
                files: Vec::with_capacity(config.files().len()),
                programs: config.programs().iter().map(|p| p.name().into()).collect(),
            };

            for file in config.files() {
                let contents = match mode {
                    ContentMode::Omit => ContentEntry::Omitted,
                    ContentMode::Strict => ContentEntry::Loaded(file.contents()?),
                    ContentMode::BestEffort => match file.contents() {
                        Ok(contents) => ContentEntry::Loaded(contents),
                        Err(error) => ContentEntry::Unavailable(error.to_string()),
                    },
                };

                listing.files.push(FileReport {
                    name: file.name().into(),
                    path: file.path().clone(),
                    contents,
                });
            }

            report.configs.push(listing);
        }

        Ok(report)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn system_user(&self) -> &str {
        self.system_user.as_str()
    }

    pub fn home(&self) -> &CanonicalPath {
        &self.home
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}

/// Catalog error types.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Required name is blank.
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    /// Path is tracked twice within one rice.
    #[error("file {path} is already tracked by rice {config:?}")]
    DuplicateFile { path: CanonicalPath, config: String },

    /// Program name is tracked twice within one rice.
    #[error("program {name:?} is already tracked by rice {config:?}")]
    DuplicateProgram { name: String, config: String },

    /// Rice name is used twice within one catalog.
    #[error("rice {name:?} already exists")]
    DuplicateConfig { name: String },

    /// Two different entries share one identifier.
    #[error("identifier {id} is already taken by a different entry")]
    IdCollision { id: String },

    /// Encoding name is not supported.
    #[error("unknown text encoding {0:?}")]
    UnknownEncoding(String),

    /// File refers to a program that the catalog does not track.
    #[error("file {file:?} belongs to untracked program {program}")]
    MissingProgram { file: String, program: ProgramId },

    /// Rice does not exist.
    #[error("no rice named {0:?}")]
    UnknownConfig(String),

    /// Tracked file cannot be read.
    #[error("cannot read tracked file {path}")]
    FileAccess {
        #[source]
        source: std::io::Error,
        path: CanonicalPath,
    },

    /// Tracked file content does not match its encoding.
    #[error("content of {path} is not valid {encoding}")]
    Decode {
        path: CanonicalPath,
        encoding: TextEncoding,
    },
}

impl CatalogError {
    /// Malformed, missing, or conflicting entry data.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyName { .. }
                | Self::DuplicateFile { .. }
                | Self::DuplicateProgram { .. }
                | Self::DuplicateConfig { .. }
                | Self::IdCollision { .. }
                | Self::UnknownEncoding(_)
        )
    }

    /// Broken reference between entries.
    pub fn is_referential(&self) -> bool {
        matches!(self, Self::MissingProgram { .. } | Self::UnknownConfig(_))
    }
}

/// Friendly result alias :3
pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathResolver;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn resolver() -> PathResolver {
        PathResolver::new("/home/blah", "/home/blah")
    }

    fn catalog() -> Catalog {
        let resolver = resolver();
        Catalog::new(
            "blah",
            resolver.normalize("~/.config/rice"),
            Store::new("sqlite://:memory:"),
        )
    }

    fn neofetch(resolver: &PathResolver) -> anyhow::Result<(Program, File)> {
        let program = Program::new(resolver, "neofetch", "neofetch", "~/.config/neofetch")?;
        let file = File::new(
            resolver,
            "neofetch config",
            "~/.config/neofetch/config.conf",
            &program,
        )?;
        Ok((program, file))
    }

    #[test]
    fn add_files_is_all_or_nothing() -> anyhow::Result<()> {
        let resolver = resolver();
        let (program, file) = neofetch(&resolver)?;
        let mut rice = RiceConfig::new("default")?;
        rice.add_file(file.clone())?;

        let fresh = File::new(&resolver, "kitty", "~/.config/kitty/kitty.conf", &program)?;
        let clash = File::new(&resolver, "clash", "~/.config/neofetch/config.conf", &program)?;
        let result = rice.add_files([fresh, clash]);
        assert!(matches!(result, Err(CatalogError::DuplicateFile { .. })));
        assert_eq!(rice.files(), [file.clone()].as_slice());

        // Re-adding the same file is a no-op.
        rice.add_file(file.clone())?;
        assert_eq!(rice.files().len(), 1);

        // Nothing supplied, nothing changes.
        rice.add_files(Vec::new())?;
        assert_eq!(rice.files().len(), 1);

        Ok(())
    }

    #[test]
    fn add_files_rejects_duplicates_within_batch() -> anyhow::Result<()> {
        let resolver = resolver();
        let (program, _) = neofetch(&resolver)?;
        let mut rice = RiceConfig::new("default")?;
        let first = File::new(&resolver, "a", "~/a", &program)?;
        let second = File::new(&resolver, "b", "~/a", &program)?;
        assert!(rice.add_files([first, second]).is_err());
        assert!(rice.files().is_empty());

        Ok(())
    }

    #[test]
    fn add_programs_is_all_or_nothing() -> anyhow::Result<()> {
        let resolver = resolver();
        let (program, _) = neofetch(&resolver)?;
        let mut rice = RiceConfig::new("default")?;
        rice.add_program(program.clone())?;

        let vim = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let impostor = Program::new(&resolver, "neofetch", "fastfetch", "~/.config/fastfetch")?;
        let result = rice.add_programs([vim, impostor]);
        assert!(matches!(result, Err(CatalogError::DuplicateProgram { .. })));
        assert_eq!(rice.programs(), [program].as_slice());

        Ok(())
    }

    #[test]
    fn add_configs_rejects_duplicate_names() -> anyhow::Result<()> {
        let mut catalog = catalog();
        catalog.add_config(RiceConfig::new("default")?)?;

        let result = catalog.add_configs([RiceConfig::new("dark")?, RiceConfig::new("default")?]);
        let error = result.unwrap_err();
        assert!(error.is_validation());
        assert!(matches!(error, CatalogError::DuplicateConfig { .. }));
        let names: Vec<_> = catalog.configs().iter().map(RiceConfig::name).collect();
        assert_eq!(names, vec!["default"]);

        Ok(())
    }

    #[test]
    fn add_config_rejects_reused_identity() -> anyhow::Result<()> {
        let mut catalog = catalog();
        let rice = RiceConfig::new("default")?;
        catalog.add_config(rice.clone())?;
        let result = catalog.add_config(rice);
        assert!(matches!(result, Err(CatalogError::IdCollision { .. })));
        assert_eq!(catalog.configs().len(), 1);

        Ok(())
    }

    #[test]
    fn rice_name_must_not_be_blank() {
        assert!(RiceConfig::new("")
            .map_err(|error| error.is_validation())
            .unwrap_err());
    }

    #[test]
    fn integrity_requires_owner_in_catalog() -> anyhow::Result<()> {
        let resolver = resolver();
        let (program, file) = neofetch(&resolver)?;
        let mut catalog = catalog();
        let mut rice = RiceConfig::new("default")?;
        rice.add_file(file)?;
        catalog.add_config(rice)?;

        let error = catalog.check_integrity().unwrap_err();
        assert!(error.is_referential());

        // Owner tracked by a different rice is fine.
        let mut other = RiceConfig::new("other")?;
        other.add_program(program)?;
        catalog.add_config(other)?;
        catalog.check_integrity()?;

        Ok(())
    }

    #[test]
    fn remove_config_hands_owner_over() -> anyhow::Result<()> {
        let resolver = resolver();
        let (program, file) = neofetch(&resolver)?;
        let mut dark = RiceConfig::new("dark")?;
        dark.add_program(program.clone())?;
        let mut light = RiceConfig::new("light")?;
        light.add_file(file)?;
        let mut catalog = catalog();
        catalog.add_configs([dark, light])?;

        let removed = catalog.remove_config("dark").expect("dark tracked");
        assert_eq!(removed.name(), "dark");
        assert!(catalog.remove_config("dark").is_none());
        let light = catalog.config("light").expect("light tracked");
        assert_eq!(light.programs(), [program].as_slice());
        catalog.check_integrity()?;

        Ok(())
    }

    #[test]
    fn retrieve_all_files_lists_every_rice() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let resolver = PathResolver::new(dir.path(), dir.path());
        std::fs::create_dir_all(dir.path().join(".config/neofetch"))?;
        std::fs::write(dir.path().join(".config/neofetch/config.conf"), "x = 1\n")?;
        let (program, file) = neofetch(&resolver)?;
        let missing = File::new(&resolver, "ghost", "~/ghost.conf", &program)?;

        let mut rice = RiceConfig::new("default")?;
        rice.add_program(program)?;
        rice.add_files([file, missing])?;
        let mut catalog = catalog();
        catalog.add_configs([rice, RiceConfig::new("empty")?])?;

        let report = catalog.retrieve_all_files(false)?;
        let default = report.config("default").expect("default listed");
        assert_eq!(default.programs, vec!["neofetch".to_string()]);
        assert_eq!(default.files.len(), 2);
        assert!(default.files[0].path.to_string().ends_with("config.conf"));
        assert_eq!(default.files[0].contents, ContentEntry::Omitted);
        let empty = report.config("empty").expect("empty listed");
        assert!(empty.files.is_empty() && empty.programs.is_empty());

        assert!(matches!(
            catalog.retrieve_all_files(true),
            Err(CatalogError::FileAccess { .. })
        ));

        let report = catalog.retrieve_all_files(ContentMode::BestEffort)?;
        let default = report.config("default").expect("default listed");
        assert_eq!(
            default.files[0].contents,
            ContentEntry::Loaded(FileContents::Text("x = 1\n".into()))
        );
        assert!(matches!(
            default.files[1].contents,
            ContentEntry::Unavailable(_)
        ));

        Ok(())
    }

    #[test]
    fn catalog_captures_creation_details() {
        let before = Utc::now();
        let first = catalog();
        let second = catalog();
        assert!(first.created_at() >= before);
        assert!(second.created_at() >= first.created_at());
        assert_eq!(first.system_user(), "blah");
        assert!(!first.store().is_open());
    }
}
