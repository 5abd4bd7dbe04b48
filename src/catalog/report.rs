// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Listings of tracked files and programs.

use crate::{catalog::entity::FileContents, path::CanonicalPath};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// How file content should be handled while building a [`Report`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// List paths only.
    #[default]
    Omit,

    /// Include content, any read failure aborts the listing.
    Strict,

    /// Include content, read failures are recorded per file.
    BestEffort,
}

impl From<bool> for ContentMode {
    fn from(include_content: bool) -> Self {
        if include_content {
            Self::Strict
        } else {
            Self::Omit
        }
    }
}

/// Listing of every rice, keyed by rice name in catalog order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub configs: Vec<ConfigReport>,
}

impl Report {
    /// Look up listing of rice by name.
    pub fn config(&self, name: &str) -> Option<&ConfigReport> {
        self.configs.iter().find(|config| config.name == name)
    }
}

/// Listing of a single rice.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigReport {
    pub name: String,
    pub files: Vec<FileReport>,
    pub programs: Vec<String>,
}

/// Listing of a single tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub name: String,
    pub path: CanonicalPath,
    pub contents: ContentEntry,
}

/// Content slot of a [`FileReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEntry {
    Omitted,
    Loaded(FileContents),
    Unavailable(String),
}

impl Display for Report {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for config in &self.configs {
            writeln!(fmt, "{}", config.name)?;
            writeln!(fmt, "  programs:")?;
            for program in &config.programs {
                writeln!(fmt, "    {program}")?;
            }

            writeln!(fmt, "  files:")?;
            for file in &config.files {
                writeln!(fmt, "    {} ({})", file.name, file.path)?;
                match &file.contents {
                    ContentEntry::Omitted => {}
                    ContentEntry::Loaded(FileContents::Text(text)) => {
                        for line in text.lines() {
                            writeln!(fmt, "      | {line}")?;
                        }
                    }
                    ContentEntry::Loaded(FileContents::Bytes(bytes)) => {
                        writeln!(fmt, "      <{} bytes>", bytes.len())?;
                    }
                    ContentEntry::Unavailable(reason) => {
                        writeln!(fmt, "      <unavailable: {reason}>")?;
                    }
                }
            }
        }

        Ok(())
    }
}
