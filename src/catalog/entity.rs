// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracked programs and files.
//!
//! A [`Program`] is an executable together with its configuration
//! directory. A [`File`] is a tracked configuration file that belongs to
//! exactly one program. Ownership is kept as a [`ProgramId`] reference, never
//! as a copy of the program itself.

use crate::{
    catalog::{CatalogError, Result},
    path::{CanonicalPath, PathResolver},
    runner::{which, CommandRunner},
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{debug, warn};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
                Display::fmt(&self.0, fmt)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(data: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(data).map(Self)
            }
        }
    };
}

entity_id! {
    /// Identity of a [`Program`].
    ProgramId
}

entity_id! {
    /// Identity of a [`File`].
    FileId
}

entity_id! {
    /// Identity of a [`RiceConfig`](crate::catalog::RiceConfig).
    ConfigId
}

pub(crate) fn require_name(kind: &'static str, name: String) -> Result<String> {
    if name.trim().is_empty() {
        return Err(CatalogError::EmptyName { kind });
    }

    Ok(name)
}

/// Tracked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    id: ProgramId,
    name: String,
    executable: String,
    config_path: CanonicalPath,
    path: Option<CanonicalPath>,
}

impl Program {
    /// Construct new program.
    ///
    /// The executable path starts out unresolved, see
    /// [`Program::discover_path`] or [`Program::with_path`].
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::EmptyName`] if `name` is blank.
    pub fn new(
        resolver: &PathResolver,
        name: impl Into<String>,
        executable: impl Into<String>,
        config_path: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            id: ProgramId::new(),
            name: require_name("program", name.into())?,
            executable: executable.into(),
            config_path: resolver.normalize(config_path),
            path: None,
        })
    }

    /// Rebuild program from stored row data.
    pub(crate) fn restore(
        id: ProgramId,
        name: String,
        executable: String,
        config_path: CanonicalPath,
        path: Option<CanonicalPath>,
    ) -> Self {
        Self {
            id,
            name,
            executable,
            config_path,
            path,
        }
    }

    /// Set executable path explicitly. Blank input leaves it unresolved.
    pub fn with_path(mut self, resolver: &PathResolver, path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        self.path = if path.trim().is_empty() {
            None
        } else {
            Some(resolver.normalize(path))
        };
        self
    }

    /// Locate executable through external command runner.
    ///
    /// Missing executables are not an error. The path simply stays
    /// unresolved so it can be reported or resolved later.
    pub fn discover_path(
        &mut self,
        runner: &impl CommandRunner,
        resolver: &PathResolver,
    ) -> Option<&CanonicalPath> {
        match which(runner, &self.executable) {
            Some(found) => {
                debug!("program {:?} found at {}", self.name, found.display());
                self.path = Some(resolver.normalize_path(found));
            }
            None => warn!(
                "cannot locate executable {:?} of program {:?}",
                self.executable, self.name
            ),
        }

        self.path.as_ref()
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn executable(&self) -> &str {
        self.executable.as_str()
    }

    pub fn config_path(&self) -> &CanonicalPath {
        &self.config_path
    }

    pub fn path(&self) -> Option<&CanonicalPath> {
        self.path.as_ref()
    }
}

/// Tracked configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    id: FileId,
    name: String,
    path: CanonicalPath,
    program: ProgramId,
    use_bytes: bool,
    encoding: TextEncoding,
}

impl File {
    /// Construct new file owned by `program`.
    ///
    /// Content is treated as UTF-8 text by default.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::EmptyName`] if `name` is blank.
    pub fn new(
        resolver: &PathResolver,
        name: impl Into<String>,
        path: impl AsRef<str>,
        program: &Program,
    ) -> Result<Self> {
        Ok(Self {
            id: FileId::new(),
            name: require_name("file", name.into())?,
            path: resolver.normalize(path),
            program: program.id(),
            use_bytes: false,
            encoding: TextEncoding::default(),
        })
    }

    /// Rebuild file from stored row data.
    pub(crate) fn restore(
        id: FileId,
        name: String,
        path: CanonicalPath,
        program: ProgramId,
        use_bytes: bool,
        encoding: TextEncoding,
    ) -> Self {
        Self {
            id,
            name,
            path,
            program,
            use_bytes,
            encoding,
        }
    }

    /// Treat content as raw bytes instead of text.
    pub fn with_bytes(mut self, use_bytes: bool) -> Self {
        self.use_bytes = use_bytes;
        self
    }

    /// Decode text content with `encoding`.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Read raw bytes of file from disk.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::FileAccess`] if file cannot be read.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(self.path.as_path()).map_err(|source| CatalogError::FileAccess {
            source,
            path: self.path.clone(),
        })
    }

    /// Read content of file from disk.
    ///
    /// Yields bytes when the file is flagged as binary, decoded text
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - Return [`CatalogError::FileAccess`] if file cannot be read.
    /// - Return [`CatalogError::Decode`] if content does not match encoding.
    pub fn contents(&self) -> Result<FileContents> {
        let bytes = self.read_bytes()?;
        if self.use_bytes {
            return Ok(FileContents::Bytes(bytes));
        }

        self.encoding
            .decode(bytes.as_slice())
            .map(FileContents::Text)
            .ok_or_else(|| CatalogError::Decode {
                path: self.path.clone(),
                encoding: self.encoding,
            })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    /// Identity of owning program.
    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn use_bytes(&self) -> bool {
        self.use_bytes
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}

/// Content of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    Text(String),
    Bytes(Vec<u8>),
}

impl FileContents {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes.as_slice(),
        }
    }
}

/// Text encodings that tracked files can be decoded with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl TextEncoding {
    /// Decode bytes, `None` if they are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Self::Ascii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|byte| char::from(*byte)).collect()),
            // INVARIANT: ISO-8859-1 maps every byte onto the first 256 code points.
            Self::Latin1 => Some(bytes.iter().map(|byte| char::from(*byte)).collect()),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = CatalogError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            _ => Err(CatalogError::UnknownEncoding(data.into())),
        }
    }
}

impl Display for TextEncoding {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Utf8 => "utf-8",
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn resolver() -> PathResolver {
        PathResolver::new("/home/blah", "/home/blah")
    }

    #[test]
    fn program_normalizes_paths() -> anyhow::Result<()> {
        let resolver = resolver();
        let program =
            Program::new(&resolver, "vim", "vim", "~/.vimrc")?.with_path(&resolver, "/bin/vim");
        assert_eq!(program.config_path().as_path(), Path::new("/home/blah/.vimrc"));
        assert_eq!(
            program.path().map(CanonicalPath::as_path),
            Some(Path::new("/bin/vim"))
        );

        let program = program.with_path(&resolver, "  ");
        assert_eq!(program.path(), None);

        Ok(())
    }

    #[test]
    fn identifiers_are_fresh_per_construction() -> anyhow::Result<()> {
        let resolver = resolver();
        let first = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let second = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        assert_ne!(first.id(), second.id());

        let file_a = File::new(&resolver, "vimrc", "~/.vimrc", &first)?;
        let file_b = File::new(&resolver, "vimrc", "~/.vimrc", &first)?;
        assert_ne!(file_a.id(), file_b.id());
        assert_eq!(file_a.program(), first.id());

        Ok(())
    }

    #[test]
    fn blank_names_are_rejected() -> anyhow::Result<()> {
        let resolver = resolver();
        let result = Program::new(&resolver, " ", "vim", "~/.vimrc");
        assert!(matches!(result, Err(CatalogError::EmptyName { kind: "program" })));

        let program = Program::new(&resolver, "vim", "vim", "~/.vimrc")?;
        let result = File::new(&resolver, "", "~/.vimrc", &program);
        assert!(matches!(result, Err(CatalogError::EmptyName { kind: "file" })));

        Ok(())
    }

    #[test]
    fn file_contents_respect_flags() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let resolver = PathResolver::new(dir.path(), dir.path());
        std::fs::write(dir.path().join("config.conf"), "print_info() {}\n")?;
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, b'a'])?;

        let program = Program::new(&resolver, "neofetch", "neofetch", "~")?;
        let text = File::new(&resolver, "neofetch config", "config.conf", &program)?;
        assert_eq!(
            text.contents()?,
            FileContents::Text("print_info() {}\n".into())
        );

        let binary = File::new(&resolver, "blob", "blob.bin", &program)?;
        assert!(matches!(
            binary.contents(),
            Err(CatalogError::Decode {
                encoding: TextEncoding::Utf8,
                ..
            })
        ));
        assert_eq!(
            binary.clone().with_bytes(true).contents()?,
            FileContents::Bytes(vec![0xff, 0xfe, b'a'])
        );
        assert_eq!(
            binary.with_encoding(TextEncoding::Latin1).contents()?,
            FileContents::Text("\u{ff}\u{fe}a".into())
        );

        let missing = File::new(&resolver, "missing", "nope.conf", &program)?;
        assert!(matches!(
            missing.contents(),
            Err(CatalogError::FileAccess { .. })
        ));

        Ok(())
    }

    #[test]
    fn encoding_names_parse() -> anyhow::Result<()> {
        assert_eq!("UTF-8".parse::<TextEncoding>()?, TextEncoding::Utf8);
        assert_eq!("iso-8859-1".parse::<TextEncoding>()?, TextEncoding::Latin1);
        assert_eq!("ascii".parse::<TextEncoding>()?, TextEncoding::Ascii);
        assert!("ebcdic".parse::<TextEncoding>().is_err());
        assert_eq!(TextEncoding::Ascii.decode(&[0x80]), None);

        Ok(())
    }
}
