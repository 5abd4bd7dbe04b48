// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Every path that enters the
//! catalog goes through a [`PathResolver`] first, so the catalog only ever
//! deals with [`CanonicalPath`] values.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to the rice directory.
///
/// Uses `<home>/.config/rice` as the place where the catalog database and
/// settings live. Does not check if the path returned actually exists.
pub fn default_rice_dir(home: impl AsRef<Path>) -> PathBuf {
    home.as_ref().join(".config").join("rice")
}

/// Normalize raw path strings into canonical absolute paths.
///
/// Home and working directory are captured once at construction, so
/// normalization itself never consults the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    home: PathBuf,
    cwd: PathBuf,
}

impl PathResolver {
    /// Construct new resolver from explicit home and working directories.
    ///
    /// Both directories are cleaned lexically. A relative working directory
    /// is taken relative to home.
    pub fn new(home: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        let home = clean(&home.into());
        let cwd = cwd.into();
        let cwd = if cwd.is_absolute() {
            clean(&cwd)
        } else {
            clean(&home.join(cwd))
        };

        Self { home, cwd }
    }

    /// Construct new resolver from the current process environment.
    ///
    /// # Errors
    ///
    /// - Return [`NoWayHome`] if home directory path cannot be determined.
    pub fn from_env() -> Result<Self> {
        let home = home_dir()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| home.clone());
        Ok(Self::new(home, cwd))
    }

    /// Home directory used to expand `~`.
    pub fn home(&self) -> &Path {
        self.home.as_path()
    }

    /// Normalize raw path string into canonical path.
    ///
    /// Leading `~` is replaced by the home directory, relative paths are
    /// joined onto the working directory, and `.` and `..` components are
    /// folded away. Symbolic links are left alone, so the target does not
    /// need to exist.
    pub fn normalize(&self, raw: impl AsRef<str>) -> CanonicalPath {
        let expanded = shellexpand::tilde_with_context(raw.as_ref(), || {
            Some(self.home.to_string_lossy().into_owned())
        });
        self.normalize_path(Path::new(expanded.as_ref()))
    }

    /// Normalize an already expanded path.
    pub fn normalize_path(&self, path: impl AsRef<Path>) -> CanonicalPath {
        let path = path.as_ref();
        if path.is_absolute() {
            CanonicalPath(clean(path))
        } else {
            CanonicalPath(clean(&self.cwd.join(path)))
        }
    }
}

// INVARIANT: Result is purely lexical, popping past the root stays at root.
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => cleaned.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::Normal(part) => cleaned.push(part),
        }
    }

    cleaned
}

/// Absolute path produced by [`PathResolver`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Deserialize, Serialize)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Treat canonical path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Lossy string form, used when writing rows.
    pub fn to_string_lossy(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl Display for CanonicalPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver() -> PathResolver {
        PathResolver::new("/home/blah", "/home/blah/work")
    }

    #[test]
    fn normalize_expands_home_shorthand() {
        let resolver = resolver();
        for raw in ["~/.vimrc", "~/.config", "~", "~/.config/neofetch/../neofetch"] {
            let path = resolver.normalize(raw);
            assert!(path.as_path().is_absolute());
            assert!(path.to_string().starts_with("/home/blah"), "{raw} -> {path}");
        }

        assert_eq!(
            resolver.normalize("~/.config/neofetch/config.conf").as_path(),
            Path::new("/home/blah/.config/neofetch/config.conf")
        );
    }

    #[test]
    fn normalize_anchors_relative_paths() {
        let resolver = resolver();
        assert_eq!(
            resolver.normalize("folders.py").as_path(),
            Path::new("/home/blah/work/folders.py")
        );
        assert_eq!(
            resolver.normalize("this/string/has/folders.py").as_path(),
            Path::new("/home/blah/work/this/string/has/folders.py")
        );
        assert_eq!(resolver.normalize(".").as_path(), Path::new("/home/blah/work"));
        assert_eq!(resolver.normalize("../..").as_path(), Path::new("/home"));
        assert_eq!(resolver.normalize("/../../etc").as_path(), Path::new("/etc"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let resolver = resolver();
        for raw in [
            "folders.py",
            "/this/absolute/path.py",
            "./a/./b/../c/",
            ".",
            "/dev/null",
            "~/.bashrc",
        ] {
            let once = resolver.normalize(raw);
            let twice = resolver.normalize(once.to_string());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn tilde_inside_path_is_literal() {
        let resolver = resolver();
        assert_eq!(
            resolver.normalize("/opt/~backup").as_path(),
            Path::new("/opt/~backup")
        );
    }

    #[test]
    fn default_rice_dir_is_under_dot_config() {
        assert_eq!(
            default_rice_dir("/home/blah"),
            PathBuf::from("/home/blah/.config/rice")
        );
    }
}
