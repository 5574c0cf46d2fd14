//! Safe resolution of caller-supplied names against the permitted file root
//!
//! A selection is accepted only when it names an existing file or directory
//! strictly inside the root after symlinks are resolved.

use crate::error::{Error, Result};
use std::io;
use std::path::{Component, Path, PathBuf};

/// A selection that passed every check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical root the selection lives under
    pub root: PathBuf,
    /// Canonical absolute path of the selection
    pub absolute: PathBuf,
    /// Selection relative to `root`
    pub relative: PathBuf,
    /// Whether the selection is a directory
    pub is_dir: bool,
}

impl ResolvedPath {
    /// Relative path with `/` separators, as used inside a container mount
    pub fn relative_unix(&self) -> String {
        self.relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// The directory transfers may select from
#[derive(Clone, Debug)]
pub struct FileRoot {
    root: PathBuf,
}

impl FileRoot {
    /// Wrap a root directory; it need not exist yet
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured (not canonicalized) root
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `name` to an existing entry strictly inside the root
    ///
    /// Checks, in order:
    /// 1. the name is non-empty and has no `..`, absolute or prefix components
    /// 2. the root exists and canonicalizes
    /// 3. the joined path exists and canonicalizes
    /// 4. the canonical result is under the canonical root and is not the root itself
    pub async fn resolve(&self, name: &str) -> Result<ResolvedPath> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidSelection("No file selected.".into()));
        }
        validate_components(name)?;

        let root = tokio::fs::canonicalize(&self.root).await.map_err(|e| {
            tracing::warn!(root = %self.root.display(), error = %e, "file root is not available");
            Error::InvalidSelection("file root is not available".into())
        })?;

        let absolute = tokio::fs::canonicalize(root.join(name))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::InvalidSelection("Invalid file selection.".into()),
                _ => Error::InvalidSelection(format!("cannot resolve '{name}': {e}")),
            })?;

        let relative = match absolute.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
            _ => {
                return Err(Error::InvalidSelection(
                    "path escapes the file root".into(),
                ));
            }
        };

        let metadata = tokio::fs::metadata(&absolute).await?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(Error::InvalidSelection(
                "selection is neither a file nor a directory".into(),
            ));
        }

        Ok(ResolvedPath {
            root,
            absolute,
            relative,
            is_dir: metadata.is_dir(),
        })
    }
}

fn validate_components(name: &str) -> Result<()> {
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidSelection(
                    "path escapes the file root".into(),
                ));
            }
        }
    }
    Ok(())
}
