//! Storage the patch applier reads from and writes to.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileAccessError {
    #[error("{}: file does not exist", .path.display())]
    NotFound { path: PathBuf },
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileAccessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileAccessError::NotFound { .. })
    }
}

/// Abstraction over the file tree a patch is applied to. Paths are given as
/// they appear in the patch; implementations decide how to resolve them.
pub trait FileAccess {
    fn read(&self, path: &Path) -> Result<String, FileAccessError>;

    /// Creates or overwrites `path`, creating missing parent directories.
    /// Returns the directories that had to be created, outermost first.
    fn write(&mut self, path: &Path, contents: &str) -> Result<Vec<PathBuf>, FileAccessError>;

    fn remove(&mut self, path: &Path) -> Result<(), FileAccessError>;

    /// Removes a directory created by [`FileAccess::write`]. Must fail rather
    /// than delete anything if the directory is not empty.
    fn remove_dir(&mut self, path: &Path) -> Result<(), FileAccessError>;

    fn exists(&self, path: &Path) -> bool {
        self.read(path).is_ok()
    }
}

/// Filesystem-backed access with relative paths resolved against `root`.
#[derive(Debug, Clone)]
pub struct RealFileAccess {
    root: PathBuf,
}

impl RealFileAccess {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl FileAccess for RealFileAccess {
    fn read(&self, path: &Path) -> Result<String, FileAccessError> {
        let resolved = self.resolve(path);
        std::fs::read_to_string(&resolved).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FileAccessError::NotFound {
                path: path.to_path_buf(),
            },
            _ => FileAccessError::Io {
                context: "Failed to read",
                path: path.to_path_buf(),
                source,
            },
        })
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<Vec<PathBuf>, FileAccessError> {
        let resolved = self.resolve(path);
        let created = missing_parents(&resolved);
        if let Some(deepest) = created.first() {
            std::fs::create_dir_all(deepest).map_err(|source| FileAccessError::Io {
                context: "Failed to create parent directories for",
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&resolved, contents).map_err(|source| FileAccessError::Io {
            context: "Failed to write",
            path: path.to_path_buf(),
            source,
        })?;
        Ok(created.into_iter().rev().collect())
    }

    fn remove(&mut self, path: &Path) -> Result<(), FileAccessError> {
        let resolved = self.resolve(path);
        std::fs::remove_file(&resolved).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => FileAccessError::NotFound {
                path: path.to_path_buf(),
            },
            _ => FileAccessError::Io {
                context: "Failed to delete",
                path: path.to_path_buf(),
                source,
            },
        })
    }

    fn remove_dir(&mut self, path: &Path) -> Result<(), FileAccessError> {
        std::fs::remove_dir(path).map_err(|source| FileAccessError::Io {
            context: "Failed to remove directory",
            path: path.to_path_buf(),
            source,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }
}

/// Ancestors of `path` that do not exist yet, deepest first.
fn missing_parents(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// In-memory file tree, mainly for tests and dry runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryFileAccess {
    files: BTreeMap<PathBuf, String>,
}

impl InMemoryFileAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

impl FileAccess for InMemoryFileAccess {
    fn read(&self, path: &Path) -> Result<String, FileAccessError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| FileAccessError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<Vec<PathBuf>, FileAccessError> {
        self.files.insert(path.to_path_buf(), contents.to_string());
        Ok(Vec::new())
    }

    fn remove(&mut self, path: &Path) -> Result<(), FileAccessError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FileAccessError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn remove_dir(&mut self, _path: &Path) -> Result<(), FileAccessError> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Pending writes and removals layered over a read-only base, so a plan can
/// be replayed in order without touching the base.
#[derive(Debug)]
pub(crate) struct OverlayFileAccess<'a, F: FileAccess + ?Sized> {
    base: &'a F,
    pending: BTreeMap<PathBuf, Option<String>>,
}

impl<'a, F: FileAccess + ?Sized> OverlayFileAccess<'a, F> {
    pub(crate) fn new(base: &'a F) -> Self {
        Self {
            base,
            pending: BTreeMap::new(),
        }
    }
}

impl<F: FileAccess + ?Sized> FileAccess for OverlayFileAccess<'_, F> {
    fn read(&self, path: &Path) -> Result<String, FileAccessError> {
        match self.pending.get(path) {
            Some(Some(contents)) => Ok(contents.clone()),
            Some(None) => Err(FileAccessError::NotFound {
                path: path.to_path_buf(),
            }),
            None => self.base.read(path),
        }
    }

    fn write(&mut self, path: &Path, contents: &str) -> Result<Vec<PathBuf>, FileAccessError> {
        self.pending
            .insert(path.to_path_buf(), Some(contents.to_string()));
        Ok(Vec::new())
    }

    fn remove(&mut self, path: &Path) -> Result<(), FileAccessError> {
        if !self.exists(path) {
            return Err(FileAccessError::NotFound {
                path: path.to_path_buf(),
            });
        }
        self.pending.insert(path.to_path_buf(), None);
        Ok(())
    }

    fn remove_dir(&mut self, _path: &Path) -> Result<(), FileAccessError> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        match self.pending.get(path) {
            Some(entry) => entry.is_some(),
            None => self.base.exists(path),
        }
    }
}
