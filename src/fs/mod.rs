// src/fs/mod.rs

//! Filesystem seam used by config loading and conversion planning.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Whether `path` itself is a symbolic link. Does not follow it.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Entries of a directory as full paths, in no particular order.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Create `path` and any missing parents. Existing directories are fine.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Sub-directories of `path`, name-sorted. Links to directories are left
    /// out so a recursive walk cannot loop.
    fn subdirs(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = self
            .read_dir(path)?
            .into_iter()
            .filter(|p| self.is_dir(p) && !self.is_symlink(p))
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Regular files directly inside `path`, name-sorted.
    fn files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .read_dir(path)?
            .into_iter()
            .filter(|p| self.is_file(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(path)
            .with_context(|| format!("listing {:?}", path))?
            .map(|entry| {
                entry
                    .map(|e| e.path())
                    .with_context(|| format!("listing {:?}", path))
            })
            .collect()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }
}
