// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(BTreeSet<String>), // Child names
    Link(PathBuf),         // Target
}

/// In-memory filesystem for planner and config tests.
///
/// Parents of every added entry are created implicitly. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        if let Some(parent) = path.parent() {
            ensure_dir(&mut entries, parent);
        }
        link_child(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        ensure_dir(&mut self.lock(), path.as_ref());
    }

    /// Symbolic link at `path` pointing to `target`. The target need not exist.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        let path = path.as_ref();
        let mut entries = self.lock();
        if let Some(parent) = path.parent() {
            ensure_dir(&mut entries, parent);
        }
        link_child(&mut entries, path);
        entries.insert(path.to_path_buf(), MockEntry::Link(target.into()));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_dir(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if path.as_os_str().is_empty() || entries.contains_key(path) {
        return;
    }
    if let Some(parent) = path.parent() {
        ensure_dir(entries, parent);
    }
    link_child(entries, path);
    entries.insert(path.to_path_buf(), MockEntry::Dir(BTreeSet::new()));
}

/// Entry at `path` with links followed. Gives up after a few hops.
fn resolve<'a>(entries: &'a HashMap<PathBuf, MockEntry>, path: &Path) -> Option<&'a MockEntry> {
    let mut entry = entries.get(path)?;
    for _ in 0..8 {
        match entry {
            MockEntry::Link(target) => entry = entries.get(target)?,
            other => return Some(other),
        }
    }
    None
}

fn link_child(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return;
    };
    if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
        children.insert(name.to_string_lossy().into_owned());
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match resolve(&self.lock(), path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        resolve(&self.lock(), path).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(resolve(&self.lock(), path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(resolve(&self.lock(), path), Some(MockEntry::Dir(_)))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Link(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match resolve(&self.lock(), path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut entries = self.lock();
        match entries.get(path) {
            Some(MockEntry::File(_)) => return Err(anyhow!("Is a file: {:?}", path)),
            Some(MockEntry::Link(_)) => return Err(anyhow!("Is a link: {:?}", path)),
            _ => {}
        }
        ensure_dir(&mut entries, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_are_created_and_listed() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/run1/b.sxm", "b");
        fs.add_file("/data/run1/a.sxm", "a");
        fs.add_dir("/data/run1/sub");

        assert!(fs.is_dir(Path::new("/data")));
        assert_eq!(
            fs.read_dir(Path::new("/data/run1")).unwrap(),
            vec![
                PathBuf::from("/data/run1/a.sxm"),
                PathBuf::from("/data/run1/b.sxm"),
                PathBuf::from("/data/run1/sub"),
            ]
        );
    }

    #[test]
    fn files_and_subdirs_are_split_and_sorted() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/z.sxm", "z");
        fs.add_dir("/data/b");
        fs.add_file("/data/a.sxm", "a");
        fs.add_dir("/data/a");

        assert_eq!(
            fs.files(Path::new("/data")).unwrap(),
            vec![PathBuf::from("/data/a.sxm"), PathBuf::from("/data/z.sxm")]
        );
        assert_eq!(
            fs.subdirs(Path::new("/data")).unwrap(),
            vec![PathBuf::from("/data/a"), PathBuf::from("/data/b")]
        );
        assert!(fs.files(Path::new("/missing")).is_err());
    }

    #[test]
    fn links_resolve_but_are_not_subdirs() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/run1/a.sxm", "a");
        fs.add_symlink("/data/run1/back", "/data");
        fs.add_symlink("/data/run1/b.sxm", "/data/run1/a.sxm");

        assert!(fs.is_dir(Path::new("/data/run1/back")));
        assert!(fs.is_symlink(Path::new("/data/run1/back")));
        assert!(!fs.is_symlink(Path::new("/data/run1")));
        assert_eq!(fs.read_to_string(Path::new("/data/run1/b.sxm")).unwrap(), "a");

        assert!(fs.subdirs(Path::new("/data/run1")).unwrap().is_empty());
        assert_eq!(
            fs.files(Path::new("/data/run1")).unwrap(),
            vec![PathBuf::from("/data/run1/a.sxm"), PathBuf::from("/data/run1/b.sxm")]
        );
    }

    #[test]
    fn create_dir_all_refuses_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/out", "x");
        assert!(fs.create_dir_all(Path::new("/out")).is_err());
        fs.create_dir_all(Path::new("/img/run1")).unwrap();
        assert!(fs.is_dir(Path::new("/img/run1")));
    }
}
