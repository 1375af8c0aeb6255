use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Filesystem operations used by the curation pipeline.
///
/// Listings are sorted by file name so every run sees the corpus in the same
/// order regardless of the underlying directory iteration order.
pub trait FileStore {
    /// Regular files directly inside `dir`.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Regular files anywhere below `root`, depth first.
    fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Read a whole file as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Create or truncate a file with the given contents.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Delete a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

impl<S: FileStore + ?Sized> FileStore for &S {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        (**self).list_files(dir)
    }

    fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        (**self).walk_files(root)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        (**self).write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        (**self).remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        (**self).create_dir_all(path)
    }
}

/// [`FileStore`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl FileStore for LocalFileStore {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !root.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            ));
        }
        // Symlinked files count, symlinked directories are not descended into.
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry under {}: {err}", root.display());
                    continue;
                }
            };
            if entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
            {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

/// In-memory [`FileStore`] for tests and dry runs.
///
/// Paths registered with [`MemoryFileStore::fail_on`] return
/// `PermissionDenied` on read, write and remove.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RefCell<BTreeMap<PathBuf, String>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
    failing: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `(path, contents)` pairs.
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let store = Self::new();
        for (path, contents) in files {
            store.insert(path, contents);
        }
        store
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.register_dirs(parent);
        }
        self.files.borrow_mut().insert(path, contents.into());
    }

    /// Make every subsequent read, write or remove of `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.borrow_mut().insert(path.into());
    }

    /// Contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    /// All file paths currently stored, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    fn register_dirs(&self, dir: &Path) {
        let mut dirs = self.dirs.borrow_mut();
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    fn check_failing(&self, path: &Path) -> io::Result<()> {
        if self.failing.borrow().contains(path) {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("injected failure for {}", path.display()),
            ));
        }
        Ok(())
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(ErrorKind::NotFound, format!("{} not found", path.display()))
    }
}

impl FileStore for MemoryFileStore {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.borrow().contains(dir) {
            return Err(Self::not_found(dir));
        }
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.exists(root) {
            return Err(Self::not_found(root));
        }
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path) || self.dirs.borrow().contains(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check_failing(path)?;
        self.contents(path).ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check_failing(path)?;
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.borrow().contains(parent) => {
                Err(Self::not_found(parent))
            }
            _ => {
                self.files
                    .borrow_mut()
                    .insert(path.to_path_buf(), contents.to_string());
                Ok(())
            }
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check_failing(path)?;
        self.files
            .borrow_mut()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.register_dirs(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_list_is_non_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::with_files([
            ("data/b.txt", ""),
            ("data/a.jpg", ""),
            ("data/sub/c.jpg", ""),
        ]);
        let files = store.list_files(Path::new("data"))?;
        assert_eq!(
            files,
            vec![PathBuf::from("data/a.jpg"), PathBuf::from("data/b.txt")]
        );
        let walked = store.walk_files(Path::new("data"))?;
        assert_eq!(walked.len(), 3);
        Ok(())
    }

    #[test]
    fn test_memory_missing_dir() {
        let store = MemoryFileStore::new();
        let err = store.list_files(Path::new("nowhere")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_write_requires_parent() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryFileStore::new();
        assert!(store.write(Path::new("out/train.txt"), "x").is_err());
        store.create_dir_all(Path::new("out"))?;
        store.write(Path::new("out/train.txt"), "x")?;
        assert_eq!(store.contents("out/train.txt").as_deref(), Some("x"));
        Ok(())
    }

    #[test]
    fn test_memory_fail_on() {
        let store = MemoryFileStore::with_files([("data/a.txt", "0 1 2 3 4\n")]);
        store.fail_on("data/a.txt");
        let err = store.read_to_string(Path::new("data/a.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(store.remove_file(Path::new("data/a.txt")).is_err());
        assert!(store.exists(Path::new("data/a.txt")));
    }
}
