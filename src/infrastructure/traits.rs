//! Filesystem boundary
//!
//! Services read fits and write records through [`FileSystem`], so batch
//! runs can be exercised against [`MemoryFileSystem`] without touching disk.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use walkdir::WalkDir;

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Regular files below `dir` (recursively) with extension `ext`, sorted by path.
    fn walk_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>>;
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn walk_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        let mut files = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() && has_extension(entry.path(), ext) => {
                    Some(Ok(entry.into_path()))
                }
                Ok(_) => None,
                Err(e) => Some(Err(io::Error::from(e))),
            })
            .collect::<io::Result<Vec<_>>>()?;
        files.sort();
        Ok(files)
    }
}

/// Files held in memory; a directory exists when some file lies below it
/// or it was created explicitly.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, String>>,
    dirs: RwLock<Vec<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for test setup.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), content.into());
        }
        self
    }

    fn poisoned() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "memory filesystem lock poisoned")
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.read().is_ok_and(|files| files.contains_key(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let explicit = self
            .dirs
            .read()
            .is_ok_and(|dirs| dirs.iter().any(|d| d.starts_with(path)));
        explicit
            || self
                .files
                .read()
                .is_ok_and(|files| files.keys().any(|f| f != path && f.starts_with(path)))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.write().map_err(|_| Self::poisoned())?;
        dirs.push(path.to_path_buf());
        Ok(())
    }

    fn walk_files(&self, dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        // BTreeMap keys are already in path order
        Ok(files
            .keys()
            .filter(|f| f.starts_with(dir) && has_extension(f, ext))
            .cloned()
            .collect())
    }
}
