//! Directory of `<id>.txt` documents, one per entity identifier.
//!
//! Only `.txt` files directly inside the directory are considered. A `.txt` file whose
//! stem is not the canonical decimal form of a positive identifier (`12` is accepted,
//! `012`, `0`, `-3` and `abc` are not) is skipped and reported in [`StoreScan::skipped`].

use crate::error::{EngineError, Result};
use crate::index::EntityId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub id: EntityId,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct StoreScan {
    /// Accepted documents, ascending by identifier.
    pub documents: Vec<(EntityId, PathBuf)>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

/// Identifier encoded by a document file name, if the name follows the `<id>.txt` scheme.
pub fn parse_identifier(file_name: &str) -> Option<EntityId> {
    let stem = file_name.strip_suffix(".txt")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) || stem.starts_with('0') {
        return None;
    }
    stem.parse::<EntityId>().ok()
}

impl DocumentStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: EntityId) -> PathBuf {
        self.dir.join(format!("{id}.txt"))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> EngineError {
        EngineError::DocumentStore { path: path.to_path_buf(), source }
    }

    pub fn scan(&self) -> Result<StoreScan> {
        let mut scan = StoreScan::default();
        if !self.dir.exists() {
            tracing::debug!(dir = %self.dir.display(), "document directory missing, treating as empty");
            return Ok(scan);
        }
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.dir.clone());
                let source = e.into_io_error().unwrap_or_else(|| std::io::Error::new(ErrorKind::Other, "directory walk failed"));
                EngineError::DocumentStore { path, source }
            })?;
            if !entry.file_type().is_file() { continue; }
            let Some(name) = entry.file_name().to_str() else {
                scan.skipped.push(entry.path().to_path_buf());
                continue;
            };
            if !name.ends_with(".txt") { continue; }
            match parse_identifier(name) {
                Some(id) => scan.documents.push((id, entry.path().to_path_buf())),
                None => {
                    tracing::warn!(file = %entry.path().display(), "skipping document with non-identifier name");
                    scan.skipped.push(entry.path().to_path_buf());
                }
            }
        }
        scan.documents.sort_by_key(|(id, _)| *id);
        scan.skipped.sort();
        Ok(scan)
    }

    /// Body of document `id`, `None` when no file exists for it.
    pub fn read(&self, id: EntityId) -> Result<Option<String>> {
        let path = self.path_for(id);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(&path, e)),
        }
    }

    /// Load a scanned document. Non UTF-8 content is an error.
    pub fn load(&self, id: EntityId, path: &Path) -> Result<TextDocument> {
        let body = fs::read_to_string(path).map_err(|e| self.io_error(path, e))?;
        Ok(TextDocument { id, body })
    }

    /// Attach text to identifier `id`, creating `<id>.txt` (and the directory) as needed.
    pub fn add(&self, id: EntityId, text: &str) -> Result<PathBuf> {
        if id == 0 {
            return Err(self.io_error(&self.path_for(id), std::io::Error::new(ErrorKind::InvalidInput, "identifier must be positive")));
        }
        fs::create_dir_all(&self.dir).map_err(|e| self.io_error(&self.dir, e))?;
        let path = self.path_for(id);
        fs::write(&path, text.as_bytes()).map_err(|e| self.io_error(&path, e))?;
        tracing::debug!(id, file = %path.display(), "document written");
        Ok(path)
    }

    pub fn add_all<'a, I>(&self, docs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (EntityId, &'a str)>,
    {
        let mut written = 0;
        for (id, text) in docs {
            self.add(id, text)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.path_for(id).is_file()
    }

    /// Returns false when there was nothing to remove.
    pub fn remove(&self, id: EntityId) -> Result<bool> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(id, file = %path.display(), "document removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(&path, e)),
        }
    }

    /// Number of accepted documents.
    pub fn count(&self) -> Result<usize> {
        Ok(self.scan()?.documents.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_policy() {
        assert_eq!(parse_identifier("12.txt"), Some(12));
        assert_eq!(parse_identifier("012.txt"), None);
        assert_eq!(parse_identifier("0.txt"), None);
        assert_eq!(parse_identifier("-3.txt"), None);
        assert_eq!(parse_identifier("abc.txt"), None);
        assert_eq!(parse_identifier("12.md"), None);
        assert_eq!(parse_identifier(".txt"), None);
    }

    #[test]
    fn scan_sorts_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        store.add(10, "dix").unwrap();
        store.add(2, "deux").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("3.json"), "{}").unwrap();

        let scan = store.scan().unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 10]);
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("nope"));
        assert!(store.scan().unwrap().documents.is_empty());
        assert_eq!(store.read(1).unwrap(), None);
    }

    #[test]
    fn add_remove_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("r"));
        store.add_all([(1, "plongée corail"), (2, "musée culture")]).unwrap();
        assert!(store.exists(1));
        assert_eq!(store.read(2).unwrap().as_deref(), Some("musée culture"));
        assert!(store.remove(1).unwrap());
        assert!(!store.remove(1).unwrap());
        assert!(!store.exists(1));
        assert!(store.add(0, "zero").is_err());
    }
}
