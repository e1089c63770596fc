//! Lifecycle of the persisted inverted index.
//!
//! Every build is a full rebuild into a fresh generation directory. A build is staged in
//! `.gen-N.staging`, renamed to `gen-N` and only then published by rewriting `CURRENT`,
//! so readers either see the previous generation or the complete new one. Handles keep
//! reading the generation they were opened on; old generations are only removed by
//! [`IndexManager::prune`], which keeps any generation a live handle from this manager
//! still points at.

use crate::docstore::DocumentStore;
use crate::error::{EngineError, Result};
use crate::index::{DocId, DocMeta, EntityId, InvertedIndex, Posting, TermId};
use crate::persist::{self, IndexLocation, IndexPaths, MetaFile, FORMAT_VERSION};
use crate::tokenizer::Analyzer;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// A loaded, immutable index generation.
pub struct IndexHandle {
    paths: IndexPaths,
    dictionary: HashMap<String, TermId>,
    df: Vec<u32>,
    docs: HashMap<DocId, DocMeta>,
    doc_id_map: HashMap<EntityId, DocId>,
    meta: MetaFile,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("root", &self.paths.root)
            .field("generation", &self.meta.generation)
            .field("num_docs", &self.meta.num_docs)
            .finish()
    }
}

impl IndexHandle {
    fn open(paths: IndexPaths) -> Result<Self> {
        let header = persist::load_index_header(&paths)
            .map_err(|e| EngineError::IndexRead { path: paths.root.clone(), reason: format!("{e:#}") })?;
        Ok(Self {
            paths,
            dictionary: header.dictionary,
            df: header.df,
            docs: header.docs,
            doc_id_map: header.doc_id_map,
            meta: header.meta,
        })
    }

    pub fn root(&self) -> &Path { &self.paths.root }
    pub fn meta(&self) -> &MetaFile { &self.meta }
    pub fn generation(&self) -> u64 { self.meta.generation }
    pub fn key_field(&self) -> &str { &self.meta.key_field }
    pub fn num_docs(&self) -> u32 { self.meta.num_docs }
    pub fn avg_doc_len(&self) -> f64 { self.meta.avg_doc_len }
    pub fn is_empty(&self) -> bool { self.meta.num_docs == 0 }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.dictionary.get(term).copied()
    }

    pub fn doc_freq(&self, term_id: TermId) -> u32 {
        self.df.get(term_id as usize).copied().unwrap_or(0)
    }

    pub fn doc(&self, doc_id: DocId) -> Option<&DocMeta> {
        self.docs.get(&doc_id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.doc_id_map.contains_key(&id)
    }

    /// Documents in internal (identifier) order.
    pub fn docs_in_order(&self) -> Vec<(DocId, &DocMeta)> {
        let mut docs: Vec<_> = self.docs.iter().map(|(id, meta)| (*id, meta)).collect();
        docs.sort_unstable_by_key(|(id, _)| *id);
        docs
    }

    /// Postings of a dictionary term. A term without its postings file means a damaged
    /// generation and is reported, not ignored.
    pub fn postings(&self, term_id: TermId) -> Result<Vec<Posting>> {
        persist::load_postings_for_term(&self.paths, term_id)
            .map_err(|e| EngineError::IndexRead { path: self.paths.root.clone(), reason: format!("{e:#}") })
    }

    /// Body stored for `id` at build time.
    pub fn stored_text(&self, id: EntityId) -> Result<Option<String>> {
        let Some(meta) = self.doc_id_map.get(&id).and_then(|doc_id| self.docs.get(doc_id)) else {
            return Ok(None);
        };
        let path = self.paths.root.join(&meta.text_path);
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| EngineError::IndexRead { path, reason: e.to_string() })
    }
}

pub struct IndexManager {
    location: IndexLocation,
    analyzer: Analyzer,
    build_lock: Mutex<()>,
    current: RwLock<Option<Arc<IndexHandle>>>,
    handed_out: Mutex<Vec<Weak<IndexHandle>>>,
}

fn build_err(path: &Path, reason: impl Display) -> EngineError {
    EngineError::IndexBuild { path: path.to_path_buf(), reason: reason.to_string() }
}

impl IndexManager {
    pub fn new<P: AsRef<Path>>(root: P, analyzer: Analyzer) -> Self {
        Self {
            location: IndexLocation::new(root),
            analyzer,
            build_lock: Mutex::new(()),
            current: RwLock::new(None),
            handed_out: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path { &self.location.root }
    pub fn analyzer(&self) -> Analyzer { self.analyzer }

    fn track(&self, handle: IndexHandle) -> Arc<IndexHandle> {
        let handle = Arc::new(handle);
        let mut handed_out = self.handed_out.lock();
        handed_out.retain(|h| h.strong_count() > 0);
        handed_out.push(Arc::downgrade(&handle));
        handle
    }

    /// Generations some handle opened through this manager still reads.
    fn generations_in_use(&self) -> HashSet<u64> {
        self.handed_out.lock().iter().filter_map(Weak::upgrade).map(|h| h.generation()).collect()
    }

    pub fn current_generation(&self) -> Result<Option<u64>> {
        self.location
            .read_current()
            .map_err(|e| EngineError::IndexRead { path: self.location.root.clone(), reason: format!("{e:#}") })
    }

    fn compatible(&self, handle: &IndexHandle, key_field: &str, docs_dir: &Path) -> bool {
        let meta = handle.meta();
        meta.version == FORMAT_VERSION
            && meta.key_field == key_field
            && meta.docs_dir == docs_dir
            && meta.language == self.analyzer.language()
    }

    /// Published generation if it is readable and was built with the same settings.
    fn published(&self, key_field: &str, docs_dir: &Path) -> Result<Option<Arc<IndexHandle>>> {
        let generation = match self.current_generation() {
            Ok(Some(generation)) => generation,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "CURRENT pointer unreadable, index will be rebuilt");
                return Ok(None);
            }
        };
        if let Some(handle) = self.current.read().as_ref() {
            if handle.generation() == generation && self.compatible(handle, key_field, docs_dir) {
                return Ok(Some(Arc::clone(handle)));
            }
        }
        match IndexHandle::open(self.location.generation(generation)) {
            Ok(handle) if self.compatible(&handle, key_field, docs_dir) => {
                let handle = self.track(handle);
                *self.current.write() = Some(Arc::clone(&handle));
                Ok(Some(handle))
            }
            Ok(handle) => {
                tracing::info!(generation, built_for = %handle.key_field(), key_field, "published index has different settings");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "published index unreadable");
                Ok(None)
            }
        }
    }

    /// Queryable index for `key_field` over `docs_dir`, built on first use.
    pub fn ensure_index(&self, key_field: &str, docs_dir: &Path) -> Result<Arc<IndexHandle>> {
        if let Some(handle) = self.published(key_field, docs_dir)? {
            return Ok(handle);
        }
        let _guard = self.build_lock.lock();
        // another caller may have finished a build while we waited
        if let Some(handle) = self.published(key_field, docs_dir)? {
            return Ok(handle);
        }
        self.build(key_field, docs_dir)
    }

    /// Unconditional full rebuild. On failure the previous generation stays published.
    pub fn rebuild(&self, key_field: &str, docs_dir: &Path) -> Result<Arc<IndexHandle>> {
        let _guard = self.build_lock.lock();
        self.build(key_field, docs_dir)
    }

    fn build(&self, key_field: &str, docs_dir: &Path) -> Result<Arc<IndexHandle>> {
        let started = Instant::now();
        let root = &self.location.root;
        let generation = self.location.highest_generation().map_err(|e| build_err(root, format!("{e:#}")))? + 1;
        let staging = self.location.staging(generation);
        if staging.root.exists() {
            fs::remove_dir_all(&staging.root).map_err(|e| build_err(&staging.root, e))?;
        }

        let meta = match self.write_generation(&staging, generation, key_field, docs_dir) {
            Ok(meta) => meta,
            Err(e) => {
                discard(&staging.root);
                return Err(e);
            }
        };

        let target = self.location.generation(generation);
        if let Err(e) = fs::rename(&staging.root, &target.root) {
            discard(&staging.root);
            return Err(build_err(&target.root, e));
        }
        self.location.publish(generation).map_err(|e| build_err(root, format!("{e:#}")))?;

        let handle = self.track(IndexHandle::open(target)?);
        *self.current.write() = Some(Arc::clone(&handle));
        tracing::info!(
            generation,
            num_docs = meta.num_docs,
            skipped = meta.skipped_files,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index generation published"
        );
        Ok(handle)
    }

    fn write_generation(&self, paths: &IndexPaths, generation: u64, key_field: &str, docs_dir: &Path) -> Result<MetaFile> {
        let store = DocumentStore::new(docs_dir);
        let scan = store.scan().map_err(|e| build_err(docs_dir, e))?;
        let texts = paths.texts_dir();
        fs::create_dir_all(&texts).map_err(|e| build_err(&texts, e))?;

        let mut index = InvertedIndex::new();
        for (id, path) in &scan.documents {
            let doc = store.load(*id, path).map_err(|e| build_err(path, e))?;
            let tokens = self.analyzer.analyze(&doc.body);
            let doc_id = index.add_document(doc.id, tokens);
            let stored = texts.join(format!("{doc_id}.txt"));
            fs::write(&stored, &doc.body).map_err(|e| build_err(&stored, e))?;
        }
        tracing::debug!(generation, num_docs = index.num_docs, num_terms = index.dictionary.len(), "documents analyzed");

        let meta = MetaFile {
            num_docs: index.num_docs,
            created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
            version: FORMAT_VERSION,
            generation,
            key_field: key_field.to_string(),
            docs_dir: docs_dir.to_path_buf(),
            language: self.analyzer.language(),
            avg_doc_len: index.avg_doc_len(),
            skipped_files: scan.skipped.len() as u32,
        };
        persist::write_index(paths, index, &meta).map_err(|e| build_err(&paths.root, format!("{e:#}")))?;
        Ok(meta)
    }

    /// Delete every generation except the published one and the `keep` most recent
    /// previous ones, plus leftover staging directories. Generations still read by a
    /// handle from this manager are kept; handles held by other managers or processes
    /// are not tracked. Returns the number of generations removed.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let _guard = self.build_lock.lock();
        let root = &self.location.root;
        let current = self.current_generation()?;
        let generations = self.location.generations().map_err(|e| build_err(root, format!("{e:#}")))?;

        let in_use = self.generations_in_use();
        let mut removed = 0;
        let previous = generations.iter().rev().filter(|g| Some(**g) != current);
        for generation in previous.skip(keep) {
            if in_use.contains(generation) {
                tracing::debug!(generation, "index generation still in use, kept");
                continue;
            }
            let dir = self.location.generation(*generation).root;
            fs::remove_dir_all(&dir).map_err(|e| build_err(&dir, e))?;
            tracing::info!(generation, "index generation pruned");
            removed += 1;
        }

        if let Ok(entries) = fs::read_dir(root) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().ends_with(".staging") {
                    discard(&entry.path());
                }
            }
        }
        Ok(removed)
    }
}

fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to remove staging directory");
    }
}
