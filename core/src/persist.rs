use crate::index::{DocId, DocMeta, EntityId, InvertedIndex, Posting, TermId};
use crate::tokenizer::Language;
use anyhow::{anyhow, Context, Result};
use bincode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Bumped whenever the on-disk layout changes; older generations are rebuilt.
pub const FORMAT_VERSION: u32 = 2;

const CURRENT_FILE: &str = "CURRENT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    pub generation: u64,
    pub key_field: String,
    pub docs_dir: PathBuf,
    pub language: Language,
    pub avg_doc_len: f64,
    pub skipped_files: u32,
}

/// Files of one index generation.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn dictionary(&self) -> PathBuf { self.root.join("dictionary.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    fn doc_id_map(&self) -> PathBuf { self.root.join("doc_id_map.bin") }
    pub fn texts_dir(&self) -> PathBuf { self.root.join("texts") }
}

/// Root directory holding every generation plus the `CURRENT` pointer.
#[derive(Debug, Clone)]
pub struct IndexLocation {
    pub root: PathBuf,
}

impl IndexLocation {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn current_file(&self) -> PathBuf { self.root.join(CURRENT_FILE) }

    pub fn generation(&self, generation: u64) -> IndexPaths {
        IndexPaths::new(self.root.join(format!("gen-{generation:06}")))
    }

    pub fn staging(&self, generation: u64) -> IndexPaths {
        IndexPaths::new(self.root.join(format!(".gen-{generation:06}.staging")))
    }

    /// Generation named by `CURRENT`, or `None` when nothing was published yet.
    pub fn read_current(&self) -> Result<Option<u64>> {
        let path = self.current_file();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let generation = raw.trim().parse::<u64>().with_context(|| format!("corrupt pointer in {}", path.display()))?;
        Ok(Some(generation))
    }

    /// Atomically point `CURRENT` at `generation`: write a sibling file, then rename over.
    pub fn publish(&self, generation: u64) -> Result<()> {
        create_dir_all(&self.root)?;
        let tmp = self.root.join(format!("{CURRENT_FILE}.tmp"));
        {
            let mut f = File::create(&tmp)?;
            f.write_all(generation.to_string().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, self.current_file())?;
        Ok(())
    }

    /// Published generation numbers found on disk, ascending. Staging directories are excluded.
    pub fn generations(&self) -> Result<Vec<u64>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e).with_context(|| format!("listing {}", self.root.display())),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(n) = name.strip_prefix("gen-").and_then(|s| s.parse::<u64>().ok()) {
                out.push(n);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Highest generation found on disk or named by `CURRENT`. An unreadable pointer
    /// only counts what is on disk.
    pub fn highest_generation(&self) -> Result<u64> {
        let highest = self.generations()?.last().copied().unwrap_or(0);
        match self.read_current() {
            Ok(current) => Ok(highest.max(current.unwrap_or(0))),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable CURRENT pointer");
                Ok(highest)
            }
        }
    }
}

pub fn save_dictionary(paths: &IndexPaths, dict: &(HashMap<String, TermId>, Vec<u32>)) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.dictionary())?;
    let bytes = bincode::serialize(dict)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_dictionary(paths: &IndexPaths) -> Result<(HashMap<String, TermId>, Vec<u32>)> {
    let mut f = File::open(paths.dictionary())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let dict = bincode::deserialize(&buf)?;
    Ok(dict)
}

pub fn save_docs(paths: &IndexPaths, docs: &HashMap<DocId, DocMeta>) -> Result<()> {
    let mut f = File::create(paths.docs())?;
    let bytes = bincode::serialize(docs)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_docs(paths: &IndexPaths) -> Result<HashMap<DocId, DocMeta>> {
    let mut f = File::open(paths.docs())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let docs = bincode::deserialize(&buf)?;
    Ok(docs)
}

pub fn save_postings_for_term(paths: &IndexPaths, term_id: TermId, postings: &Vec<Posting>) -> Result<()> {
    let dir = paths.postings_dir();
    create_dir_all(&dir)?;
    let file = dir.join(format!("{term_id:08}.postings.bin"));
    let mut f = File::create(file)?;
    let bytes = bincode::serialize(postings)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_postings_for_term(paths: &IndexPaths, term_id: TermId) -> Result<Vec<Posting>> {
    let file = paths.postings_dir().join(format!("{term_id:08}.postings.bin"));
    let mut f = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let postings = bincode::deserialize(&buf)?;
    Ok(postings)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_doc_id_map(paths: &IndexPaths, map: &HashMap<EntityId, DocId>) -> Result<()> {
    let mut f = File::create(paths.doc_id_map())?;
    let bytes = bincode::serialize(map)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_doc_id_map(paths: &IndexPaths) -> Result<HashMap<EntityId, DocId>> {
    let mut f = File::open(paths.doc_id_map())?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let map = bincode::deserialize(&buf)?;
    Ok(map)
}

/// Structures required to search; postings stay on disk and are loaded per term.
pub struct IndexHeader {
    pub dictionary: HashMap<String, TermId>,
    pub df: Vec<u32>,
    pub docs: HashMap<DocId, DocMeta>,
    pub doc_id_map: HashMap<EntityId, DocId>,
    pub meta: MetaFile,
}

pub fn load_index_header(paths: &IndexPaths) -> Result<IndexHeader> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(anyhow!("format version {} (expected {FORMAT_VERSION})", meta.version));
    }
    let (dictionary, df) = load_dictionary(paths)?;
    let docs = load_docs(paths)?;
    let doc_id_map = load_doc_id_map(paths)?;
    if docs.len() != meta.num_docs as usize {
        return Err(anyhow!("docs.bin holds {} documents, meta.json says {}", docs.len(), meta.num_docs));
    }
    Ok(IndexHeader { dictionary, df, docs, doc_id_map, meta })
}

/// Persist every structure of a built index. Stored bodies are written by the caller.
pub fn write_index(paths: &IndexPaths, index: InvertedIndex, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let InvertedIndex { dictionary, df, postings, docs, doc_id_map, .. } = index;
    for (term_id, mut plist) in postings.into_iter() {
        plist.sort_by_key(|p| p.doc_id);
        save_postings_for_term(paths, term_id, &plist)?;
    }
    save_dictionary(paths, &(dictionary, df))?;
    save_docs(paths, &docs)?;
    save_doc_id_map(paths, &doc_id_map)?;
    save_meta(paths, meta)?;
    Ok(())
}
