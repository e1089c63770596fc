//! Free-text operator: parses a text clause, analyzes it with the index-time analyzer and
//! ranks matching documents with BM25.

use crate::config::{Bm25Params, EmptyTextPolicy, EngineConfig};
use crate::error::Result;
use crate::index::{DocId, Posting, TermId};
use crate::manager::{IndexHandle, IndexManager};
use crate::query::{self, Occur, TextQuery};
use crate::scored::{Hit, ScoredResults};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// One analyzed clause: a single term, or a phrase of terms with their relative offsets.
struct Prepared {
    occur: Occur,
    terms: Vec<(String, usize)>,
}

pub struct TextOperator {
    manager: Arc<IndexManager>,
    key_field: String,
    docs_dir: PathBuf,
    max_results: usize,
    empty_text: EmptyTextPolicy,
    bm25: Bm25Params,
    handle: Option<Arc<IndexHandle>>,
}

impl TextOperator {
    pub fn new(manager: Arc<IndexManager>, config: &EngineConfig) -> Self {
        Self {
            manager,
            key_field: config.key_field.clone(),
            docs_dir: config.docs_dir.clone(),
            max_results: config.max_results,
            empty_text: config.empty_text,
            bm25: config.bm25,
            handle: None,
        }
    }

    /// Make sure an index exists and hold it until [`close`](Self::close).
    pub fn open(&mut self) -> Result<Arc<IndexHandle>> {
        let handle = self.manager.ensure_index(&self.key_field, &self.docs_dir)?;
        self.handle = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Parse `text`, open the index and rank. Syntax errors are reported before any
    /// index work happens.
    pub fn execute(&mut self, text: &str) -> Result<ScoredResults> {
        let parsed = query::parse(text)?;
        let handle = self.open()?;
        self.evaluate(&handle, &parsed)
    }

    /// Rank `text` against an already opened index.
    pub fn search(&self, handle: &IndexHandle, text: &str) -> Result<ScoredResults> {
        let parsed = query::parse(text)?;
        self.evaluate(handle, &parsed)
    }

    pub fn close(&mut self) {
        self.handle = None;
    }

    fn evaluate(&self, handle: &IndexHandle, parsed: &TextQuery) -> Result<ScoredResults> {
        if parsed.is_empty() {
            return Ok(match self.empty_text {
                EmptyTextPolicy::MatchNothing => ScoredResults::default(),
                EmptyTextPolicy::MatchAll => self.match_all(handle),
            });
        }

        let analyzer = self.manager.analyzer();
        let mut prepared = Vec::new();
        for clause in &parsed.clauses {
            let tokens = analyzer.analyze(&clause.text);
            if tokens.is_empty() { continue; }
            if clause.phrase && tokens.len() > 1 {
                let base = tokens[0].1;
                let terms = tokens.into_iter().map(|(t, pos)| (t, pos - base)).collect();
                prepared.push(Prepared { occur: clause.occur, terms });
            } else {
                for (term, _) in tokens {
                    prepared.push(Prepared { occur: clause.occur, terms: vec![(term, 0)] });
                }
            }
        }
        if !prepared.iter().any(|p| p.occur != Occur::MustNot) {
            return Ok(ScoredResults::default());
        }

        let mut candidates: Option<HashSet<DocId>> = None;
        let mut should_hits: HashSet<DocId> = HashSet::new();
        let mut excluded: HashSet<DocId> = HashSet::new();
        let mut scores: HashMap<DocId, f64> = HashMap::new();
        let has_must = prepared.iter().any(|p| p.occur == Occur::Must);

        for clause in &prepared {
            let matched = self.score_clause(handle, clause)?;
            match clause.occur {
                Occur::MustNot => excluded.extend(matched.keys().copied()),
                Occur::Must => {
                    let ids: HashSet<DocId> = matched.keys().copied().collect();
                    candidates = Some(match candidates {
                        Some(prev) => prev.intersection(&ids).copied().collect(),
                        None => ids,
                    });
                }
                Occur::Should => should_hits.extend(matched.keys().copied()),
            }
            if clause.occur != Occur::MustNot {
                for (doc, s) in matched {
                    *scores.entry(doc).or_insert(0.0) += s;
                }
            }
        }

        let accepted = if has_must { candidates.unwrap_or_default() } else { should_hits };
        let mut ranked: Vec<(DocId, f64)> = scores
            .into_iter()
            .filter(|(doc, _)| accepted.contains(doc) && !excluded.contains(doc))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.truncate(self.max_results);

        let hits = ranked
            .into_iter()
            .filter_map(|(doc, score)| handle.doc(doc).map(|meta| Hit { id: meta.entity_id, score }))
            .collect();
        Ok(ScoredResults::from_ranked(hits))
    }

    fn match_all(&self, handle: &IndexHandle) -> ScoredResults {
        let hits = handle
            .docs_in_order()
            .into_iter()
            .take(self.max_results)
            .map(|(_, meta)| Hit { id: meta.entity_id, score: 1.0 })
            .collect();
        ScoredResults::from_ranked(hits)
    }

    fn idf(&self, handle: &IndexHandle, term_id: TermId) -> f64 {
        let n = handle.num_docs() as f64;
        let df = handle.doc_freq(term_id) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn tf_norm(&self, handle: &IndexHandle, freq: u32, doc: DocId) -> f64 {
        let Bm25Params { k1, b } = self.bm25;
        let freq = freq as f64;
        let avg = handle.avg_doc_len();
        let dl = handle.doc(doc).map(|m| m.length as f64).unwrap_or(avg);
        let norm = if avg > 0.0 { 1.0 - b + b * dl / avg } else { 1.0 };
        freq * (k1 + 1.0) / (freq + k1 * norm)
    }

    /// Matching documents of one clause with their BM25 contribution.
    fn score_clause(&self, handle: &IndexHandle, clause: &Prepared) -> Result<HashMap<DocId, f64>> {
        let mut lists: Vec<(Vec<Posting>, usize, f64)> = Vec::with_capacity(clause.terms.len());
        for (term, offset) in &clause.terms {
            let Some(term_id) = handle.term_id(term) else { return Ok(HashMap::new()) };
            lists.push((handle.postings(term_id)?, *offset, self.idf(handle, term_id)));
        }

        if lists.len() == 1 {
            let (postings, _, idf) = &lists[0];
            return Ok(postings.iter().map(|p| (p.doc_id, idf * self.tf_norm(handle, p.tf, p.doc_id))).collect());
        }

        let idf: f64 = lists.iter().map(|(_, _, idf)| idf).sum();
        let indexed: Vec<(HashMap<DocId, &Posting>, usize)> = lists
            .iter()
            .map(|(postings, offset, _)| (postings.iter().map(|p| (p.doc_id, p)).collect(), *offset))
            .collect();
        let (first, first_offset) = &indexed[0];

        let mut out = HashMap::new();
        for (doc, head) in first {
            let mut freq = 0u32;
            'start: for &pos in &head.positions {
                let Some(origin) = (pos as usize).checked_sub(*first_offset) else { continue };
                for (postings, offset) in &indexed[1..] {
                    let Some(p) = postings.get(doc) else { break 'start };
                    if p.positions.binary_search(&((origin + offset) as u32)).is_err() {
                        continue 'start;
                    }
                }
                freq += 1;
            }
            if freq > 0 {
                out.insert(*doc, idf * self.tf_norm(handle, freq, *doc));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::DocumentStore;
    use crate::error::EngineError;
    use crate::tokenizer::Analyzer;

    fn operator(dir: &std::path::Path, empty_text: EmptyTextPolicy) -> TextOperator {
        let mut config = EngineConfig::new(dir.join("index"), dir.join("docs"), "id_site");
        config.empty_text = empty_text;
        DocumentStore::new(&config.docs_dir)
            .add_all([(1, "plongée corail"), (2, "musée culture"), (3, "plongée musée")])
            .unwrap();
        let manager = Arc::new(IndexManager::new(&config.index_root, Analyzer::new(config.language)));
        TextOperator::new(manager, &config)
    }

    #[test]
    fn search_on_an_open_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut op = operator(dir.path(), EmptyTextPolicy::MatchNothing);
        let handle = op.open().unwrap();

        let result = op.search(&handle, "musée").unwrap();
        assert_eq!(result.ids(), vec![2, 3]);
        assert_eq!(result.score_of(2), result.score_of(3));
        assert_eq!(op.search(&handle, "plongée -corail").unwrap().ids(), vec![3]);

        assert!(op.search(&handle, "").unwrap().is_empty());
        assert!(op.search(&handle, "   ").unwrap().is_empty());
        assert!(op.search(&handle, "inconnu").unwrap().is_empty());

        match op.search(&handle, "musée \"plage") {
            Err(EngineError::TextQueryParse { offset, .. }) => assert_eq!(offset, 7),
            other => panic!("unexpected {other:?}"),
        }
        op.close();
    }

    #[test]
    fn empty_text_can_match_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut op = operator(dir.path(), EmptyTextPolicy::MatchAll);
        let handle = op.open().unwrap();
        let result = op.search(&handle, "").unwrap();
        assert_eq!(result.ids(), vec![1, 2, 3]);
        assert!(result.iter().all(|h| h.score == 1.0));
    }

    #[test]
    fn phrase_needs_adjacent_terms() {
        let dir = tempfile::tempdir().unwrap();
        let mut op = operator(dir.path(), EmptyTextPolicy::MatchNothing);
        let handle = op.open().unwrap();
        assert_eq!(op.search(&handle, "\"plongée musée\"").unwrap().ids(), vec![3]);
        assert!(op.search(&handle, "\"musée plongée\"").unwrap().is_empty());
    }
}
