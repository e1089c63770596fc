use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TermId = u32;
/// Dense internal document number, assigned in identifier order at build time.
pub type DocId = u32;
/// Join key shared by relational rows and text documents.
pub type EntityId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub entity_id: EntityId,
    /// Number of analyzed tokens, for length normalization.
    pub length: u32,
    /// Relative path to the stored body inside the generation, e.g. texts/{doc_id}.txt
    pub text_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    /// Token positions, ascending.
    pub positions: Vec<u32>,
}

#[derive(Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    pub dictionary: HashMap<String, TermId>,
    pub df: Vec<u32>,
    pub postings: HashMap<TermId, Vec<Posting>>, // postings sorted by doc_id
    pub docs: HashMap<DocId, DocMeta>,
    pub doc_id_map: HashMap<EntityId, DocId>,
    pub num_docs: u32,
    pub total_len: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn avg_doc_len(&self) -> f64 {
        if self.num_docs == 0 { 0.0 } else { self.total_len as f64 / self.num_docs as f64 }
    }

    /// Add one analyzed document. Documents must arrive in identifier order so that
    /// internal numbers (and therefore score ties) follow identifiers.
    pub fn add_document(&mut self, entity_id: EntityId, tokens: Vec<(String, usize)>) -> DocId {
        let doc_id = self.num_docs;
        self.num_docs += 1;
        self.doc_id_map.insert(entity_id, doc_id);

        let mut per_term: HashMap<TermId, Vec<u32>> = HashMap::new();
        let length = tokens.len() as u32;
        for (term, pos) in tokens {
            let next_term_id = self.dictionary.len() as TermId;
            let tid = *self.dictionary.entry(term).or_insert(next_term_id);
            if self.df.len() <= tid as usize { self.df.resize(tid as usize + 1, 0); }
            per_term.entry(tid).or_default().push(pos as u32);
        }

        for (tid, positions) in per_term {
            self.df[tid as usize] += 1;
            self.postings.entry(tid).or_default().push(Posting { doc_id, tf: positions.len() as u32, positions });
        }

        self.total_len += length as u64;
        self.docs.insert(doc_id, DocMeta { entity_id, length, text_path: format!("texts/{doc_id}.txt") });
        doc_id
    }
}
