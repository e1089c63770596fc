//! Entry point tying configuration, document store and index lifecycle together.

use crate::config::EngineConfig;
use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::index::EntityId;
use crate::join::JoinOperator;
use crate::manager::{IndexHandle, IndexManager};
use crate::relational::{RelationalOperator, SqliteOperator};
use crate::scored::ScoredResults;
use crate::text_op::TextOperator;
use crate::tokenizer::Analyzer;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Instant;

/// Shared engine state. Cheap to share behind an `Arc`; every query builds its own
/// operators on top of it.
pub struct Engine {
    config: EngineConfig,
    store: DocumentStore,
    manager: Arc<IndexManager>,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(IndexManager::new(&config.index_root, Analyzer::new(config.language)));
        let store = DocumentStore::new(&config.docs_dir);
        tracing::info!(
            index = %config.index_root.display(),
            docs = %config.docs_dir.display(),
            key_field = %config.key_field,
            language = %config.language,
            "engine opened"
        );
        Ok(Self { config, store, manager })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn manager(&self) -> &Arc<IndexManager> { &self.manager }
    pub fn document_store(&self) -> &DocumentStore { &self.store }

    pub fn ensure_index(&self) -> Result<Arc<IndexHandle>> {
        self.manager.ensure_index(&self.config.key_field, &self.config.docs_dir)
    }

    /// Full rebuild, picking up documents added or removed since the last build.
    pub fn rebuild_index(&self) -> Result<Arc<IndexHandle>> {
        self.manager.rebuild(&self.config.key_field, &self.config.docs_dir)
    }

    pub fn prune_generations(&self, keep: usize) -> Result<usize> {
        self.manager.prune(keep)
    }

    pub fn join_operator<R: RelationalOperator>(&self, relational: R) -> Result<JoinOperator<R>> {
        JoinOperator::new(&self.config, Arc::clone(&self.manager), relational)
    }

    /// Run `mixed` once against `conn` and return the joined ranking.
    pub fn search(&self, conn: &Connection, mixed: &str) -> Result<ScoredResults> {
        self.run(conn, mixed, None)
    }

    pub fn search_with_deadline(&self, conn: &Connection, mixed: &str, deadline: Instant) -> Result<ScoredResults> {
        self.run(conn, mixed, Some(deadline))
    }

    fn run(&self, conn: &Connection, mixed: &str, deadline: Option<Instant>) -> Result<ScoredResults> {
        let mut join = self.join_operator(SqliteOperator::new(conn))?;
        match deadline {
            Some(at) => join.init_with_deadline(mixed, at)?,
            None => join.init(mixed)?,
        }
        join.into_result()
    }

    /// Rank a plain text query, without any relational filter.
    pub fn text_search(&self, text: &str) -> Result<ScoredResults> {
        let mut op = TextOperator::new(Arc::clone(&self.manager), &self.config);
        let result = op.execute(text);
        op.close();
        result
    }

    /// Body of document `id` as currently stored on disk.
    pub fn document(&self, id: EntityId) -> Result<Option<String>> {
        self.store.read(id)
    }

    /// Build a mixed query from a relational clause and plain keywords.
    pub fn keyword_query(&self, relational: &str, keywords: &str) -> String {
        format!("{} {} {}", relational.trim(), self.config.separator, keywords.trim())
    }
}
