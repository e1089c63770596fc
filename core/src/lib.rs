pub mod config;
pub mod docstore;
pub mod engine;
pub mod error;
pub mod index;
pub mod join;
pub mod manager;
pub mod persist;
pub mod query;
pub mod relational;
pub mod rewriter;
pub mod scored;
pub mod text_op;
pub mod tokenizer;

pub use config::{Bm25Params, EmptyTextPolicy, EngineConfig};
pub use docstore::{DocumentStore, TextDocument};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use index::{DocId, DocMeta, EntityId, InvertedIndex, Posting, TermId};
pub use join::{JoinOperator, JoinState};
pub use manager::{IndexHandle, IndexManager};
pub use relational::{RelationalOperator, RelationalPredicate, RowCursor, SqliteOperator};
pub use rewriter::{QueryRewriter, RewrittenQuery};
pub use scored::{Hit, ScoredResults};
pub use text_op::TextOperator;
pub use tokenizer::{Analyzer, Language};
