//! Semi-join of a text ranking with a relational predicate.
//!
//! `init` rewrites the mixed query, ranks the text half (small, held in memory), streams
//! the relational keys once (never materializing rows) and keeps the ranked identifiers
//! that the relational side also produced, in rank order.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::EntityId;
use crate::manager::IndexManager;
use crate::relational::{RelationalOperator, RelationalPredicate, RowCursor};
use crate::rewriter::QueryRewriter;
use crate::scored::{Hit, ScoredResults};
use crate::text_op::TextOperator;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Relational rows consumed between two deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Idle,
    Initialized,
    Closed,
}

enum State {
    Idle,
    Initialized { result: ScoredResults, cursor: usize },
    Closed,
}

pub struct JoinOperator<R: RelationalOperator> {
    key_field: String,
    rewriter: QueryRewriter,
    text: TextOperator,
    relational: R,
    state: State,
}

fn check_deadline(deadline: Option<Instant>, phase: &'static str) -> Result<()> {
    match deadline {
        Some(at) if Instant::now() >= at => Err(EngineError::DeadlineExceeded { phase }),
        _ => Ok(()),
    }
}

impl<R: RelationalOperator> JoinOperator<R> {
    pub fn new(config: &EngineConfig, manager: Arc<IndexManager>, relational: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key_field: config.key_field.clone(),
            rewriter: QueryRewriter::new(&config.separator)?,
            text: TextOperator::new(manager, config),
            relational,
            state: State::Idle,
        })
    }

    pub fn state(&self) -> JoinState {
        match self.state {
            State::Idle => JoinState::Idle,
            State::Initialized { .. } => JoinState::Initialized,
            State::Closed => JoinState::Closed,
        }
    }

    /// Run the whole pipeline for `mixed`. Any previous result is discarded first, so a
    /// failed run leaves the operator `Idle`.
    pub fn init(&mut self, mixed: &str) -> Result<()> {
        self.run(mixed, None)
    }

    /// Like [`init`](Self::init), aborting with `DeadlineExceeded` once `deadline` passes.
    pub fn init_with_deadline(&mut self, mixed: &str, deadline: Instant) -> Result<()> {
        self.run(mixed, Some(deadline))
    }

    fn run(&mut self, mixed: &str, deadline: Option<Instant>) -> Result<()> {
        if matches!(self.state, State::Closed) {
            return Err(EngineError::Closed);
        }
        self.state = State::Idle;

        let outcome = self.execute(mixed, deadline);
        self.text.close();
        let closed = self.relational.close();

        match (outcome, closed) {
            (Ok(result), Ok(())) => {
                tracing::debug!(hits = result.len(), "mixed query initialized");
                self.state = State::Initialized { result, cursor: 0 };
                Ok(())
            }
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "closing relational operator after failure");
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, mixed: &str, deadline: Option<Instant>) -> Result<ScoredResults> {
        let started = Instant::now();
        let rewritten = self.rewriter.rewrite(mixed, &self.key_field)?;
        tracing::debug!(clause = rewritten.predicate.clause(), text = %rewritten.text, "mixed query rewritten");
        check_deadline(deadline, "rewrite")?;

        let text_scores = self.text.execute(&rewritten.text)?;
        tracing::debug!(hits = text_scores.len(), elapsed_ms = started.elapsed().as_millis() as u64, "text phase done");
        check_deadline(deadline, "text search")?;

        let wanted: HashSet<EntityId> = text_scores.iter().map(|h| h.id).collect();
        let relational_ids = collect_keys(&mut self.relational, &rewritten.predicate, &wanted, deadline)?;
        check_deadline(deadline, "relational scan")?;

        let joined = text_scores.semi_join(&relational_ids);
        tracing::debug!(
            text_hits = text_scores.len(),
            joined = joined.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "join done"
        );
        Ok(joined)
    }

    /// Next hit in rank order, `None` when exhausted.
    pub fn next(&mut self) -> Result<Option<Hit>> {
        match &mut self.state {
            State::Initialized { result, cursor } => {
                let hit = result.get_index(*cursor);
                if hit.is_some() {
                    *cursor += 1;
                }
                Ok(hit)
            }
            State::Idle => Err(EngineError::NotInitialized),
            State::Closed => Err(EngineError::Closed),
        }
    }

    /// Rewind `next` to the best hit without re-running the query.
    pub fn reset(&mut self) -> Result<()> {
        match &mut self.state {
            State::Initialized { cursor, .. } => {
                *cursor = 0;
                Ok(())
            }
            State::Idle => Err(EngineError::NotInitialized),
            State::Closed => Err(EngineError::Closed),
        }
    }

    /// Full ranked result.
    pub fn result(&self) -> Result<&ScoredResults> {
        match &self.state {
            State::Initialized { result, .. } => Ok(result),
            State::Idle => Err(EngineError::NotInitialized),
            State::Closed => Err(EngineError::Closed),
        }
    }

    pub fn into_result(self) -> Result<ScoredResults> {
        match self.state {
            State::Initialized { result, .. } => Ok(result),
            State::Idle => Err(EngineError::NotInitialized),
            State::Closed => Err(EngineError::Closed),
        }
    }

    /// Release both sub-operators and drop the result. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.state = State::Closed;
        self.text.close();
        self.relational.close()
    }
}

/// Stream the relational keys once, keeping only those present in `wanted`. The cursor is
/// dropped before returning, on success and on error alike.
fn collect_keys<R: RelationalOperator>(
    relational: &mut R,
    predicate: &RelationalPredicate,
    wanted: &HashSet<EntityId>,
    deadline: Option<Instant>,
) -> Result<HashSet<EntityId>> {
    let mut cursor = relational.execute(predicate)?;
    let mut ids = HashSet::new();
    let mut rows = 0u64;
    let mut ignored = 0u64;
    while let Some(raw) = cursor.next_key()? {
        rows += 1;
        if rows % DEADLINE_CHECK_INTERVAL == 0 {
            check_deadline(deadline, "relational scan")?;
        }
        match EntityId::try_from(raw) {
            Ok(id) if id > 0 => {
                if wanted.contains(&id) {
                    ids.insert(id);
                }
            }
            _ => ignored += 1,
        }
    }
    tracing::debug!(rows, matched = ids.len(), ignored, "relational keys streamed");
    Ok(ids)
}
