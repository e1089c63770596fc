//! Relational side of a mixed query.
//!
//! The operator runs a complete, already rewritten predicate and exposes the join key of
//! each row through a forward-only cursor. It does no validation, caching or ranking:
//! predicate evaluation belongs to the store's own planner.

use crate::error::{EngineError, Result};
use rusqlite::{Connection, Rows, Statement};

/// Relational clause plus the column carrying the join key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalPredicate {
    clause: String,
    key_column: String,
}

impl RelationalPredicate {
    pub fn new(clause: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self { clause: clause.into(), key_column: key_column.into() }
    }

    pub fn clause(&self) -> &str { &self.clause }
    pub fn key_column(&self) -> &str { &self.key_column }
}

/// Forward-only stream of join-key values, consumed once.
pub trait RowCursor {
    /// Key of the next row, `None` once the stream is exhausted.
    fn next_key(&mut self) -> Result<Option<i64>>;
}

pub trait RelationalOperator {
    type Cursor<'a>: RowCursor
    where
        Self: 'a;

    /// Run `predicate`. The cursor borrows the operator, so it is always released before
    /// the operator can be closed or re-executed.
    fn execute<'a>(&'a mut self, predicate: &RelationalPredicate) -> Result<Self::Cursor<'a>>;

    /// Release store resources. Safe to call any number of times.
    fn close(&mut self) -> Result<()>;
}

/// SQLite adapter over a connection owned by the caller.
pub struct SqliteOperator<'conn> {
    conn: &'conn Connection,
    statement: Option<Statement<'conn>>,
}

impl<'conn> SqliteOperator<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn, statement: None }
    }

    pub fn is_open(&self) -> bool {
        self.statement.is_some()
    }
}

pub struct SqliteCursor<'a> {
    clause: String,
    rows: Rows<'a>,
    key_index: usize,
}

impl RowCursor for SqliteCursor<'_> {
    fn next_key(&mut self) -> Result<Option<i64>> {
        loop {
            let row = self.rows.next().map_err(|e| EngineError::relational(&self.clause, e))?;
            let Some(row) = row else { return Ok(None) };
            match row.get::<_, Option<i64>>(self.key_index).map_err(|e| EngineError::relational(&self.clause, e))? {
                Some(key) => return Ok(Some(key)),
                None => continue,
            }
        }
    }
}

impl<'conn> RelationalOperator for SqliteOperator<'conn> {
    type Cursor<'a> = SqliteCursor<'a> where Self: 'a;

    fn execute<'a>(&'a mut self, predicate: &RelationalPredicate) -> Result<SqliteCursor<'a>> {
        self.statement = None;
        let clause = predicate.clause();
        let statement = self.conn.prepare(clause).map_err(|e| EngineError::relational(clause, e))?;
        let key_index = statement
            .column_index(predicate.key_column())
            .map_err(|e| EngineError::relational(clause, e))?;
        tracing::debug!(clause, key_index, "relational predicate prepared");

        let statement = self.statement.insert(statement);
        let rows = statement.query([]).map_err(|e| EngineError::relational(clause, e))?;
        Ok(SqliteCursor { clause: clause.to_string(), rows, key_index })
    }

    fn close(&mut self) -> Result<()> {
        if self.statement.take().is_some() {
            tracing::trace!("relational statement finalized");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visits() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Visit (id_site INTEGER, visitor TEXT);
             INSERT INTO Visit VALUES (3, 'ana'), (NULL, 'anonymous'), (2, 'bob');",
        )
        .unwrap();
        conn
    }

    fn drain(cursor: &mut impl RowCursor) -> Vec<i64> {
        let mut keys = Vec::new();
        while let Some(key) = cursor.next_key().unwrap() {
            keys.push(key);
        }
        keys
    }

    #[test]
    fn streams_keys_and_skips_nulls() {
        let conn = visits();
        let mut op = SqliteOperator::new(&conn);
        let predicate = RelationalPredicate::new("SELECT visitor, id_site FROM Visit ORDER BY visitor", "id_site");
        let keys = drain(&mut op.execute(&predicate).unwrap());
        assert_eq!(keys, vec![3, 2]);
        assert!(op.is_open());

        op.close().unwrap();
        assert!(!op.is_open());
        op.close().unwrap();
    }

    #[test]
    fn missing_key_column_is_an_execution_error() {
        let conn = visits();
        let mut op = SqliteOperator::new(&conn);
        let err = op.execute(&RelationalPredicate::new("SELECT visitor FROM Visit", "id_site")).err().unwrap();
        assert!(matches!(err, EngineError::RelationalExecution { .. }));
        assert!(!op.is_open());
    }
}
