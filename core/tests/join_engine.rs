use mixsearch_core::{EmptyTextPolicy, Engine, EngineConfig, EngineError, JoinState, SqliteOperator};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

fn config(dir: &Path) -> EngineConfig {
    EngineConfig::new(dir.join("index"), dir.join("docs"), "id_site")
}

fn seed(engine: &Engine) {
    engine
        .document_store()
        .add_all([(1, "plongée corail"), (2, "musée culture"), (3, "plongée musée")])
        .unwrap();
}

fn sites() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Site (id_site INTEGER PRIMARY KEY, name TEXT, entry_price REAL);
         INSERT INTO Site VALUES (2, 'Louvre', 17.0), (3, 'Port-Cros', 0.0), (4, 'Orsay', 16.0);
         CREATE TABLE Visit (id_site INTEGER, visitor TEXT);
         INSERT INTO Visit VALUES (NULL, 'anonymous'), (3, 'ana'), (3, 'bob');",
    )
    .unwrap();
    conn
}

#[test]
fn mixed_query_joins_in_rank_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = sites();

    let result = engine.search(&conn, "SELECT name FROM Site WITH musée").unwrap();
    assert_eq!(result.ids(), vec![2, 3]);
    assert!(result.hits().windows(2).all(|w| w[0].score >= w[1].score));

    let relational: HashSet<u64> = [2, 3, 4].into_iter().collect();
    let text = engine.text_search("musée").unwrap();
    for hit in &result {
        assert!(relational.contains(&hit.id));
        assert_eq!(text.score_of(hit.id), Some(hit.score));
    }
}

#[test]
fn operator_is_reusable_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = sites();

    let mut join = engine.join_operator(SqliteOperator::new(&conn)).unwrap();
    join.init("SELECT * FROM Site WHERE entry_price < 20 WITH plongée").unwrap();
    let first = join.result().unwrap().clone();
    join.init("SELECT * FROM Site WHERE entry_price < 20 WITH plongée").unwrap();
    assert_eq!(join.result().unwrap(), &first);
    assert_eq!(first.ids(), vec![3]);

    join.init("SELECT id_site FROM Site WHERE entry_price > 10 WITH musée").unwrap();
    assert_eq!(join.result().unwrap().ids(), vec![2]);
    join.close().unwrap();
    assert_eq!(join.state(), JoinState::Closed);
}

#[test]
fn boolean_and_phrase_text() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Site (id_site INTEGER PRIMARY KEY);
         INSERT INTO Site VALUES (1), (2), (3);",
    )
    .unwrap();

    let ids = |text: &str| engine.search(&conn, &engine.keyword_query("SELECT id_site FROM Site", text)).unwrap().ids();
    assert_eq!(ids("+plongée -corail"), vec![3]);
    assert_eq!(ids("plongée AND musée"), vec![3]);
    assert_eq!(ids("\"plongée musée\""), vec![3]);
    assert!(ids("\"musée plongée\"").is_empty());
    assert_eq!(ids("corail NOT musée"), vec![1]);
}

#[test]
fn null_and_duplicate_keys() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = sites();
    let result = engine.search(&conn, "SELECT visitor FROM Visit WITH plongée").unwrap();
    assert_eq!(result.ids(), vec![3]);
}

#[test]
fn empty_text_policy() {
    let dir = tempfile::tempdir().unwrap();
    let conn = sites();

    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    assert!(engine.search(&conn, "SELECT id_site FROM Site").unwrap().is_empty());
    assert!(engine.search(&conn, "SELECT id_site FROM Site WITH de la").unwrap().is_empty());

    let mut cfg = config(dir.path());
    cfg.empty_text = EmptyTextPolicy::MatchAll;
    let engine = Engine::open(cfg).unwrap();
    let result = engine.search(&conn, "SELECT id_site FROM Site WITH").unwrap();
    assert_eq!(result.ids(), vec![2, 3]);
    assert!(result.iter().all(|h| h.score == 1.0));
}

#[test]
fn empty_document_store() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    let conn = sites();
    assert!(engine.search(&conn, "SELECT id_site FROM Site WITH musée").unwrap().is_empty());
    assert!(engine.ensure_index().unwrap().is_empty());
}

#[test]
fn errors_leave_operator_uninitialized() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = sites();
    let mut join = engine.join_operator(SqliteOperator::new(&conn)).unwrap();

    match join.init("SELECT id_site FROM Site WITH musée \"plage") {
        Err(EngineError::TextQueryParse { offset, .. }) => assert_eq!(offset, 7),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(join.state(), JoinState::Idle);
    assert!(matches!(join.next(), Err(EngineError::NotInitialized)));

    let err = join.init("SELECT id_site FROM Nowhere WITH musée").unwrap_err();
    assert!(matches!(err, EngineError::RelationalExecution { .. }));
    assert!(!err.is_query_error());

    let err = join.init("SELECT name FROM Site WHERE id_site IN (SELECT 2) WITH musée").unwrap_err();
    assert!(err.is_query_error());

    join.init("SELECT id_site FROM Site WITH musée").unwrap();
    assert_eq!(join.next().unwrap().map(|h| h.id), Some(2));
}

#[test]
fn deadline_in_the_past_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(config(dir.path())).unwrap();
    seed(&engine);
    let conn = sites();
    let err = engine.search_with_deadline(&conn, "SELECT id_site FROM Site WITH musée", Instant::now()).unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
}
