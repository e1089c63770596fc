use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mixsearch_core::{Engine, EngineConfig};
use rusqlite::Connection;
use serde_json::Value;
use server::{build_app, AppState};
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn setup(dir: &Path) -> AppState {
    let config = EngineConfig::new(dir.join("index"), dir.join("docs"), "id_site");
    let engine = Engine::open(config).unwrap();
    engine
        .document_store()
        .add_all([(1, "plongée corail"), (2, "musée culture"), (3, "plongée musée")])
        .unwrap();

    let db_path = dir.join("sites.db");
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Site (id_site INTEGER PRIMARY KEY, name TEXT, entry_price REAL);
         INSERT INTO Site VALUES (2, 'Louvre', 17.0), (3, 'Port-Cros', 0.0), (4, 'Orsay', 16.0);",
    )
    .unwrap();

    AppState { engine: Arc::new(engine), db_path, admin_token: Some("secret".into()), timeout: None }
}

fn app() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let state = setup(dir.path());
    (dir, build_app(state))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn search_returns_joined_ranking() {
    let (_dir, app) = app();
    let (status, json) = get(app, "/search?q=SELECT%20name%20FROM%20Site%20WITH%20mus%C3%A9e&k=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    let ids: Vec<u64> = json["results"].as_array().unwrap().iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(json["results"][0]["snippet"], "<em>musée</em> culture");
}

#[tokio::test]
async fn k_limits_returned_hits_not_total() {
    let (_dir, app) = app();
    let (status, json) = get(app, "/search?q=SELECT%20id_site%20FROM%20Site%20WITH%20mus%C3%A9e&k=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(json["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_queries_are_bad_requests() {
    let (_dir, app) = app();
    let (status, json) = get(app.clone(), "/search?q=SELECT%20id_site%20FROM%20Site%20WITH%20%22plage").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("byte 0"));

    let (status, _) = get(app, "/search?q=DELETE%20FROM%20Site%20WITH%20mus%C3%A9e").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn relational_failures_are_server_errors() {
    let (_dir, app) = app();
    let (status, json) = get(app, "/search?q=SELECT%20id_site%20FROM%20Nowhere%20WITH%20mus%C3%A9e").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn text_search_and_documents() {
    let (_dir, app) = app();
    let (status, json) = get(app.clone(), "/text?q=plong%C3%A9e").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);

    let (status, json) = get(app.clone(), "/doc/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["text"], "plongée musée");

    let (status, _) = get(app, "/doc/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rebuild_requires_admin_token() {
    let (_dir, app) = app();
    let req = Request::post("/index/rebuild").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/rebuild").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, json) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["num_docs"], 3);
}

#[tokio::test]
async fn health() {
    let (_dir, app) = app();
    let resp = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
