use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mixsearch_core::query::{self, Occur};
use mixsearch_core::{Engine, EngineError, EntityId, QueryRewriter, ScoredResults};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: EntityId,
    pub score: f64,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// SQLite database the relational half of `/search` runs against.
    pub db_path: PathBuf,
    pub admin_token: Option<String>,
    /// Per-query deadline for mixed searches.
    pub timeout: Option<Duration>,
}

impl AppState {
    /// State with the admin token taken from `ADMIN_TOKEN`.
    pub fn new(engine: Arc<Engine>, db_path: PathBuf) -> Self {
        Self { engine, db_path, admin_token: std::env::var("ADMIN_TOKEN").ok(), timeout: None }
    }
}

/// Errors returned to HTTP clients as `{"error": ...}`.
pub enum ApiError {
    Engine(EngineError),
    NotFound(String),
    Unauthorized(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Engine(e) => {
                let status = if e.is_query_error() {
                    StatusCode::BAD_REQUEST
                } else if matches!(e, EngineError::DeadlineExceeded { .. }) {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    tracing::error!(error = %e, "query failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, e.to_string())
            }
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/text", get(text_handler))
        .route("/doc/:id", get(doc_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run blocking engine work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let engine = Arc::clone(&state.engine);
    let db_path = state.db_path.clone();
    let deadline = state.timeout.map(|t| start + t);
    let q = params.q.clone();

    let (result, text) = blocking(move || {
        let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| ApiError::Internal(format!("cannot open {}: {e}", db_path.display())))?;
        let result = match deadline {
            Some(at) => engine.search_with_deadline(&conn, &q, at)?,
            None => engine.search(&conn, &q)?,
        };
        let (_, text) = QueryRewriter::new(&engine.config().separator)?.split(&q);
        Ok((result, text))
    })
    .await?;

    let (results, total_hits) = with_snippets(&state.engine, result, &text, params.k).await?;
    let elapsed = start.elapsed();
    tracing::info!(query = %params.q, total_hits, took_ms = elapsed.as_millis() as u64, "mixed search");
    Ok(Json(SearchResponse { query: params.q, took_ms: elapsed.as_millis(), took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn text_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let engine = Arc::clone(&state.engine);
    let q = params.q.clone();
    let result = blocking(move || Ok(engine.text_search(&q)?)).await?;

    let (results, total_hits) = with_snippets(&state.engine, result, &params.q, params.k).await?;
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_ms: elapsed.as_millis(), took_s: elapsed.as_secs_f64(), total_hits, results }))
}

/// Keep the top `k` hits and attach a highlighted snippet of their stored text.
async fn with_snippets(engine: &Arc<Engine>, result: ScoredResults, text: &str, k: usize) -> Result<(Vec<SearchHit>, usize), ApiError> {
    let total_hits = result.len();
    let k = k.clamp(1, MAX_K);
    let terms = highlight_terms_of(text);
    let engine = Arc::clone(engine);

    let hits = blocking(move || {
        let handle = engine.ensure_index()?;
        let mut hits = Vec::with_capacity(k.min(total_hits));
        for hit in result.iter().take(k) {
            let snippet = handle.stored_text(hit.id)?.and_then(|body| snippet_from_text(&body, &terms));
            hits.push(SearchHit { id: hit.id, score: hit.score, snippet });
        }
        Ok(hits)
    })
    .await?;
    Ok((hits, total_hits))
}

pub async fn doc_handler(State(state): State<AppState>, Path(id): Path<EntityId>) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = Arc::clone(&state.engine);
    match blocking(move || Ok(engine.document(id)?)).await? {
        Some(text) => Ok(Json(serde_json::json!({ "id": id, "text": text }))),
        None => Err(ApiError::NotFound(format!("no document for {id}"))),
    }
}

async fn rebuild_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let engine = Arc::clone(&state.engine);
    let handle = blocking(move || Ok(engine.rebuild_index()?)).await?;
    Ok(Json(serde_json::json!({
        "generation": handle.generation(),
        "num_docs": handle.num_docs(),
        "skipped_files": handle.meta().skipped_files,
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

/// Raw words of the positive clauses of a text query. Unparsable text highlights nothing.
fn highlight_terms_of(text: &str) -> Vec<String> {
    let Ok(parsed) = query::parse(text) else { return Vec::new() };
    parsed
        .clauses
        .iter()
        .filter(|c| c.occur != Occur::MustNot)
        .flat_map(|c| c.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .collect()
}

/// One case-insensitive alternation of every term, longest first.
fn terms_regex(terms: &[String]) -> Option<regex::Regex> {
    let mut terms: Vec<&str> = terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    if terms.is_empty() { return None; }
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    regex::RegexBuilder::new(&format!("({alternation})")).case_insensitive(true).build().ok()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn snippet_from_text(text: &str, terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let pattern = terms_regex(terms);
    // first match (case-insensitive) of any term
    let first_idx = pattern.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
    let snippet = match first_idx {
        Some(idx) => {
            let mut start = idx.saturating_sub(100);
            while !text.is_char_boundary(start) { start -= 1; }
            let mut end = (idx + 200).min(text.len());
            while !text.is_char_boundary(end) { end += 1; }
            &text[start..end]
        }
        None => {
            let end = text.char_indices().nth(200).map(|(i, _)| i).unwrap_or(text.len());
            &text[..end]
        }
    };
    Some(highlight(snippet, terms))
}

/// HTML-escaped `snippet` with every term occurrence wrapped in `<em>`, in a single pass.
fn highlight(snippet: &str, terms: &[String]) -> String {
    let Some(re) = terms_regex(terms) else { return escape_html(snippet) };
    let mut out = String::with_capacity(snippet.len() + 16);
    let mut last = 0;
    for m in re.find_iter(snippet) {
        out.push_str(&escape_html(&snippet[last..m.start()]));
        out.push_str("<em>");
        out.push_str(&escape_html(m.as_str()));
        out.push_str("</em>");
        last = m.end();
    }
    out.push_str(&escape_html(&snippet[last..]));
    out
}
