//! Mock upstream APIs served by a local axum server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub type Params = HashMap<String, String>;

/// Bind an ephemeral local port and return the listener with its base URL.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{}", addr))
}

pub fn serve(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
}

pub fn error_response(status: StatusCode) -> Response {
    (status, Json(json!({"errors": [{"msg": "mock failure"}]}))).into_response()
}

/// Counts requests and records their query strings.
#[derive(Default)]
pub struct Recorder {
    pub hits: AtomicUsize,
    pub queries: Mutex<Vec<Params>>,
}

impl Recorder {
    /// Record one request and return its 1-based sequence number.
    pub fn record(&self, params: &Params) -> usize {
        self.queries.lock().unwrap().push(params.clone());
        self.hits.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<Params> {
        self.queries.lock().unwrap().clone()
    }
}

// ============ SonarQube ============

pub const SONAR_TOKEN: &str = "tok";
/// `Basic base64("tok:")`.
pub const SONAR_BASIC_AUTH: &str = "Basic dG9rOg==";

#[derive(Default)]
pub struct SonarState {
    pub projects: Recorder,
    pub issues: Recorder,
    pub measures: Recorder,
    pub hotspots: Recorder,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == SONAR_BASIC_AUTH)
        .unwrap_or(false)
}

fn page(key: &str, records: Vec<Value>) -> Response {
    let mut body = json!({
        "paging": {"pageIndex": 1, "pageSize": 100, "total": records.len()},
    });
    body[key] = Value::Array(records);
    Json(body).into_response()
}

async fn sonar_projects(
    State(state): State<Arc<SonarState>>,
    headers: HeaderMap,
    Query(q): Query<Params>,
) -> Response {
    state.projects.record(&q);
    if !authorized(&headers) {
        return error_response(StatusCode::UNAUTHORIZED);
    }
    page(
        "components",
        vec![
            json!({"key": "alpha", "name": "Alpha", "qualifier": "TRK", "visibility": "public"}),
            json!({"key": "beta", "name": "Beta", "qualifier": "TRK", "visibility": "private"}),
        ],
    )
}

async fn sonar_issues(
    State(state): State<Arc<SonarState>>,
    Query(q): Query<Params>,
) -> Response {
    state.issues.record(&q);
    let issues = match q.get("componentKeys").map(String::as_str) {
        Some("alpha") => vec![
            json!({
                "key": "I-1", "project": "alpha", "component": "alpha:src/main.rs",
                "line": 12, "message": "Remove this unwrap", "severity": "CRITICAL",
                "type": "BUG", "status": "OPEN", "creationDate": "2025-01-01T10:00:00+0000"
            }),
            json!({
                "key": "I-2", "project": "alpha", "component": "alpha:src/lib.rs",
                "message": "Rename this", "severity": "MINOR",
                "type": "CODE_SMELL", "status": "OPEN"
            }),
        ],
        _ => vec![],
    };
    page("issues", issues)
}

async fn sonar_measures(
    State(state): State<Arc<SonarState>>,
    Query(q): Query<Params>,
) -> Response {
    state.measures.record(&q);
    match q.get("component").map(String::as_str) {
        Some("alpha") => Json(json!({
            "component": {
                "key": "alpha",
                "name": "Alpha",
                "measures": [
                    {"metric": "bugs", "value": "3"},
                    {"metric": "coverage", "value": "81.5"},
                    {"metric": "code_smells"},
                    {"metric": "alert_status", "value": "OK"}
                ]
            }
        }))
        .into_response(),
        _ => error_response(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn sonar_hotspots(
    State(state): State<Arc<SonarState>>,
    Query(q): Query<Params>,
) -> Response {
    state.hotspots.record(&q);
    let hotspots = match q.get("projectKey").map(String::as_str) {
        Some("alpha") => vec![json!({
            "key": "H-1", "project": "alpha", "component": "alpha:src/db.rs",
            "line": 40, "message": "Make sure this query is safe",
            "securityCategory": "sql-injection", "vulnerabilityProbability": "HIGH",
            "status": "TO_REVIEW", "creationDate": "2025-02-01T09:00:00+0000"
        })],
        _ => vec![],
    };
    page("hotspots", hotspots)
}

/// Two projects: `alpha` has issues, measures and a hotspot; `beta` has no
/// issues or hotspots and its measures request fails with HTTP 500.
pub async fn spawn_sonarqube() -> (String, Arc<SonarState>) {
    let state = Arc::new(SonarState::default());
    let app = Router::new()
        .route("/api/projects/search", get(sonar_projects))
        .route("/api/issues/search", get(sonar_issues))
        .route("/api/measures/component", get(sonar_measures))
        .route("/api/hotspots/search", get(sonar_hotspots))
        .with_state(state.clone());

    let (listener, base) = bind().await;
    serve(listener, app);
    (base, state)
}
