#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Scriptable tool server backing the HTTP transport tests.
#[derive(Default)]
pub struct MockState {
    pub tools: Mutex<Vec<Value>>,
    /// Answer `GET /tools` as `{"tools": [...]}` instead of a bare array.
    pub wrap_listing: AtomicBool,
    /// When set, requests without this bearer token get 401.
    pub required_token: Mutex<Option<String>>,
    pub execute_reply: Mutex<Value>,
    pub poll_replies: Mutex<VecDeque<Value>>,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub executed: Mutex<Vec<(String, Value)>>,
    pub polled: Mutex<Vec<(String, String)>>,
    pub requests: AtomicUsize,
}

impl MockState {
    pub fn set_tools(&self, ids: &[&str]) {
        *self.tools.lock().unwrap() = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "name": id.to_uppercase(),
                    "description": format!("{id} tool"),
                    "version": "1.0.0",
                    "parameters": { "type": "object" },
                    "auth_required": true
                })
            })
            .collect();
    }

    pub fn require_token(&self, token: &str) {
        *self.required_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn set_execute_reply(&self, reply: Value) {
        *self.execute_reply.lock().unwrap() = reply;
    }

    pub fn push_poll_reply(&self, reply: Value) {
        self.poll_replies.lock().unwrap().push_back(reply);
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth_headers.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Record the request and enforce the bearer token, if any.
    fn admit(&self, headers: &HeaderMap) -> Option<Response> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        self.auth_headers.lock().unwrap().push(auth.clone());

        let required = self.required_token.lock().unwrap().clone();
        match required {
            Some(token) if auth.as_deref() != Some(format!("Bearer {token}").as_str()) => {
                Some((StatusCode::UNAUTHORIZED, "missing or invalid token").into_response())
            }
            _ => None,
        }
    }
}

pub struct MockToolServer {
    pub base_url: String,
    pub state: Arc<MockState>,
}

async fn list_tools(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(denied) = state.admit(&headers) {
        return denied;
    }
    let tools = state.tools.lock().unwrap().clone();
    if state.wrap_listing.load(Ordering::SeqCst) {
        Json(json!({ "tools": tools })).into_response()
    } else {
        Json(Value::Array(tools)).into_response()
    }
}

async fn execute_tool(
    State(state): State<Arc<MockState>>,
    Path(tool_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = state.admit(&headers) {
        return denied;
    }
    let parameters = body.get("parameters").cloned().unwrap_or(Value::Null);
    state.executed.lock().unwrap().push((tool_id, parameters));
    Json(state.execute_reply.lock().unwrap().clone()).into_response()
}

async fn execution_status(
    State(state): State<Arc<MockState>>,
    Path((tool_id, execution_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = state.admit(&headers) {
        return denied;
    }
    state
        .polled
        .lock()
        .unwrap()
        .push((tool_id, execution_id));
    match state.poll_replies.lock().unwrap().pop_front() {
        Some(reply) => Json(reply).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown execution").into_response(),
    }
}

/// Start a mock tool server on an ephemeral local port.
pub async fn spawn_mock_server() -> MockToolServer {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:tool_id/execute", post(execute_tool))
        .route(
            "/tools/:tool_id/executions/:execution_id",
            get(execution_status),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockToolServer {
        base_url: format!("http://{addr}"),
        state,
    }
}

/// A local URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
