//! In-process stand-in for the Telegram Bot API
#![allow(dead_code)]

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw";

pub struct ApiState {
    token: String,
    revoked: AtomicBool,
    delay_ms: AtomicU64,
    requests: AtomicU64,
    sent: Mutex<Vec<(i64, String)>>,
}

pub struct FakeBotApi {
    pub url: String,
    state: Arc<ApiState>,
}

impl FakeBotApi {
    pub async fn start() -> Self {
        let state = Arc::new(ApiState {
            token: TEST_TOKEN.to_string(),
            revoked: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        });

        let app = axum::Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_revoked(&self, revoked: bool) {
        self.state.revoked.store(revoked, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// `(chat_id, text)` of every accepted `sendMessage` call
    pub fn sent_messages(&self) -> Vec<(i64, String)> {
        self.state.sent.lock().unwrap().clone()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })),
    )
        .into_response()
}

async fn handle(State(state): State<Arc<ApiState>>, uri: Uri, body: Bytes) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let prefix = format!("/bot{}/", state.token);
    let Some(method) = uri.path().strip_prefix(&prefix) else {
        return unauthorized();
    };
    if state.revoked.load(Ordering::SeqCst) {
        return unauthorized();
    }

    // Bot API method names are case-insensitive
    match method.to_ascii_lowercase().as_str() {
        "getme" => Json(serde_json::json!({
            "ok": true,
            "result": {
                "id": 123456789,
                "is_bot": true,
                "first_name": "Warden Test",
                "username": "warden_test_bot"
            }
        }))
        .into_response(),
        "sendmessage" => send_message(&state, &body),
        _ => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error_code": 404,
                "description": "Not Found"
            })),
        )
            .into_response(),
    }
}

fn send_message(state: &ApiState, body: &[u8]) -> Response {
    let request: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
    let (Some(chat_id), Some(text)) = (request["chat_id"].as_i64(), request["text"].as_str())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat_id and text are required"
            })),
        )
            .into_response();
    };

    let message_id = {
        let mut sent = state.sent.lock().unwrap();
        sent.push((chat_id, text.to_string()));
        sent.len() as i64
    };

    Json(serde_json::json!({
        "ok": true,
        "result": {
            "message_id": message_id,
            "date": 1700000000,
            "chat": {
                "id": chat_id,
                "type": "private",
                "first_name": "Operator"
            },
            "from": {
                "id": 123456789,
                "is_bot": true,
                "first_name": "Warden Test",
                "username": "warden_test_bot"
            },
            "text": text
        }
    }))
    .into_response()
}

/// A local address with nothing listening on it
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
