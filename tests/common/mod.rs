// Shared test helpers; not every test binary uses every item.
#![allow(unused)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use bookhook::config::WebhookConfig;
use bookhook::flow::FlowSchema;
use bookhook::gateway::{GatewayState, build_router};
use bookhook::store::{BookingRow, BookingStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const VERIFY_TOKEN: &str = "integration-token";

pub struct TestServer {
    pub dir: TempDir,
    pub store: Arc<BookingStore>,
    pub app: Router,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_schema(FlowSchema::default())
    }

    pub fn with_schema(schema: FlowSchema) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(BookingStore::new(dir.path().join("bookings.xlsx")));
        let webhook = WebhookConfig {
            verify_token: VERIFY_TOKEN.to_string(),
            app_secret: String::new(),
        };
        let app = build_router(GatewayState::new(webhook, schema, Arc::clone(&store)));
        Self { dir, store, app }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub async fn post_json(&self, payload: &Value) -> Response<Body> {
        let req = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap();
        self.app.clone().oneshot(req).await.unwrap()
    }
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Decode a `/download-excel` response body through a scratch file.
pub async fn decode_download(server: &TestServer, resp: Response<Body>) -> Vec<BookingRow> {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .unwrap();
    let path = server.dir.path().join("downloaded.xlsx");
    std::fs::write(&path, &bytes).unwrap();
    BookingStore::new(&path).load().unwrap()
}

/// A flow reply message from `phone` carrying `form` as its string-encoded
/// `response_json`.
pub fn flow_reply(phone: &str, form: &Value) -> Value {
    json!({
        "from": phone,
        "id": format!("wamid.{phone}"),
        "timestamp": "1717171717",
        "type": "interactive",
        "interactive": {
            "type": "nfm_reply",
            "nfm_reply": {
                "name": "flow",
                "body": "Sent",
                "response_json": form.to_string()
            }
        }
    })
}

/// Wrap `changes` in a single-entry business account envelope.
pub fn envelope(changes: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{ "id": "WABA-1", "changes": changes }]
    })
}

pub fn messages_change(messages: Vec<Value>) -> Value {
    json!({ "field": "messages", "value": { "messages": messages } })
}
