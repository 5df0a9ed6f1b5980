//! HTTP server for the WhatsApp webhook.
//!
//! Answers Meta's subscription handshake, turns flow replies posted to the
//! webhook into bookings, and serves the booking dataset for download.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use crate::config::{Config, WebhookConfig};
use crate::errors::{BookhookError, BookhookResult};
use crate::flow::{Booking, FlowSchema};
use crate::store::{BookingStore, StoreError};
use crate::whatsapp::{self, DomainEvent, IncomingMessage};

type HmacSha256 = Hmac<Sha256>;

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

/// Body Meta expects back for an accepted delivery.
const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Header carrying `sha256=<hex>` of the raw body, keyed by the app secret.
const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    webhook: Arc<WebhookConfig>,
    schema: Arc<FlowSchema>,
    store: Arc<BookingStore>,
}

impl GatewayState {
    pub fn new(webhook: WebhookConfig, schema: FlowSchema, store: Arc<BookingStore>) -> Self {
        Self {
            webhook: Arc::new(webhook),
            schema: Arc::new(schema),
            store,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.webhook.clone(),
            FlowSchema::from_config(&config.flow),
            Arc::new(BookingStore::new(config.store.dataset_path())),
        )
    }

    pub fn store(&self) -> &Arc<BookingStore> {
        &self.store
    }
}

/// Query string of Meta's subscription handshake.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// What one webhook delivery produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub events: usize,
    pub bookings: usize,
}

/// Build the HTTP router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/webhook", get(verify_handler).post(receive_handler))
        .route("/download-excel", get(download_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// GET /api/health: liveness and version.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Constant-time token compare. An unset expected token never matches.
pub(crate) fn verify_token_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let result = mac.finalize();
    let expected = hex::encode(result.into_bytes());

    // Meta sends "sha256=<hex>"; accept raw hex too
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// GET /webhook: subscription handshake.
async fn verify_handler(
    State(state): State<GatewayState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let mode = query.mode.as_deref().unwrap_or_default();
    let token = query.verify_token.as_deref().unwrap_or_default();

    if mode == "subscribe" && verify_token_matches(&state.webhook.verify_token, token) {
        info!("webhook verified");
        return (StatusCode::OK, query.challenge.unwrap_or_default()).into_response();
    }

    warn!("webhook verification rejected: mode={:?}", mode);
    StatusCode::FORBIDDEN.into_response()
}

/// POST /webhook: delivery of messages and status updates.
async fn receive_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("webhook: payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if let Err(e) = check_signature(&state.webhook, &headers, &body) {
        warn!("webhook: {}", e);
        return e.status_code().into_response();
    }

    match process_webhook(&state, &body).await {
        Ok(summary) => {
            debug!(
                "webhook: processed {} event(s), saved {} booking(s)",
                summary.events, summary.bookings
            );
            (StatusCode::OK, EVENT_RECEIVED).into_response()
        }
        Err(e) => {
            match &e {
                BookhookError::Validation(_) | BookhookError::MalformedPayload(_) => {
                    warn!("webhook: rejected payload: {}", e);
                }
                _ => error!("webhook: processing failed: {}", e),
            }
            e.status_code().into_response()
        }
    }
}

/// Enforce `X-Hub-Signature-256` when an app secret is configured.
fn check_signature(
    webhook: &WebhookConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> BookhookResult<()> {
    if webhook.app_secret.is_empty() {
        return Ok(());
    }
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return Err(BookhookError::Auth("missing signature header".into()));
    };
    if !validate_webhook_signature(&webhook.app_secret, signature, body) {
        return Err(BookhookError::Auth("invalid signature".into()));
    }
    Ok(())
}

/// Run one delivery through normalization, extraction and the store.
///
/// Every booking is persisted before this returns; the first store failure
/// aborts the delivery so Meta retries it. Bookings appended earlier in the
/// same delivery stay saved, and rows are not deduplicated, so a retried
/// delivery records them again.
pub async fn process_webhook(
    state: &GatewayState,
    body: &[u8],
) -> BookhookResult<ReceiveSummary> {
    let envelope = whatsapp::decode_envelope(body)?;
    let events = whatsapp::normalize(&envelope);
    debug!(
        "webhook: object={} entries={} events={}",
        envelope.object,
        envelope.entry.len(),
        events.len()
    );

    let mut summary = ReceiveSummary {
        events: events.len(),
        bookings: 0,
    };

    for event in events {
        match event {
            DomainEvent::MessageReceived {
                account_id,
                message,
            } => {
                debug!(
                    "message from {} on account {}: type={:?}",
                    message.from, account_id, message.kind
                );
                if let Some(booking) = booking_from_message(&message, &state.schema) {
                    append_booking(&state.store, booking).await?;
                    summary.bookings += 1;
                }
            }
            DomainEvent::TemplateStatusUpdate { account_id, update } => {
                info!(
                    "template status update on account {}: template={:?} event={:?} reason={:?}",
                    account_id, update.template_name, update.event, update.reason
                );
            }
            DomainEvent::DeliveryStatusUpdate { status, .. } => {
                debug!(
                    "message status update: to={} status={}",
                    status.recipient_id, status.status
                );
            }
        }
    }

    Ok(summary)
}

fn booking_from_message(message: &IncomingMessage, schema: &FlowSchema) -> Option<Booking> {
    let reply = message.form_reply()?;
    debug!("flow reply from {}: name={:?}", message.from, reply.name);
    let booking = Booking::from_form_reply(&message.from, reply.response_json.as_ref(), schema);
    if booking.is_none() {
        warn!("flow reply without sender phone, skipping");
    }
    booking
}

async fn append_booking(store: &Arc<BookingStore>, booking: Booking) -> BookhookResult<()> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.append(&booking))
        .await
        .map_err(|e| BookhookError::Internal(anyhow::anyhow!("append task failed: {}", e)))??;
    Ok(())
}

/// GET /download-excel: the whole dataset as a file download.
async fn download_handler(State(state): State<GatewayState>) -> Response {
    let store = Arc::clone(&state.store);
    let exported = tokio::task::spawn_blocking(move || store.export_all()).await;

    let bytes = match exported {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(StoreError::NotFound(path))) => {
            debug!("download: no dataset at {}", path.display());
            return StatusCode::NOT_FOUND.into_response();
        }
        Ok(Err(e)) => {
            error!("download: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(e) => {
            error!("download: export task failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let filename = state
        .store
        .path()
        .file_name()
        .map_or_else(|| "bookings.xlsx".to_string(), |n| n.to_string_lossy().into_owned());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        crate::utils::safe_filename(&filename)
    );

    (
        [
            (header::CONTENT_TYPE, crate::store::CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

/// Start the HTTP server. Returns the join handle of the serving task.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("webhook server listening on http://{}/webhook", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    Ok(handle)
}
