//! Booking extraction from WhatsApp Flow form replies.
//!
//! The keys read here are a contract with whoever designs the flow in the
//! WhatsApp Manager; they come from [`FlowSchema`] rather than being
//! discovered from the payload.

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::FlowConfig;

/// Service-group keys read when no schema is configured.
pub const DEFAULT_SERVICE_KEYS: &[&str] = &["services"];

/// Time slot key read when no schema is configured.
pub const DEFAULT_TIME_SLOT_KEY: &str = "time_slot";

/// Decoded form answers: field key to scalar or list of selected options.
pub type FormResponse = Map<String, Value>;

/// Ordered list of form keys the extractor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSchema {
    service_keys: Vec<String>,
    time_slot_key: String,
}

impl FlowSchema {
    pub fn new<I, S>(service_keys: I, time_slot_key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service_keys: service_keys.into_iter().map(Into::into).collect(),
            time_slot_key: time_slot_key.into(),
        }
    }

    pub fn from_config(config: &FlowConfig) -> Self {
        Self::new(config.service_keys.iter().cloned(), config.time_slot_key.clone())
    }

    pub fn service_keys(&self) -> &[String] {
        &self.service_keys
    }

    pub fn time_slot_key(&self) -> &str {
        &self.time_slot_key
    }
}

impl Default for FlowSchema {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_KEYS.iter().copied(), DEFAULT_TIME_SLOT_KEY)
    }
}

/// Fields extracted from a form, before the sender's phone is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFields {
    pub services: Vec<String>,
    pub time_slot: String,
}

/// A booking request from one WhatsApp user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub phone: String,
    pub services: Vec<String>,
    pub time_slot: String,
}

impl Booking {
    /// Attach extracted fields to a sender. Returns `None` for an empty phone:
    /// a booking is never recorded against an unknown sender.
    pub fn new(phone: impl Into<String>, fields: BookingFields) -> Option<Self> {
        let phone = phone.into();
        if phone.trim().is_empty() {
            return None;
        }
        Some(Self {
            phone,
            services: fields.services,
            time_slot: fields.time_slot,
        })
    }

    /// Build a booking from a flow reply's `response_json`.
    ///
    /// The form payload is decoded leniently: anything unparseable produces a
    /// booking carrying only the phone.
    pub fn from_form_reply(
        phone: &str,
        response_json: Option<&Value>,
        schema: &FlowSchema,
    ) -> Option<Self> {
        let form = match response_json {
            Some(Value::String(raw)) => parse_form_response(Some(raw)),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                warn!("flow: response_json is not a string or object: {}", other);
                FormResponse::new()
            }
            None => parse_form_response(None),
        };
        Self::new(phone, extract(&form, schema))
    }
}

/// Parse the string-encoded form answers. Never fails: a missing field,
/// malformed JSON or a non-object document all yield an empty form.
pub fn parse_form_response(raw: Option<&str>) -> FormResponse {
    let Some(raw) = raw else {
        warn!("flow: form reply has no response_json");
        return FormResponse::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("flow: response_json is not an object: {}", other);
            FormResponse::new()
        }
        Err(e) => {
            warn!("flow: failed to parse response_json: {}", e);
            FormResponse::new()
        }
    }
}

/// Extract services and time slot from decoded form answers.
///
/// Services are the concatenation of every configured service key's
/// selections, in schema order. The time slot is the first selection under
/// the time slot key.
pub fn extract(form: &FormResponse, schema: &FlowSchema) -> BookingFields {
    let services = schema
        .service_keys
        .iter()
        .filter_map(|key| form.get(key))
        .flat_map(selections)
        .collect();

    let time_slot = form
        .get(&schema.time_slot_key)
        .and_then(|value| match value {
            Value::Array(items) => items.first().and_then(scalar_text),
            other => scalar_text(other),
        })
        .unwrap_or_default();

    BookingFields {
        services,
        time_slot,
    }
}

/// Selected options under one key; a lone scalar counts as one selection.
fn selections(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
