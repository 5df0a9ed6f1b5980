//! WhatsApp Cloud API webhook payloads.
//!
//! Decodes the `object → entry → changes → value` envelope Meta posts to the
//! webhook and flattens it into [`DomainEvent`]s. Decoding happens in two
//! stages: the envelope structure is decoded here, while the string-encoded
//! form response carried by flow replies is left raw for the lenient decoder
//! in [`crate::flow`]. A message or status that does not decode is skipped on
//! its own and never takes its siblings down with it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{BookhookError, BookhookResult};

/// `Change.field` tag for message template review results.
pub const TEMPLATE_STATUS_FIELD: &str = "message_template_status_update";

/// Treat an explicit JSON `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode each element on its own, dropping the ones that do not fit `T`.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("whatsapp: skipping undecodable item: {}", e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Producing object type, `whatsapp_business_account` for Cloud API hooks.
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entry: Vec<Entry>,
}

/// One business account's batch of changes.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default, deserialize_with = "null_as_default")]
    pub field: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: ChangeValue,
}

/// Payload of a change. Which fields are populated depends on `Change.field`;
/// everything is optional and absent sequences decode as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub messages: Vec<IncomingMessage>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub statuses: Vec<DeliveryStatus>,
    // message_template_status_update
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub message_template_id: Option<Value>,
    #[serde(default)]
    pub message_template_name: Option<String>,
    #[serde(default)]
    pub message_template_language: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// Sender phone number (wa_id).
    #[serde(default, deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
}

impl IncomingMessage {
    /// The submitted form when this message is an interactive flow reply.
    pub fn form_reply(&self) -> Option<&FormReply> {
        if self.kind != MessageKind::Interactive {
            return None;
        }
        match self.interactive.as_ref()? {
            Interactive::NfmReply { nfm_reply } => Some(nfm_reply),
            Interactive::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Interactive,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// Interactive reply payload, selected by its `type` field.
///
/// A missing or unknown `type` is `Other`. An `nfm_reply` whose body does not
/// decode still counts as a flow reply, with every form field absent.
#[derive(Debug, Clone)]
pub enum Interactive {
    /// Flow ("native flow message") reply.
    NfmReply { nfm_reply: FormReply },
    /// Button/list replies and anything newer; not handled.
    Other,
}

impl<'de> Deserialize<'de> for Interactive {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.get("type").and_then(Value::as_str) != Some("nfm_reply") {
            return Ok(Self::Other);
        }

        let nfm_reply = match value.get("nfm_reply") {
            None | Some(Value::Null) => FormReply::default(),
            Some(reply) => serde_json::from_value(reply.clone()).unwrap_or_else(|e| {
                warn!("whatsapp: undecodable nfm_reply body: {}", e);
                FormReply::default()
            }),
        };
        Ok(Self::NfmReply { nfm_reply })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormReply {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Form answers. The platform sends a JSON object encoded as a string.
    #[serde(default)]
    pub response_json: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recipient_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: StatusKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Sent,
    Delivered,
    Read,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of a message template review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateStatus {
    pub event: Option<String>,
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    pub language: Option<String>,
    pub reason: Option<String>,
}

impl From<&ChangeValue> for TemplateStatus {
    fn from(value: &ChangeValue) -> Self {
        let template_id = value.message_template_id.as_ref().and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self {
            event: value.event.clone(),
            template_id,
            template_name: value.message_template_name.clone(),
            language: value.message_template_language.clone(),
            reason: value.reason.clone(),
        }
    }
}

/// Typed event extracted from a webhook envelope.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    MessageReceived {
        account_id: String,
        message: IncomingMessage,
    },
    TemplateStatusUpdate {
        account_id: String,
        update: TemplateStatus,
    },
    DeliveryStatusUpdate {
        account_id: String,
        status: DeliveryStatus,
    },
}

/// Decode a raw webhook body.
///
/// A body that is not JSON is `MalformedPayload`. A JSON body without a
/// non-empty `object` discriminator is not ours and yields `Validation`. A
/// discriminated body whose `entry`/`changes` structure cannot be read at all
/// is an `Internal` failure.
pub fn decode_envelope(body: &[u8]) -> BookhookResult<WebhookEnvelope> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| BookhookError::MalformedPayload(format!("invalid JSON: {}", e)))?;

    match raw.get("object") {
        Some(Value::String(object)) if !object.is_empty() => {}
        _ => {
            return Err(BookhookError::Validation(
                "payload has no object discriminator".into(),
            ));
        }
    }

    serde_json::from_value(raw).map_err(|e| {
        BookhookError::Internal(anyhow::anyhow!("unexpected envelope shape: {}", e))
    })
}

/// Flatten an envelope into domain events, in entry then change order.
///
/// Within one change the checks are independent: a change carrying both
/// messages and statuses yields events for each. Only the first message of a
/// change is surfaced.
pub fn normalize(envelope: &WebhookEnvelope) -> Vec<DomainEvent> {
    let mut events = Vec::new();

    for entry in &envelope.entry {
        for change in &entry.changes {
            let value = &change.value;

            if let Some(message) = value.messages.first() {
                if value.messages.len() > 1 {
                    debug!(
                        "whatsapp: change {} carries {} messages, only the first is processed",
                        change.field,
                        value.messages.len()
                    );
                }
                events.push(DomainEvent::MessageReceived {
                    account_id: entry.id.clone(),
                    message: message.clone(),
                });
            }

            if change.field == TEMPLATE_STATUS_FIELD {
                events.push(DomainEvent::TemplateStatusUpdate {
                    account_id: entry.id.clone(),
                    update: TemplateStatus::from(value),
                });
            }

            for status in &value.statuses {
                events.push(DomainEvent::DeliveryStatusUpdate {
                    account_id: entry.id.clone(),
                    status: status.clone(),
                });
            }
        }
    }

    events
}

#[cfg(test)]
mod tests;
