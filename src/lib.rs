#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// format!("{}", x) style is used throughout
#![allow(clippy::uninlined_format_args)]
// store::StoreError, config::schema::FlowConfig
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod errors;
pub mod flow;
pub mod gateway;
pub mod store;
pub(crate) mod utils;
pub mod whatsapp;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    /// Wrapper around `gateway::validate_webhook_signature` for fuzz targets.
    pub fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
        crate::gateway::validate_webhook_signature(secret, signature, body)
    }

    /// Decode a webhook body and extract bookings the way the server does,
    /// without touching the store.
    pub fn extract_bookings(body: &[u8]) -> Vec<crate::flow::Booking> {
        let Ok(envelope) = crate::whatsapp::decode_envelope(body) else {
            return Vec::new();
        };
        let schema = crate::flow::FlowSchema::default();
        crate::whatsapp::normalize(&envelope)
            .into_iter()
            .filter_map(|event| match event {
                crate::whatsapp::DomainEvent::MessageReceived { message, .. } => {
                    let reply = message.form_reply()?;
                    crate::flow::Booking::from_form_reply(
                        &message.from,
                        reply.response_json.as_ref(),
                        &schema,
                    )
                }
                _ => None,
            })
            .collect()
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
