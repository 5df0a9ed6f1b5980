use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::errors::BookhookError;
use crate::flow::{DEFAULT_SERVICE_KEYS, DEFAULT_TIME_SLOT_KEY};

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`: printed normally via `&self.field_name`
/// - `redact(field_name)`: `String` field, shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Secrets shared with the Meta app dashboard.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Token echoed by Meta in `hub.verify_token` during subscription.
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    /// App secret for `X-Hub-Signature-256`. Empty disables signature checks.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
}

redact_debug!(WebhookConfig, redact(verify_token), redact(app_secret),);

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

fn default_store_path() -> String {
    "bookings.xlsx".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Dataset file. `~` expands to the home directory.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    pub fn dataset_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

fn default_service_keys() -> Vec<String> {
    DEFAULT_SERVICE_KEYS.iter().map(ToString::to_string).collect()
}

fn default_time_slot_key() -> String {
    DEFAULT_TIME_SLOT_KEY.to_string()
}

/// Form keys defined by the WhatsApp Flow that collects bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Keys whose selections make up the booked services, in output order.
    #[serde(default = "default_service_keys", rename = "serviceKeys")]
    pub service_keys: Vec<String>,
    #[serde(default = "default_time_slot_key", rename = "timeSlotKey")]
    pub time_slot_key: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            service_keys: default_service_keys(),
            time_slot_key: default_time_slot_key(),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub flow: FlowConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), BookhookError> {
        self.validate_gateway()?;
        self.validate_store()?;
        self.validate_flow()?;

        if self.webhook.verify_token.is_empty() {
            warn!("webhook.verifyToken is empty, webhook verification requests will be rejected");
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), BookhookError> {
        if self.gateway.port == 0 {
            return Err(BookhookError::Config("gateway.port must be > 0".into()));
        }
        if self.gateway.host.trim().is_empty() {
            return Err(BookhookError::Config("gateway.host must not be empty".into()));
        }
        if self.gateway.port < 1024 {
            warn!(
                "gateway.port {} is a privileged port (< 1024), may require elevated permissions",
                self.gateway.port
            );
        }
        Ok(())
    }

    fn validate_store(&self) -> Result<(), BookhookError> {
        if self.store.path.trim().is_empty() {
            return Err(BookhookError::Config("store.path must not be empty".into()));
        }
        Ok(())
    }

    fn validate_flow(&self) -> Result<(), BookhookError> {
        let f = &self.flow;
        if f.service_keys.is_empty() {
            return Err(BookhookError::Config(
                "flow.serviceKeys must list at least one key".into(),
            ));
        }
        if let Some(i) = f.service_keys.iter().position(|k| k.trim().is_empty()) {
            return Err(BookhookError::Config(format!(
                "flow.serviceKeys[{}] must not be empty",
                i
            )));
        }
        if f.time_slot_key.trim().is_empty() {
            return Err(BookhookError::Config(
                "flow.timeSlotKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}
