use super::schema::Config;
use tracing::{debug, warn};

macro_rules! define_env_overrides {
    ($( $env:literal => $($path:ident).+ );* $(;)?) => {
        /// Environment variables that override string config fields.
        pub const ENV_OVERRIDES: &[&str] = &[$($env),*];

        /// Apply environment variable overrides.
        ///
        /// Any listed env var that is set and non-empty will overwrite the
        /// corresponding config field, allowing secrets to be injected without
        /// touching the config file (useful for containers and CI).
        pub fn apply_env_overrides(config: &mut Config) {
            apply_overrides_from(config, |name| std::env::var(name).ok());
        }

        fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
            $(
                if let Some(val) = lookup($env).filter(|v| !v.is_empty()) {
                    debug!("config: {} set from environment", $env);
                    config.$($path).+ = val;
                }
            )*
            if let Some(val) = lookup("PORT").filter(|v| !v.is_empty()) {
                match val.trim().parse::<u16>() {
                    Ok(port) => config.gateway.port = port,
                    Err(e) => warn!("ignoring PORT={:?}: {}", val, e),
                }
            }
        }
    };
}

define_env_overrides! {
    "VERIFY_TOKEN"  => webhook.verify_token;
    "APP_SECRET"    => webhook.app_secret;
    "HOST"          => gateway.host;
    "BOOKINGS_PATH" => store.path;
}
