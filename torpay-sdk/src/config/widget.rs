//! Widget configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::ConfigurationError;

/// Header carrying the merchant API key.
pub const DEFAULT_API_KEY_HEADER: &str = "X-Torpay-Api-Key";

/// Interval between two invoice status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Period of the expiry countdown.
pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Lifetime assumed for invoices whose response carries no expiry.
pub const DEFAULT_INVOICE_TTL: Duration = Duration::from_secs(15 * 60);

/// Delay between a confirmed payment and the modal closing itself
/// (success screen after 0.8 s, then 2.5 s before closing).
pub const DEFAULT_AUTO_CLOSE_DELAY: Duration = Duration::from_millis(3_300);

/// Root configuration of the widget, as passed by the host page.
///
/// Durations are expressed in milliseconds on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Merchant API key. Required unless `demo` is set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Root URL of the payment API (e.g. `https://pay.example.com`).
    /// A trailing `/` is ignored. Required unless `demo` is set.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default = "default_poll_interval", with = "millis")]
    pub poll_interval: Duration,

    #[serde(default = "default_countdown_tick", with = "millis")]
    pub countdown_tick: Duration,

    #[serde(default = "default_invoice_ttl", with = "millis")]
    pub invoice_ttl: Duration,

    #[serde(default = "default_auto_close_delay", with = "millis")]
    pub auto_close_delay: Duration,

    /// Serve invoices from the offline demo service instead of the API.
    #[serde(default)]
    pub demo: bool,
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_owned()
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_countdown_tick() -> Duration {
    DEFAULT_COUNTDOWN_TICK
}

fn default_invoice_ttl() -> Duration {
    DEFAULT_INVOICE_TTL
}

fn default_auto_close_delay() -> Duration {
    DEFAULT_AUTO_CLOSE_DELAY
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            api_key_header: default_api_key_header(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            countdown_tick: DEFAULT_COUNTDOWN_TICK,
            invoice_ttl: DEFAULT_INVOICE_TTL,
            auto_close_delay: DEFAULT_AUTO_CLOSE_DELAY,
            demo: false,
        }
    }
}

/// Validated location and credentials of the payment API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: Url,
    pub api_key: String,
    pub api_key_header: String,
}

impl WidgetConfig {
    /// Configuration talking to the API at `base_url` with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Configuration for the offline demo service.
    pub fn demo() -> Self {
        Self {
            demo: true,
            ..Self::default()
        }
    }

    /// Check every option once.
    ///
    /// The endpoint is only required when the widget talks to the real API.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_timings()?;
        if !self.demo {
            self.endpoint()?;
        }
        Ok(())
    }

    /// Check the timer options only, for hosts that bring their own
    /// invoice service.
    pub fn validate_timings(&self) -> Result<(), ConfigurationError> {
        let timings = [
            ("pollInterval", self.poll_interval),
            ("countdownTick", self.countdown_tick),
            ("invoiceTtl", self.invoice_ttl),
        ];
        for (name, value) in timings {
            if value.is_zero() {
                return Err(ConfigurationError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    /// Resolve the API endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigurationError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigurationError::MissingApiKey)?;

        let base_url = self
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or(ConfigurationError::MissingBaseUrl)?;

        let header = self.api_key_header.trim();
        let header_valid = !header.is_empty()
            && header
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !header_valid {
            return Err(ConfigurationError::InvalidApiKeyHeader(
                self.api_key_header.clone(),
            ));
        }

        Ok(Endpoint {
            base_url: Url::parse(base_url)?,
            api_key: api_key.to_owned(),
            api_key_header: header.to_owned(),
        })
    }
}

/// Serialize a [`Duration`] as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
