//! Client configuration
//!
//! Everything the data module needs is passed in explicitly through
//! [`ClientConfig`]; nothing is read from ambient globals after construction.
//!
//! # Environment variables
//!
//! | Variable | Default | Notes |
//! |----------|---------|-------|
//! | SUPABASE_URL | - | required, project base URL |
//! | SUPABASE_ANON_KEY | - | required, public API key |
//! | SUPABASE_ACCESS_TOKEN | - | user JWT, falls back to the anon key |
//! | SUPABASE_SCHEMA | public | |
//! | REQUEST_TIMEOUT_SECS | 30 | REST request timeout |
//! | REALTIME_CHANNEL | safety_zones_changes | change-notification channel name |

use std::time::Duration;

use reqwest::Url;

use crate::error::{DataAccessError, DataResult};
use crate::repository::ZONES_TABLE;

/// Default change-notification channel name
pub const DEFAULT_CHANNEL: &str = "safety_zones_changes";

/// Realtime (change-notification) settings
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Channel name; the joined topic is `realtime:<channel>`
    pub channel: String,
    /// Tables whose changes trigger a refetch
    pub tables: Vec<String>,
    /// Heartbeat interval (must stay under the server's 60s idle timeout)
    pub heartbeat_interval: Duration,
    /// Connect + join timeout
    pub connect_timeout: Duration,
    /// Whether to reconnect after a connection loss
    pub auto_reconnect: bool,
    /// First reconnect delay
    pub reconnect_delay: Duration,
    /// Upper bound for the exponential backoff
    pub max_reconnect_delay: Duration,
    /// Consecutive attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            tables: vec![ZONES_TABLE.to_string()],
            heartbeat_interval: Duration::from_secs(25),
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
        }
    }
}

impl RealtimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel name
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Watch one more table on the same channel
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
        self
    }

    /// Set the heartbeat interval
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set automatic reconnection
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the backoff bounds
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    /// Set the maximum consecutive reconnect attempts (0 = unlimited)
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Backoff delay before reconnect attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }
}

/// Client configuration for connecting to the remote store
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Project base URL (e.g., "https://xyzcompany.supabase.co")
    pub base_url: String,

    /// Public API key, sent as `apikey` on every request
    pub anon_key: String,

    /// User access token; the anon key is used as bearer when absent
    pub access_token: Option<String>,

    /// Database schema exposed by the REST layer
    pub schema: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Change-notification settings
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: None,
            schema: "public".to_string(),
            timeout: 30,
            realtime: RealtimeConfig::default(),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> DataResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> DataResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DataAccessError::Config(format!("{key} is not set")))
        };

        let mut config = Self::new(required("SUPABASE_URL")?, required("SUPABASE_ANON_KEY")?);

        if let Some(token) = lookup("SUPABASE_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
            config.access_token = Some(token);
        }
        if let Some(schema) = lookup("SUPABASE_SCHEMA").filter(|s| !s.is_empty()) {
            config.schema = schema;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            config.timeout = raw.parse().map_err(|_| {
                DataAccessError::Config(format!("REQUEST_TIMEOUT_SECS is not a number: {raw}"))
            })?;
        }
        if let Some(channel) = lookup("REALTIME_CHANNEL").filter(|c| !c.is_empty()) {
            config.realtime.channel = channel;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the user access token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the realtime settings
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Token sent as `Authorization: Bearer`
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    /// Check that the base URL is usable for both REST and realtime and
    /// that requests can actually complete
    pub fn validate(&self) -> DataResult<()> {
        if self.timeout == 0 {
            return Err(DataAccessError::Config(
                "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        self.realtime_url().map(|_| ())
    }

    /// Websocket endpoint of the realtime service
    pub fn realtime_url(&self) -> DataResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DataAccessError::Config(format!("Invalid base URL: {e}")))?;

        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(DataAccessError::Config(format!(
                    "Unsupported URL scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| DataAccessError::Config("Cannot derive websocket URL".to_string()))?;

        url.set_path(&format!(
            "{}/realtime/v1/websocket",
            url.path().trim_end_matches('/')
        ));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("https://demo.supabase.co/", "anon");
        assert_eq!(config.base_url, "https://demo.supabase.co");
        assert_eq!(config.timeout, 30);
        assert_eq!(config.schema, "public");
        assert_eq!(config.bearer_token(), "anon");
        assert_eq!(config.realtime.channel, "safety_zones_changes");
        assert_eq!(config.realtime.tables, vec!["safety_zones".to_string()]);
    }

    #[test]
    fn test_access_token_wins_over_anon_key() {
        let config = ClientConfig::new("https://demo.supabase.co", "anon").with_access_token("jwt");
        assert_eq!(config.bearer_token(), "jwt");
    }

    #[test]
    fn test_realtime_url() {
        let config = ClientConfig::new("https://demo.supabase.co", "key123");
        assert_eq!(
            config.realtime_url().unwrap().as_str(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=key123&vsn=1.0.0"
        );

        let local = ClientConfig::new("http://127.0.0.1:54321", "k");
        assert_eq!(
            local.realtime_url().unwrap().as_str(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );

        let bad = ClientConfig::new("ftp://demo", "k");
        assert!(matches!(bad.realtime_url(), Err(DataAccessError::Config(_))));
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://demo.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("REALTIME_CHANNEL", "zones"),
        ]))
        .unwrap();

        assert_eq!(config.timeout, 5);
        assert_eq!(config.realtime.channel, "zones");
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let err = ClientConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.co")]))
            .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));

        let err = ClientConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://x.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DataAccessError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://x.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DataAccessError::Config(_)));
        assert!(err.to_string().contains("REQUEST_TIMEOUT_SECS"));

        let built = ClientConfig::new("https://x.co", "anon").with_timeout(0);
        assert!(matches!(built.validate(), Err(DataAccessError::Config(_))));
        assert!(built.with_timeout(1).validate().is_ok());
    }

    #[test]
    fn test_backoff_is_capped() {
        let realtime = RealtimeConfig::new()
            .with_reconnect_delay(Duration::from_millis(500), Duration::from_secs(3));
        assert_eq!(realtime.backoff(1), Duration::from_millis(500));
        assert_eq!(realtime.backoff(2), Duration::from_secs(1));
        assert_eq!(realtime.backoff(3), Duration::from_secs(2));
        assert_eq!(realtime.backoff(4), Duration::from_secs(3));
        assert_eq!(realtime.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn test_with_table_deduplicates() {
        let realtime = RealtimeConfig::new()
            .with_table("safety_reviews")
            .with_table("safety_zones");
        assert_eq!(realtime.tables, vec!["safety_zones", "safety_reviews"]);
    }
}
