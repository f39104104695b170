use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A registered webhook source: one VK community and its credentials.
///
/// A `Community` describes *who* the gateway serves and *how* it
/// authenticates. It is a pure configuration object with no internal state.
///
/// Communities must be registered with the gateway at construction time
/// and are immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Community (group) identifier, as sent in the callback `group_id` field.
    pub id: CommunityId,

    /// Community access token used for outbound API calls.
    pub access_token: String,

    /// Pre-provisioned confirmation string echoed during the server
    /// confirmation handshake.
    pub confirmation_code: String,

    /// Optional shared secret. When set to a non-empty value, inbound
    /// callbacks must carry an exactly matching `secret` field.
    pub secret_key: Option<String>,
}

impl Community {
    /// Create a new community with no secret key configured.
    pub fn new(
        id: impl Into<CommunityId>,
        access_token: impl Into<String>,
        confirmation_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            access_token: access_token.into(),
            confirmation_code: confirmation_code.into(),
            secret_key: None,
        }
    }

    /// Require inbound callbacks to carry this secret.
    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }
}

/// Unique identifier for a community.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of community IDs with other numeric identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunityId(pub i64);

impl From<i64> for CommunityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque token pairing a queued call with its eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh 128-bit hex identifier.
    pub(crate) fn generate() -> Self {
        Self(format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Raw inbound callback body, as delivered by the platform.
///
/// Deserialization is lenient: unknown fields are ignored and the event
/// payload is kept opaque. Routing only ever needs the type tag and the
/// community identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    /// Declared event type, e.g. `"message_new"` or `"confirmation"`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Community the event belongs to.
    pub group_id: CommunityId,

    /// Opaque event payload.
    #[serde(default)]
    pub object: Value,

    /// Shared secret echoed by the platform, when configured.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Ordered parameter map for an API call.
pub type Params = serde_json::Map<String, Value>;

/// Build a parameter map from a `serde_json::json!` object literal.
///
/// Non-object values yield an empty map.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL API methods are appended to.
    pub api_base_url: String,

    /// Protocol version injected into every call unless overridden.
    pub api_version: String,

    /// How often the pending queue is flushed into one `execute` call.
    pub flush_interval: Duration,

    /// Maximum number of calls drained into one batch.
    pub batch_size: usize,

    /// Maximum time allowed for a single direct HTTP request.
    pub request_timeout: Duration,

    /// Attempt budget for transient transport failures on direct calls.
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.vk.com/method".to_string(),
            api_version: "5.68".to_string(),
            flush_interval: Duration::from_millis(75),
            batch_size: 25,
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}
