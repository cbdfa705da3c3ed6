//! Request and response records of the JSON-RPC methods this client issues.

use serde::{Deserialize, Serialize};

/// Parameters of `public/auth`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthParams {
    /// Always `client_credentials` for API-key auth.
    pub grant_type: String,
    /// The API client id.
    pub client_id: String,
    /// The API secret key.
    pub client_secret: String,
}

/// Result of `public/auth`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    /// Bearer token for private methods on this connection.
    pub access_token: String,
    /// Token used to refresh `access_token`.
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    /// Granted scope.
    pub scope: String,
}

/// Parameters of `public/set_heartbeat`.
#[derive(Debug, Clone, Serialize)]
pub struct SetHeartbeatParams {
    /// Heartbeat interval in seconds.
    pub interval: u64,
}

/// Result of `public/test`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestResponse {
    /// The API version the server reports.
    pub version: String,
}

/// Parameters of `public/subscribe` and `private/subscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeParams {
    /// The channels to subscribe or unsubscribe.
    pub channels: Vec<String>,
}

/// Parameters of `public/get_instruments`.
#[derive(Debug, Clone, Serialize)]
pub struct GetInstrumentsParams {
    /// The currency to list instruments for, or `any`.
    pub currency: String,
    /// Whether to include expired instruments.
    pub expired: bool,
}

/// A `subscription` notification envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionEvent {
    /// The channel the event belongs to.
    pub channel: String,
    /// The channel-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}
