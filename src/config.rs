//! Client configuration and its builder.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default Volcano Speech WebSocket host.
pub const DEFAULT_WS_URL: &str = "wss://openspeech.bytedance.com";

/// Bidirectional TTS endpoint path.
pub const BIDIRECTIONAL_TTS_PATH: &str = "/api/v3/tts/bidirection";

/// Handshake deadline applied to name resolution, TCP connect, and the
/// combined TLS + WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub app_id: String,
    pub access_key: String,
    pub resource_id: String,
    pub ws_url: String,
    pub handshake_timeout: Duration,
    pub sample_rate: u32,
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct TtsClientBuilder {
    app_id: String,
    access_key: Option<String>,
    resource_id: String,
    ws_url: String,
    handshake_timeout: Duration,
    sample_rate: u32,
}

impl TtsClientBuilder {
    /// Creates a new builder for the given `app_id`.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            access_key: None,
            resource_id: "seed-tts-2.0".to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            sample_rate: 16000,
        }
    }

    /// Sets the `X-Api-Access-Key` token.
    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Sets the `X-Api-Resource-Id` (default `seed-tts-2.0`).
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    /// Overrides the WebSocket base URL (`scheme://host[:port]`), useful to
    /// point at a local mock server in tests.
    pub fn ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    /// Overrides the resolve/connect/handshake deadline.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Overrides the PCM sample rate advertised in session/task payloads.
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<ClientConfig> {
        if self.app_id.is_empty() {
            return Err(Error::Config("app_id must be non-empty".to_string()));
        }
        let access_key = self
            .access_key
            .ok_or_else(|| Error::Config("access_key is required".to_string()))?;
        if access_key.is_empty() {
            return Err(Error::Config("access_key must be non-empty".to_string()));
        }
        if self.resource_id.is_empty() {
            return Err(Error::Config("resource_id must be non-empty".to_string()));
        }

        Ok(ClientConfig {
            app_id: self.app_id,
            access_key,
            resource_id: self.resource_id,
            ws_url: self.ws_url,
            handshake_timeout: self.handshake_timeout,
            sample_rate: self.sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_access_key() {
        let err = TtsClientBuilder::new("app").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_requires_non_empty_app_id() {
        let err = TtsClientBuilder::new("")
            .access_key("k")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_succeeds_with_defaults() {
        let cfg = TtsClientBuilder::new("app").access_key("k").build().unwrap();
        assert_eq!(cfg.resource_id, "seed-tts-2.0");
        assert_eq!(cfg.sample_rate, 16000);
        assert_eq!(cfg.ws_url, DEFAULT_WS_URL);
    }
}
