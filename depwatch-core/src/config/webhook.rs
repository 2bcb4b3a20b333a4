//! Webhook endpoint configuration.

use url::Url;

/// Where recorded deposits are announced, and the HMAC key for the
/// `Depwatch-Signature` header.
#[derive(Clone)]
pub struct WebhookConfig {
    pub url: Url,
    pub secret: Box<[u8]>,
}

impl WebhookConfig {
    pub fn new(url: Url, secret: Box<[u8]>) -> Self {
        Self { url, secret }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}
