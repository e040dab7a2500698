use std::time::Duration;

use crate::error::{Result, SelasError};
use crate::types::Session;

/// Public endpoint of the hosted Selas backend.
pub const DEFAULT_URL: &str = "https://rmsiaqinsugszccqhnpj.supabase.co";

/// Credential attached as the bearer on every request.
///
/// A client holds exactly one for its whole lifetime; build a new client to
/// switch credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// Static service or API token.
    StaticToken(String),
    /// Interactive session obtained through sign-in.
    Session(Session),
}

impl Credential {
    pub fn bearer(&self) -> &str {
        match self {
            Credential::StaticToken(token) => token,
            Credential::Session(session) => &session.access_token,
        }
    }
}

/// Connection settings for [`SelasClient`](crate::SelasClient).
#[derive(Debug, Clone)]
pub struct SelasConfig {
    /// Backend base URL, without a trailing slash.
    pub url: String,
    /// Project key sent in the `apikey` header.
    pub anon_key: String,
    /// Bearer credential (default: the anon key as a static token).
    pub credential: Credential,
    /// Per-request timeout (default: 30s).
    pub request_timeout: Duration,
    /// Period between result fetches while awaiting a job (default: 250ms).
    pub poll_interval: Duration,
}

impl SelasConfig {
    /// Settings for `url` authenticated with the project key alone.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let anon_key = anon_key.into();
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            credential: Credential::StaticToken(anon_key.clone()),
            anon_key,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Settings for the hosted backend at [`DEFAULT_URL`].
    pub fn hosted(anon_key: impl Into<String>) -> Self {
        Self::new(DEFAULT_URL, anon_key)
    }

    /// Read settings from `SELAS_URL` (optional), `SELAS_ANON_KEY` and
    /// `SELAS_TOKEN` (optional static bearer token).
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SELAS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let anon_key = std::env::var("SELAS_ANON_KEY")
            .map_err(|_| SelasError::Config("SELAS_ANON_KEY must be set".into()))?;
        let mut config = Self::new(url, anon_key);
        if let Ok(token) = std::env::var("SELAS_TOKEN") {
            if !token.is_empty() {
                config = config.credential(Credential::StaticToken(token));
            }
        }
        Ok(config)
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SelasConfig::new("https://example.supabase.co/", "anon");
        assert_eq!(config.url, "https://example.supabase.co");
        assert_eq!(config.credential, Credential::StaticToken("anon".into()));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_hosted_uses_default_url() {
        let config = SelasConfig::hosted("anon");
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.anon_key, "anon");
        assert_eq!(config.credential.bearer(), "anon");
    }

    #[test]
    fn test_session_bearer() {
        let session = Session {
            access_token: "session-jwt".into(),
            token_type: None,
            expires_in: None,
            refresh_token: None,
            user: None,
        };
        let config = SelasConfig::new(DEFAULT_URL, "anon").credential(Credential::Session(session));
        assert_eq!(config.credential.bearer(), "session-jwt");
        assert_eq!(config.anon_key, "anon");
    }

    #[test]
    fn test_builder_overrides() {
        let config = SelasConfig::new(DEFAULT_URL, "anon")
            .request_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }
}
