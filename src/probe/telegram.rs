use crate::probe::{BotIdentity, IdentityCheck, ProbeFailure};
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const TELEGRAM_SERVICE_NAME: &str = "telegram";

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<BotIdentity>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Identity check backed by the Bot API `getMe` method.
///
/// The token is supplied at construction time and kept in a [`Secret`]; it is
/// only exposed while building the request URL.
pub struct TelegramIdentityCheck {
    client: reqwest::Client,
    api_base_url: String,
    token: Secret<String>,
    request_timeout: Option<Duration>,
}

impl TelegramIdentityCheck {
    /// Builds a check with its own HTTP client. `request_timeout` is a backstop;
    /// [`crate::probe::HealthProbe`] enforces the real deadline.
    pub fn new(
        token: Secret<String>,
        api_base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("botwarden/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for identity check")?;
        let mut check = Self::with_client(token, api_base_url, client);
        check.request_timeout = Some(request_timeout);
        Ok(check)
    }

    pub fn with_client(
        token: Secret<String>,
        api_base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            token,
            request_timeout: None,
        }
    }

    fn get_me_url(&self) -> String {
        format!(
            "{}/bot{}/getMe",
            self.api_base_url.trim_end_matches('/'),
            self.token.expose_secret()
        )
    }

    /// Removes the token from any text derived from a request error
    fn scrub(&self, text: &str) -> String {
        let token = self.token.expose_secret();
        if token.is_empty() {
            text.to_string()
        } else {
            text.replace(token.as_str(), "<redacted>")
        }
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> ProbeFailure {
        if err.is_timeout() {
            return ProbeFailure::TimedOut {
                timeout: self.request_timeout.unwrap_or_default(),
            };
        }
        ProbeFailure::Network(self.scrub(&err.without_url().to_string()))
    }
}

impl fmt::Debug for TelegramIdentityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramIdentityCheck")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl IdentityCheck for TelegramIdentityCheck {
    async fn check(&self) -> std::result::Result<BotIdentity, ProbeFailure> {
        let token = self.token.expose_secret();
        if token.trim().is_empty() {
            return Err(ProbeFailure::MissingToken);
        }
        if !is_valid_token_format(token) {
            return Err(ProbeFailure::InvalidTokenFormat);
        }

        let response = self
            .client
            .get(self.get_me_url())
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        interpret_response(status, &body).map_err(|failure| match failure {
            ProbeFailure::MalformedResponse(msg) => ProbeFailure::MalformedResponse(self.scrub(&msg)),
            other => other,
        })
    }
}

/// Maps a `getMe` HTTP answer onto the probe contract.
///
/// Healthy only for a 2xx whose envelope says `ok: true`. Client errors are a
/// rejection of the token; server errors are treated like network trouble.
fn interpret_response(
    status: reqwest::StatusCode,
    body: &str,
) -> std::result::Result<BotIdentity, ProbeFailure> {
    let parsed = serde_json::from_str::<ApiResponse>(body);

    match parsed {
        Ok(envelope) if status.is_success() && envelope.ok => envelope
            .result
            .ok_or_else(|| ProbeFailure::MalformedResponse("ok response without result".to_string())),
        Ok(envelope) if status.is_server_error() => Err(ProbeFailure::Network(format!(
            "HTTP {}: {}",
            status.as_u16(),
            envelope.description.unwrap_or_default()
        ))),
        Ok(envelope) => Err(ProbeFailure::Rejected {
            status: envelope.error_code.unwrap_or(status.as_u16()),
            description: envelope
                .description
                .unwrap_or_else(|| reason(status)),
        }),
        Err(_) if status.is_client_error() => Err(ProbeFailure::Rejected {
            status: status.as_u16(),
            description: reason(status),
        }),
        Err(_) if status.is_server_error() => {
            Err(ProbeFailure::Network(format!("HTTP {}", status.as_u16())))
        }
        Err(e) => Err(ProbeFailure::MalformedResponse(e.to_string())),
    }
}

fn reason(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

/// Validates Telegram bot token format.
///
/// Expected format: "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
/// - Bot ID must be all digits
/// - Must contain exactly one colon separator
/// - Secret part must be non-empty
pub fn is_valid_token_format(token: &str) -> bool {
    let Some((bot_id, secret)) = token.split_once(':') else {
        return false;
    };

    if bot_id.is_empty() || !bot_id.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    !secret.is_empty() && !secret.contains(':') && !secret.chars().any(char::is_whitespace)
}
