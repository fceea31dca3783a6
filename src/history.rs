//! Client for the remote auth/history service.
//!
//! The service itself is an external collaborator; this module only speaks
//! its narrow contract: sign in, sign out, current user, save a translation
//! record, list the current user's records. It stays out of its internals.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

use crate::broker::TranslationOutcome;
use crate::direction::Direction;
use crate::retry::{with_retry_if, RetryConfig};

/// Authenticated user as reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// A stored history item. Immutable once created; owned by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub id: String,
    pub user_id: String,
    pub input_text: String,
    pub output_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub romaji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jlpt_level: Option<String>,
    pub direction: Direction,
    pub created_at: String,
}

/// Payload for saving a new history item. The collaborator assigns the id
/// and the owning user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTranslationRecord {
    pub input_text: String,
    pub output_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub romaji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jlpt_level: Option<String>,
    pub direction: Direction,
    pub created_at: String,
}

impl NewTranslationRecord {
    /// Build a record from a successful translate call. Empty metadata
    /// fields are stored as absent, not as empty strings.
    pub fn from_outcome(input_text: &str, outcome: &TranslationOutcome, direction: Direction) -> Self {
        Self {
            input_text: input_text.to_string(),
            output_text: outcome.translation.clone(),
            romaji: (!outcome.romaji.is_empty()).then(|| outcome.romaji.clone()),
            jlpt_level: (!outcome.jlpt_level.is_empty()).then(|| outcome.jlpt_level.clone()),
            direction,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    user: User,
    access_token: String,
}

/// HTTP client for the collaborator. Holds the bearer token obtained at
/// sign-in; the broker never touches this state.
pub struct HistoryClient {
    client: reqwest::Client,
    base_url: String,
    token: Mutex<Option<String>>,
    retry: RetryConfig,
}

impl HistoryClient {
    pub fn new(base_url: String) -> Self {
        Self::with_retry(base_url, RetryConfig::api_call())
    }

    pub fn with_retry(base_url: String, retry: RetryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: Mutex::new(None),
            retry,
        }
    }

    fn current_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    /// Sign in and remember the session token for subsequent calls.
    pub async fn sign_in(&self) -> Result<User> {
        let response = self
            .client
            .post(format!("{}/auth/sign-in", self.base_url))
            .send()
            .await
            .context("Failed to reach the history service for sign-in")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("History service error ({}): {}", status, body);
        }

        let parsed: SignInResponse = response
            .json()
            .await
            .context("Failed to parse sign-in response")?;

        *self.token.lock().unwrap() = Some(parsed.access_token);
        info!("Signed in as {}", parsed.user.email);
        Ok(parsed.user)
    }

    /// Sign out. The local session token is dropped even if the remote call
    /// fails.
    pub async fn sign_out(&self) -> Result<()> {
        let token = self.token.lock().unwrap().take();

        if let Some(token) = token {
            let response = self
                .client
                .post(format!("{}/auth/sign-out", self.base_url))
                .bearer_auth(&token)
                .send()
                .await
                .context("Failed to reach the history service for sign-out")?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                bail!("History service error ({}): {}", status, body);
            }
        }

        info!("Signed out");
        Ok(())
    }

    /// The signed-in user, or `None` when there is no session (locally or
    /// as far as the collaborator is concerned).
    pub async fn current_user(&self) -> Result<Option<User>> {
        let token = match self.current_token() {
            Some(token) => token,
            None => return Ok(None),
        };

        let response = self
            .client
            .get(format!("{}/auth/user", self.base_url))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to reach the history service")?;

        if response.status().as_u16() == 401 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("History service error ({}): {}", status, body);
        }

        let user: User = response
            .json()
            .await
            .context("Failed to parse current-user response")?;
        Ok(Some(user))
    }

    /// Persist a new history record for the signed-in user.
    pub async fn save_record(&self, record: &NewTranslationRecord) -> Result<TranslationRecord> {
        let token = self
            .current_token()
            .context("Sign in before saving translations")?;

        with_retry_if(
            &self.retry,
            "Save translation record",
            || async {
                let response = self
                    .client
                    .post(format!("{}/translations", self.base_url))
                    .bearer_auth(&token)
                    .json(record)
                    .send()
                    .await
                    .context("Failed to reach the history service")?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("History service error ({}): {}", status, body);
                }

                response
                    .json::<TranslationRecord>()
                    .await
                    .context("Failed to parse saved record")
            },
            is_retryable_error,
        )
        .await
    }

    /// The signed-in user's records, newest first (the collaborator orders
    /// them; this client does not re-sort).
    pub async fn list_records(&self) -> Result<Vec<TranslationRecord>> {
        let token = self
            .current_token()
            .context("Sign in before loading history")?;

        with_retry_if(
            &self.retry,
            "List translation records",
            || async {
                let response = self
                    .client
                    .get(format!("{}/translations", self.base_url))
                    .bearer_auth(&token)
                    .send()
                    .await
                    .context("Failed to reach the history service")?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    bail!("History service error ({}): {}", status, body);
                }

                response
                    .json::<Vec<TranslationRecord>>()
                    .await
                    .context("Failed to parse history listing")
            },
            is_retryable_error,
        )
        .await
    }
}

/// Retry 429 and 5xx service errors plus network failures; other 4xx errors
/// fail immediately.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let message = error.to_string();

    if message.contains("History service error") {
        if let Some(start) = message.find('(') {
            if let Some(end) = message[start..].find(')') {
                let status_str = &message[start + 1..start + end];
                let status_num = status_str.split_whitespace().next().unwrap_or("");
                if let Ok(status) = status_num.parse::<u16>() {
                    return status == 429 || status >= 500;
                }
            }
        }
    }

    // Network errors and other transient failures
    true
}
