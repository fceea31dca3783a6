//! LibreTranslate adapter: open machine-translation provider.
//!
//! Plain-text variant with an optional API key carried in the request body.
//! Public instances do not serve every language pair, so the adapter checks
//! the instance's `/languages` listing before translating.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AdapterError, AdapterReply, ProviderAdapter};
use crate::direction::Direction;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct Language {
    code: String,
}

pub struct LibreTranslateAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl LibreTranslateAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Check that the instance serves both ends of the language pair.
    async fn check_language_pair(&self, direction: Direction) -> Result<(), AdapterError> {
        let response = self
            .client
            .get(format!("{}/languages", self.base_url))
            .send()
            .await?;

        let languages: Vec<Language> = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let supports = |code: &str| languages.iter().any(|l| l.code == code);
        if !supports(direction.source_lang()) || !supports(direction.target_lang()) {
            return Err(AdapterError::BadRequest(format!(
                "language pair {}->{} not supported by this instance",
                direction.source_lang(),
                direction.target_lang()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for LibreTranslateAdapter {
    fn id(&self) -> &'static str {
        "libretranslate"
    }

    async fn translate(
        &self,
        text: &str,
        direction: Direction,
        api_key: Option<&str>,
    ) -> Result<AdapterReply, AdapterError> {
        self.check_language_pair(direction).await?;

        let request = TranslateRequest {
            q: text,
            source: direction.source_lang(),
            target: direction.target_lang(),
            format: "text",
            api_key,
        };

        let response = self
            .client
            .post(format!("{}/translate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                // Public instances throttle with 403 as well as 429
                429 | 403 => AdapterError::QuotaExceeded,
                401 => AdapterError::AuthInvalid,
                400 => AdapterError::BadRequest(body),
                code => AdapterError::Api {
                    status: code,
                    message: body,
                },
            });
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        Ok(AdapterReply::plain(parsed.translated_text))
    }
}
