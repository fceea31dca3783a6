//! Google Translate adapter: keyed machine-translation provider.
//!
//! Plain-text variant: fast, accurate, no romaji or JLPT metadata. The
//! credential travels as a `key` query parameter, per the v2 REST API.

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
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

pub struct GoogleAdapter {
    client: reqwest::Client,
    api_url: String,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn id(&self) -> &'static str {
        "google"
    }

    async fn translate(
        &self,
        text: &str,
        direction: Direction,
        api_key: Option<&str>,
    ) -> Result<AdapterReply, AdapterError> {
        let api_key = api_key.ok_or(AdapterError::AuthInvalid)?;

        let request = TranslateRequest {
            q: text,
            source: direction.source_lang(),
            target: direction.target_lang(),
            format: "text",
        };

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => AdapterError::QuotaExceeded,
                // 403 here means key/billing trouble, not a spent quota
                401 | 403 => AdapterError::AuthInvalid,
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

        let translated = parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| {
                AdapterError::MalformedResponse("response contained no translations".to_string())
            })?;

        Ok(AdapterReply::plain(translated))
    }
}
