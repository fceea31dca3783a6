//! OpenAI adapter: the structured-output provider.
//!
//! Asks the chat-completions API for a strict JSON reply carrying the
//! translation plus romaji and JLPT-level metadata, and parses that reply
//! defensively, since language models do not reliably return clean JSON.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::{AdapterError, AdapterReply, ProviderAdapter};
use crate::direction::Direction;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct StructuredReply {
    #[serde(default)]
    translation: String,
    #[serde(default)]
    romaji: String,
    #[serde(rename = "jlptLevel", default)]
    jlpt_level: String,
}

pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, api_url: String, model: String) -> Self {
        Self {
            client,
            api_url,
            model,
        }
    }
}

/// Build the user prompt demanding a machine-readable reply.
fn build_prompt(text: &str, direction: Direction) -> String {
    match direction {
        Direction::IndonesiaJapanese => format!(
            r#"Terjemahkan kalimat berikut dari Bahasa Indonesia ke Bahasa Jepang. Berikan respons dalam format JSON yang tepat:

Input: "{}"

Berikan respons dalam format JSON berikut:
{{
  "translation": "tulisan Jepang (gunakan Kanji/Hiragana yang tepat)",
  "romaji": "cara baca dalam huruf Latin",
  "jlptLevel": "N5/N4/N3"
}}

Pastikan terjemahan sesuai untuk konteks percakapan sehari-hari atau situasi kerja. Tentukan level JLPT berdasarkan kompleksitas kosakata dan tata bahasa yang digunakan."#,
            text
        ),
        Direction::JapaneseIndonesia => format!(
            r#"Terjemahkan kalimat berikut dari Bahasa Jepang ke Bahasa Indonesia. Berikan respons dalam format JSON yang tepat:

Input: "{}"

Berikan respons dalam format JSON berikut:
{{
  "translation": "terjemahan dalam Bahasa Indonesia",
  "romaji": "cara baca input Jepang dalam huruf Latin (jika input mengandung Kanji/Hiragana)",
  "jlptLevel": "N5/N4/N3"
}}

Berikan terjemahan yang natural dan mudah dipahami. Tentukan level JLPT berdasarkan kompleksitas kosakata dan tata bahasa input Jepang."#,
            text
        ),
    }
}

/// Parse the model's reply into a normalized result.
///
/// Two-stage contract: extract the first `{...}` fragment and parse it as the
/// requested JSON object; if nothing parses, the entire raw reply becomes the
/// translation with empty metadata. This never fails; garbled model output
/// still yields usable text.
fn parse_reply(raw: &str) -> AdapterReply {
    static JSON_FRAGMENT: OnceLock<Regex> = OnceLock::new();
    let re = JSON_FRAGMENT.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

    if let Some(fragment) = re.find(raw) {
        if let Ok(parsed) = serde_json::from_str::<StructuredReply>(fragment.as_str()) {
            return AdapterReply {
                translation: parsed.translation,
                romaji: parsed.romaji,
                jlpt_level: parsed.jlpt_level,
            };
        }
    }

    AdapterReply::plain(raw.trim().to_string())
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &'static str {
        "openai"
    }

    async fn translate(
        &self,
        text: &str,
        direction: Direction,
        api_key: Option<&str>,
    ) -> Result<AdapterReply, AdapterError> {
        let api_key = api_key.ok_or(AdapterError::AuthInvalid)?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "Anda adalah ahli penerjemah bahasa Indonesia dan Jepang yang sangat \
                              berpengalaman, khususnya untuk membantu calon pekerja migran \
                              Indonesia. Berikan terjemahan yang akurat dan praktis."
                        .to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: build_prompt(text, direction),
                },
            ],
            temperature: 0.3,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => AdapterError::QuotaExceeded,
                401 | 403 => AdapterError::AuthInvalid,
                400 => AdapterError::BadRequest(body),
                code => AdapterError::Api {
                    status: code,
                    message: body,
                },
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| {
                AdapterError::MalformedResponse("response contained no choices".to_string())
            })?;

        Ok(parse_reply(&content))
    }
}
