//! MyMemory adapter: free dictionary-style provider.
//!
//! Plain-text variant over a GET endpoint; `langpair` uses the `src|tgt`
//! form, and an optional key raises the anonymous rate limit.

use async_trait::async_trait;
use serde::Deserialize;

use super::{AdapterError, AdapterReply, ProviderAdapter};
use crate::direction::Direction;

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "responseData")]
    response_data: ResponseData,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

pub struct MyMemoryAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl MyMemoryAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ProviderAdapter for MyMemoryAdapter {
    fn id(&self) -> &'static str {
        "mymemory"
    }

    async fn translate(
        &self,
        text: &str,
        direction: Direction,
        api_key: Option<&str>,
    ) -> Result<AdapterReply, AdapterError> {
        let langpair = format!("{}|{}", direction.source_lang(), direction.target_lang());

        let mut request = self
            .client
            .get(format!("{}/get", self.base_url))
            .query(&[("q", text), ("langpair", langpair.as_str())]);

        if let Some(key) = api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;

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

        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        Ok(AdapterReply::plain(parsed.response_data.translated_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(uri: &str) -> MyMemoryAdapter {
        MyMemoryAdapter::new(reqwest::Client::new(), uri.to_string())
    }

    fn success_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "responseData": { "translatedText": text, "match": 0.98 },
            "responseStatus": 200
        })
    }

    #[tokio::test]
    async fn test_translate_success_without_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .and(query_param("q", "selamat pagi"))
            .and(query_param("langpair", "id|ja"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("おはよう")))
            .mount(&mock_server)
            .await;

        let reply = adapter(&mock_server.uri())
            .translate("selamat pagi", Direction::IndonesiaJapanese, None)
            .await
            .expect("should succeed");

        assert_eq!(reply.translation, "おはよう");
        assert_eq!(reply.romaji, "");
        assert_eq!(reply.jlpt_level, "");
    }

    #[tokio::test]
    async fn test_translate_includes_optional_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .and(query_param("langpair", "ja|id"))
            .and(query_param("key", "mm-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("selamat pagi")))
            .mount(&mock_server)
            .await;

        let reply = adapter(&mock_server.uri())
            .translate("おはよう", Direction::JapaneseIndonesia, Some("mm-key"))
            .await
            .expect("should succeed");

        assert_eq!(reply.translation, "selamat pagi");
    }

    #[tokio::test]
    async fn test_translate_429_is_quota() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(429).set_body_string("MYMEMORY WARNING: YOU USED ALL AVAILABLE FREE TRANSLATIONS FOR TODAY"))
            .mount(&mock_server)
            .await;

        let err = adapter(&mock_server.uri())
            .translate("halo", Direction::IndonesiaJapanese, None)
            .await
            .unwrap_err();

        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_translate_unexpected_shape_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = adapter(&mock_server.uri())
            .translate("halo", Direction::IndonesiaJapanese, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AdapterError::MalformedResponse(_)));
    }
}
