//! Provider adapters: one module per external translation API.
//!
//! Every adapter implements the same capability, translating a piece of text
//! in one direction with an optional credential, and normalizes the
//! provider's wire format into an [`AdapterReply`]. The broker never looks at
//! provider ids to pick behavior; it only walks trait objects.

mod google;
mod libretranslate;
mod mymemory;
mod openai;

pub use google::GoogleAdapter;
pub use libretranslate::LibreTranslateAdapter;
pub use mymemory::MyMemoryAdapter;
pub use openai::OpenAiAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::direction::Direction;

/// Normalized translation result from a provider.
///
/// Providers without transliteration/proficiency metadata leave `romaji` and
/// `jlpt_level` empty; the fields are omitted from JSON output in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterReply {
    pub translation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub romaji: String,
    #[serde(
        rename = "jlptLevel",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub jlpt_level: String,
}

impl AdapterReply {
    /// Reply carrying only a translation (plain-text providers).
    pub fn plain(translation: String) -> Self {
        Self {
            translation,
            romaji: String::new(),
            jlpt_level: String::new(),
        }
    }
}

/// Classified adapter failure.
///
/// The broker only changes persisted state on `QuotaExceeded`; every other
/// kind makes it skip the provider for the current call and move on.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("provider quota exhausted")]
    QuotaExceeded,

    #[error("invalid or missing API credential")]
    AuthInvalid,

    #[error("provider rejected the request: {0}")]
    BadRequest(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unparsable provider response: {0}")]
    MalformedResponse(String),
}

impl AdapterError {
    /// Whether this failure means the provider's quota is spent.
    pub fn is_quota(&self) -> bool {
        matches!(self, AdapterError::QuotaExceeded)
    }
}

/// The capability every provider variant implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Catalog id of the provider this adapter speaks to.
    fn id(&self) -> &'static str;

    /// Translate `text` in `direction`, authenticating with `api_key` where
    /// the provider supports it.
    async fn translate(
        &self,
        text: &str,
        direction: Direction,
        api_key: Option<&str>,
    ) -> Result<AdapterReply, AdapterError>;
}

/// Build the adapter set for all catalog providers, pointed at the endpoints
/// from `config`. The shared client keeps one connection pool across
/// providers.
pub fn build_adapters(config: &Config) -> Vec<Box<dyn ProviderAdapter>> {
    let client = reqwest::Client::new();
    vec![
        Box::new(OpenAiAdapter::new(
            client.clone(),
            config.openai_api_url.clone(),
            config.openai_model.clone(),
        )),
        Box::new(GoogleAdapter::new(
            client.clone(),
            config.google_translate_api_url.clone(),
        )),
        Box::new(LibreTranslateAdapter::new(
            client.clone(),
            config.libretranslate_api_url.clone(),
        )),
        Box::new(MyMemoryAdapter::new(client, config.mymemory_api_url.clone())),
    ]
}
