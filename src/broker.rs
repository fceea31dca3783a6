//! Translation broker: credential, activation and usage state plus the
//! priority-ordered fallback chain over the provider adapters.
//!
//! The broker is constructed once per process, owns the injected state
//! database, and is the only component that writes it. Providers are tried
//! strictly sequentially, never concurrently: usage counters must reflect
//! exactly the providers actually consulted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::ProviderAdapter;
use crate::db::{Database, UsageRecord};
use crate::direction::Direction;
use crate::providers::ProviderRegistry;

/// Result of a successful translate call, tagged with the provider that
/// actually served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub romaji: String,
    #[serde(
        rename = "jlptLevel",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub jlpt_level: String,
    pub provider: String,
}

/// Failures surfaced to the broker's caller.
///
/// Per-provider errors are never exposed individually: quota exhaustion
/// becomes a state mutation plus a skip, and everything else is folded into
/// the aggregate `AllProvidersFailed` (detail goes to the log). The user
/// messages are Indonesian, like the rest of the product copy.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Tidak ada API yang tersedia. Silakan periksa konfigurasi API atau quota Anda.")]
    NoProviderAvailable,

    #[error("Semua API gagal. Silakan coba lagi nanti.")]
    AllProvidersFailed,

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

pub struct TranslationBroker {
    db: Database,
    adapters: Vec<Box<dyn ProviderAdapter>>,
}

impl TranslationBroker {
    /// Build a broker over the given state database and adapter set.
    ///
    /// Seeds the activation flags from the catalog defaults on first run.
    pub fn new(db: Database, adapters: Vec<Box<dyn ProviderAdapter>>) -> anyhow::Result<Self> {
        let registry = ProviderRegistry::get();
        let defaults: Vec<(&str, bool)> = registry
            .list_all()
            .iter()
            .map(|p| (p.id, p.default_active))
            .collect();
        if db.seed_active_defaults(&defaults)? {
            info!("Seeded provider activation defaults");
        }
        Ok(Self { db, adapters })
    }

    /// Store an API key for a provider. An empty key removes the credential,
    /// so "absence means no key" stays true for the availability filter. No
    /// format validation happens here.
    pub fn set_api_key(&self, provider_id: &str, key: &str) -> anyhow::Result<()> {
        if key.is_empty() {
            self.db.remove_api_key(provider_id)?;
            info!("API key removed for {}", provider_id);
        } else {
            self.db.set_api_key(provider_id, key)?;
            info!("API key saved for {}", provider_id);
        }
        Ok(())
    }

    /// Read the stored API key for a provider, if any.
    pub fn get_api_key(&self, provider_id: &str) -> anyhow::Result<Option<String>> {
        self.db.get_api_key(provider_id)
    }

    /// Enable or disable a provider.
    pub fn set_active(&self, provider_id: &str, is_active: bool) -> anyhow::Result<()> {
        self.db.set_active(provider_id, is_active)?;
        info!(
            "Provider {} set to {}",
            provider_id,
            if is_active { "active" } else { "inactive" }
        );
        Ok(())
    }

    /// Whether a provider is enabled. Falls back to the catalog default when
    /// nothing was ever stored, and to `false` for unknown ids.
    pub fn is_active(&self, provider_id: &str) -> anyhow::Result<bool> {
        if let Some(stored) = self.db.get_active(provider_id)? {
            return Ok(stored);
        }
        Ok(ProviderRegistry::get()
            .get_by_id(provider_id)
            .map(|p| p.default_active)
            .unwrap_or(false))
    }

    /// Current usage for a provider.
    ///
    /// Materializes a zero-usage record with the configured ceiling when none
    /// is stored yet, without persisting it, so repeated reads are
    /// side-effect free.
    pub fn get_usage(&self, provider_id: &str) -> anyhow::Result<UsageRecord> {
        if let Some(record) = self.db.get_usage(provider_id)? {
            return Ok(record);
        }
        Ok(UsageRecord {
            used: 0,
            limit: ProviderRegistry::get().usage_limit(provider_id),
            last_reset: Utc::now().to_rfc3339(),
        })
    }

    /// Explicitly reset a provider's usage counter. This is the only
    /// operation allowed to decrease `used`.
    pub fn reset_usage(&self, provider_id: &str) -> anyhow::Result<UsageRecord> {
        let record = UsageRecord {
            used: 0,
            limit: ProviderRegistry::get().usage_limit(provider_id),
            last_reset: Utc::now().to_rfc3339(),
        };
        self.db.put_usage(provider_id, &record)?;
        info!("Usage reset for {}", provider_id);
        Ok(record)
    }

    /// Reset usage for every keyless provider (their ceilings are daily free
    /// quotas). Invoked by the scheduler at the configured rollover time.
    pub fn reset_free_quotas(&self) -> anyhow::Result<Vec<String>> {
        let mut reset = Vec::new();
        for provider in ProviderRegistry::get().list_all() {
            if !provider.requires_key {
                self.reset_usage(provider.id)?;
                reset.push(provider.id.to_string());
            }
        }
        Ok(reset)
    }

    fn is_available(&self, provider_id: &str) -> anyhow::Result<bool> {
        let registry = ProviderRegistry::get();
        let provider = match registry.get_by_id(provider_id) {
            Some(p) => p,
            None => {
                debug!("Provider {} not found in catalog", provider_id);
                return Ok(false);
            }
        };

        if !self.is_active(provider_id)? {
            debug!("Provider {} is not active", provider_id);
            return Ok(false);
        }

        if provider.requires_key {
            let has_key = self
                .get_api_key(provider_id)?
                .map(|k| !k.is_empty())
                .unwrap_or(false);
            if !has_key {
                debug!("Provider {} requires a key but none is stored", provider_id);
                return Ok(false);
            }
        }

        let usage = self.get_usage(provider_id)?;
        if usage.used >= usage.limit {
            debug!("Provider {} has reached its usage limit", provider_id);
            return Ok(false);
        }

        Ok(true)
    }

    /// Ids of all currently usable providers, sorted ascending by priority.
    ///
    /// Pure read, safe to call repeatedly for display purposes.
    pub fn get_available_providers(&self) -> anyhow::Result<Vec<String>> {
        let mut available = Vec::new();
        for provider in ProviderRegistry::get().by_priority() {
            if self.is_available(provider.id)? {
                available.push(provider.id.to_string());
            }
        }
        debug!("Available providers: {:?}", available);
        Ok(available)
    }

    fn record_success(&self, provider_id: &str) -> anyhow::Result<()> {
        let mut usage = self.get_usage(provider_id)?;
        usage.used += 1;
        self.db.put_usage(provider_id, &usage)?;
        debug!(
            "Usage updated for {}: {}/{}",
            provider_id, usage.used, usage.limit
        );
        Ok(())
    }

    fn mark_exhausted(&self, provider_id: &str) -> anyhow::Result<()> {
        let mut usage = self.get_usage(provider_id)?;
        usage.used = usage.limit;
        self.db.put_usage(provider_id, &usage)?;
        Ok(())
    }

    /// Translate `text` in `direction` through the first usable provider.
    ///
    /// Candidates are tried strictly in priority order; at most one provider
    /// serves a successful call. A quota failure marks that provider
    /// exhausted before moving on; any other failure skips it for this call
    /// only.
    pub async fn translate(
        &self,
        text: &str,
        direction: Direction,
    ) -> Result<TranslationOutcome, BrokerError> {
        info!("Starting translation ({})", direction);

        let candidates = self.get_available_providers()?;
        if candidates.is_empty() {
            warn!("No providers available for translation");
            return Err(BrokerError::NoProviderAvailable);
        }

        for provider_id in candidates {
            let adapter = match self.adapters.iter().find(|a| a.id() == provider_id) {
                Some(adapter) => adapter,
                None => {
                    warn!("No adapter registered for provider {}", provider_id);
                    continue;
                }
            };

            let api_key = self.get_api_key(&provider_id)?;

            info!("Trying provider {}", provider_id);
            match adapter.translate(text, direction, api_key.as_deref()).await {
                Ok(reply) => {
                    self.record_success(&provider_id)?;
                    info!("Translation successful with {}", provider_id);
                    return Ok(TranslationOutcome {
                        translation: reply.translation,
                        romaji: reply.romaji,
                        jlpt_level: reply.jlpt_level,
                        provider: provider_id,
                    });
                }
                Err(err) if err.is_quota() => {
                    warn!("Provider {} quota exhausted, marking and skipping", provider_id);
                    self.mark_exhausted(&provider_id)?;
                }
                Err(err) => {
                    warn!("Provider {} failed: {}", provider_id, err);
                }
            }
        }

        warn!("All providers failed");
        Err(BrokerError::AllProvidersFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterError, AdapterReply};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted adapter: pops one preprogrammed result per call and records
    /// the call order in a shared log.
    struct StubAdapter {
        id: &'static str,
        results: Mutex<VecDeque<Result<AdapterReply, AdapterError>>>,
        call_log: Arc<Mutex<Vec<String>>>,
    }

    impl StubAdapter {
        fn new(
            id: &'static str,
            results: Vec<Result<AdapterReply, AdapterError>>,
            call_log: Arc<Mutex<Vec<String>>>,
        ) -> Box<Self> {
            Box::new(Self {
                id,
                results: Mutex::new(results.into()),
                call_log,
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for StubAdapter {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn translate(
            &self,
            _text: &str,
            _direction: Direction,
            _api_key: Option<&str>,
        ) -> Result<AdapterReply, AdapterError> {
            self.call_log.lock().unwrap().push(self.id.to_string());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected extra call to {}", self.id))
        }
    }

    fn ok_reply(text: &str) -> Result<AdapterReply, AdapterError> {
        Ok(AdapterReply::plain(text.to_string()))
    }

    /// Broker over an in-memory database with scripted adapters for all four
    /// catalog providers. Keys are configured for the keyed providers so the
    /// full chain is available by default.
    fn scripted_broker(
        scripts: Vec<(&'static str, Vec<Result<AdapterReply, AdapterError>>)>,
    ) -> (TranslationBroker, Arc<Mutex<Vec<String>>>) {
        let call_log = Arc::new(Mutex::new(Vec::new()));
        let adapters: Vec<Box<dyn ProviderAdapter>> = scripts
            .into_iter()
            .map(|(id, results)| {
                let adapter: Box<dyn ProviderAdapter> =
                    StubAdapter::new(id, results, Arc::clone(&call_log));
                adapter
            })
            .collect();

        let broker = TranslationBroker::new(Database::in_memory().unwrap(), adapters).unwrap();
        broker.set_api_key("openai", "sk-test").unwrap();
        broker.set_api_key("google", "g-test").unwrap();
        (broker, call_log)
    }

    // ==================== Availability Tests ====================

    #[test]
    fn test_available_providers_sorted_by_priority() {
        let (broker, _) = scripted_broker(vec![]);

        let available = broker.get_available_providers().unwrap();
        assert_eq!(
            available,
            vec!["openai", "google", "libretranslate", "mymemory"]
        );
    }

    #[test]
    fn test_missing_key_excludes_keyed_provider() {
        let (broker, _) = scripted_broker(vec![]);
        broker.set_api_key("google", "").unwrap(); // removes the key

        let available = broker.get_available_providers().unwrap();
        assert!(!available.contains(&"google".to_string()));
        // Keyless providers are unaffected
        assert!(available.contains(&"libretranslate".to_string()));
        assert!(available.contains(&"mymemory".to_string()));
    }

    #[test]
    fn test_inactive_provider_excluded_despite_key_and_quota() {
        let (broker, _) = scripted_broker(vec![]);
        broker.set_active("openai", false).unwrap();

        let available = broker.get_available_providers().unwrap();
        assert!(!available.contains(&"openai".to_string()));
    }

    #[test]
    fn test_exhausted_provider_excluded() {
        let (broker, _) = scripted_broker(vec![]);

        broker.mark_exhausted("mymemory").unwrap();

        let available = broker.get_available_providers().unwrap();
        assert!(!available.contains(&"mymemory".to_string()));
    }

    #[test]
    fn test_unknown_provider_is_never_active() {
        let (broker, _) = scripted_broker(vec![]);
        assert!(!broker.is_active("papago").unwrap());
    }

    // ==================== Usage Tests ====================

    #[test]
    fn test_get_usage_materializes_without_persisting() {
        let (broker, _) = scripted_broker(vec![]);

        let first = broker.get_usage("libretranslate").unwrap();
        assert_eq!(first.used, 0);
        assert_eq!(first.limit, 100);

        // Still nothing stored, repeated reads agree
        assert!(broker.db.get_usage("libretranslate").unwrap().is_none());
        let second = broker.get_usage("libretranslate").unwrap();
        assert_eq!(second.used, 0);
        assert_eq!(second.limit, 100);
    }

    #[test]
    fn test_reset_usage_restores_availability() {
        let (broker, _) = scripted_broker(vec![]);

        broker.mark_exhausted("mymemory").unwrap();
        assert!(!broker
            .get_available_providers()
            .unwrap()
            .contains(&"mymemory".to_string()));

        let record = broker.reset_usage("mymemory").unwrap();
        assert_eq!(record.used, 0);
        assert!(broker
            .get_available_providers()
            .unwrap()
            .contains(&"mymemory".to_string()));
    }

    #[test]
    fn test_reset_free_quotas_targets_keyless_providers_only() {
        let (broker, _) = scripted_broker(vec![]);

        broker.mark_exhausted("openai").unwrap();
        broker.mark_exhausted("libretranslate").unwrap();

        let reset = broker.reset_free_quotas().unwrap();
        assert_eq!(reset, vec!["libretranslate", "mymemory"]);

        // Keyless provider recovered, keyed provider still exhausted
        let available = broker.get_available_providers().unwrap();
        assert!(available.contains(&"libretranslate".to_string()));
        assert!(!available.contains(&"openai".to_string()));
    }

    // ==================== Translate Tests ====================

    #[tokio::test]
    async fn test_translate_uses_first_available_provider() {
        let (broker, call_log) = scripted_broker(vec![
            ("openai", vec![ok_reply("おはよう")]),
            ("google", vec![]),
            ("libretranslate", vec![]),
            ("mymemory", vec![]),
        ]);

        let outcome = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .expect("should succeed");

        assert_eq!(outcome.translation, "おはよう");
        assert_eq!(outcome.provider, "openai");
        assert_eq!(*call_log.lock().unwrap(), vec!["openai"]);

        // Exactly one call recorded against the serving provider
        assert_eq!(broker.get_usage("openai").unwrap().used, 1);
        assert_eq!(broker.get_usage("google").unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_translate_quota_chain_falls_through_in_order() {
        let (broker, call_log) = scripted_broker(vec![
            ("openai", vec![Err(AdapterError::QuotaExceeded)]),
            ("google", vec![Err(AdapterError::QuotaExceeded)]),
            ("libretranslate", vec![ok_reply("おはよう")]),
            ("mymemory", vec![]),
        ]);

        let outcome = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .expect("third provider should serve the call");

        assert_eq!(outcome.provider, "libretranslate");
        assert_eq!(
            *call_log.lock().unwrap(),
            vec!["openai", "google", "libretranslate"]
        );

        // Quota failures forced to their ceilings; the server incremented by 1
        let openai = broker.get_usage("openai").unwrap();
        assert_eq!(openai.used, openai.limit);
        let google = broker.get_usage("google").unwrap();
        assert_eq!(google.used, google.limit);
        assert_eq!(broker.get_usage("libretranslate").unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_persists_across_calls() {
        let (broker, _) = scripted_broker(vec![
            ("openai", vec![Err(AdapterError::QuotaExceeded)]),
            ("google", vec![ok_reply("おはよう"), ok_reply("こんにちは")]),
            ("libretranslate", vec![]),
            ("mymemory", vec![]),
        ]);

        broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .unwrap();

        // openai dropped out of every later availability computation
        assert!(!broker
            .get_available_providers()
            .unwrap()
            .contains(&"openai".to_string()));

        let outcome = broker
            .translate("selamat siang", Direction::IndonesiaJapanese)
            .await
            .unwrap();
        assert_eq!(outcome.provider, "google");
    }

    #[tokio::test]
    async fn test_non_quota_failure_leaves_usage_untouched() {
        let (broker, call_log) = scripted_broker(vec![
            ("openai", vec![Err(AdapterError::AuthInvalid), ok_reply("おはよう")]),
            ("google", vec![ok_reply("おはよう")]),
            ("libretranslate", vec![]),
            ("mymemory", vec![]),
        ]);

        let outcome = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .unwrap();
        assert_eq!(outcome.provider, "google");

        // Auth failure neither spent quota nor removed openai from the pool
        assert_eq!(broker.get_usage("openai").unwrap().used, 0);
        assert!(broker
            .get_available_providers()
            .unwrap()
            .contains(&"openai".to_string()));

        // Next user-initiated call retries openai first and succeeds
        let outcome = broker
            .translate("selamat siang", Direction::IndonesiaJapanese)
            .await
            .unwrap();
        assert_eq!(outcome.provider, "openai");
        assert_eq!(
            *call_log.lock().unwrap(),
            vec!["openai", "google", "openai"]
        );
    }

    #[tokio::test]
    async fn test_translate_no_provider_available_makes_no_calls() {
        let (broker, call_log) = scripted_broker(vec![
            ("openai", vec![]),
            ("google", vec![]),
            ("libretranslate", vec![]),
            ("mymemory", vec![]),
        ]);
        for id in ["openai", "google", "libretranslate", "mymemory"] {
            broker.set_active(id, false).unwrap();
        }

        let err = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::NoProviderAvailable));
        assert!(call_log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_translate_all_providers_failed() {
        let (broker, call_log) = scripted_broker(vec![
            ("openai", vec![Err(AdapterError::AuthInvalid)]),
            (
                "google",
                vec![Err(AdapterError::Api {
                    status: 500,
                    message: "boom".to_string(),
                })],
            ),
            ("libretranslate", vec![Err(AdapterError::QuotaExceeded)]),
            (
                "mymemory",
                vec![Err(AdapterError::MalformedResponse("html".to_string()))],
            ),
        ]);

        let err = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::AllProvidersFailed));
        assert_eq!(call_log.lock().unwrap().len(), 4);

        // Only the quota failure mutated usage
        assert_eq!(broker.get_usage("openai").unwrap().used, 0);
        assert_eq!(broker.get_usage("google").unwrap().used, 0);
        assert_eq!(broker.get_usage("mymemory").unwrap().used, 0);
        let libre = broker.get_usage("libretranslate").unwrap();
        assert_eq!(libre.used, libre.limit);
    }

    #[tokio::test]
    async fn test_outcome_carries_structured_metadata() {
        let (broker, _) = scripted_broker(vec![
            (
                "openai",
                vec![Ok(AdapterReply {
                    translation: "おはよう".to_string(),
                    romaji: "ohayou".to_string(),
                    jlpt_level: "N5".to_string(),
                })],
            ),
            ("google", vec![]),
            ("libretranslate", vec![]),
            ("mymemory", vec![]),
        ]);

        let outcome = broker
            .translate("selamat pagi", Direction::IndonesiaJapanese)
            .await
            .unwrap();

        assert_eq!(outcome.romaji, "ohayou");
        assert_eq!(outcome.jlpt_level, "N5");

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"jlptLevel\":\"N5\""));
        assert!(json.contains("\"provider\":\"openai\""));
    }

    // ==================== Property Tests ====================

    proptest::proptest! {
        /// For any activation pattern and any exhaustion pattern, the
        /// availability list is sorted by priority and contains exactly the
        /// providers passing the filter.
        #[test]
        fn prop_availability_filter_and_order(
            active in proptest::collection::vec(proptest::bool::ANY, 4),
            exhausted in proptest::collection::vec(proptest::bool::ANY, 4),
            keyed in proptest::collection::vec(proptest::bool::ANY, 2),
        ) {
            let (broker, _) = scripted_broker(vec![]);
            let ids = ["openai", "google", "libretranslate", "mymemory"];

            for (i, id) in ids.iter().enumerate() {
                broker.set_active(id, active[i]).unwrap();
                if exhausted[i] {
                    broker.mark_exhausted(id).unwrap();
                }
            }
            // Keyed providers may or may not have a credential
            if !keyed[0] {
                broker.set_api_key("openai", "").unwrap();
            }
            if !keyed[1] {
                broker.set_api_key("google", "").unwrap();
            }

            let available = broker.get_available_providers().unwrap();

            // Sorted by catalog priority
            let positions: Vec<usize> = available
                .iter()
                .map(|id| ids.iter().position(|p| *p == id.as_str()).unwrap())
                .collect();
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            proptest::prop_assert_eq!(&positions, &sorted);

            // Exactly the filter
            for (i, id) in ids.iter().enumerate() {
                let has_key = match *id {
                    "openai" => keyed[0],
                    "google" => keyed[1],
                    _ => true, // keyless providers never need one
                };
                let expected = active[i] && !exhausted[i] && has_key;
                proptest::prop_assert_eq!(
                    available.contains(&id.to_string()),
                    expected,
                    "provider {} availability mismatch", id
                );
            }
        }
    }
}
