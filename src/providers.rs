//! Provider catalog: single source of truth for the translation providers.
//!
//! This module provides a centralized, read-only registry of every external
//! translation API the broker can route to. It uses a singleton pattern with
//! `OnceLock` to ensure thread-safe initialization and access.

use std::sync::OnceLock;

/// Ceiling applied to providers without an explicit free-tier limit.
pub const DEFAULT_FREE_LIMIT: u32 = 1000;

/// Static configuration for a translation provider.
///
/// Contains all catalog-level metadata for one provider: its identity,
/// human-readable description, whether an API key is mandatory, the free
/// daily call ceiling for keyless providers, and its fallback priority.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Unique provider id (e.g., "openai", "mymemory")
    pub id: &'static str,

    /// Display name shown in provider listings
    pub name: &'static str,

    /// Short user-facing description (Indonesian, like the rest of the product copy)
    pub description: &'static str,

    /// Whether an API key must be configured before this provider is usable
    pub requires_key: bool,

    /// Free daily call ceiling. Only meaningful when `requires_key` is false.
    pub free_limit: Option<u32>,

    /// Fallback order: lower values are tried first
    pub priority: u32,

    /// Whether the provider starts out enabled on a fresh installation
    pub default_active: bool,
}

/// Global provider registry singleton.
///
/// The registry is initialized once on first access and remains immutable
/// thereafter. Nothing in the broker mutates catalog data; per-installation
/// state (keys, usage, activation) lives in the database instead.
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();

impl ProviderRegistry {
    /// Get the global provider registry instance.
    pub fn get() -> &'static ProviderRegistry {
        REGISTRY.get_or_init(|| ProviderRegistry {
            providers: default_providers(),
        })
    }

    /// Get a provider configuration by its id.
    ///
    /// # Returns
    /// * `Some(&ProviderConfig)` if the provider exists
    /// * `None` if the id is not part of the catalog
    pub fn get_by_id(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Get all providers in catalog order.
    pub fn list_all(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Get all providers sorted ascending by priority (the fallback order).
    pub fn by_priority(&self) -> Vec<&ProviderConfig> {
        let mut providers: Vec<&ProviderConfig> = self.providers.iter().collect();
        providers.sort_by_key(|p| p.priority);
        providers
    }

    /// Effective usage ceiling for a provider: its configured free limit, or
    /// [`DEFAULT_FREE_LIMIT`] when the catalog does not specify one.
    pub fn usage_limit(&self, id: &str) -> u32 {
        self.get_by_id(id)
            .and_then(|p| p.free_limit)
            .unwrap_or(DEFAULT_FREE_LIMIT)
    }

    /// Check if an id belongs to a catalog provider.
    pub fn contains(&self, id: &str) -> bool {
        self.get_by_id(id).is_some()
    }
}

/// Default provider catalog.
///
/// Priority encodes the quality/cost trade-off: the paid high-quality
/// provider first, free providers last.
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "openai",
            name: "OpenAI GPT-4",
            description: "Terjemahan berkualitas tinggi dengan AI dan informasi JLPT",
            requires_key: true,
            free_limit: None,
            priority: 1,
            default_active: true,
        },
        ProviderConfig {
            id: "google",
            name: "Google Translate",
            description: "Terjemahan cepat dan akurat dari Google",
            requires_key: true,
            free_limit: None,
            priority: 2,
            default_active: true,
        },
        ProviderConfig {
            id: "libretranslate",
            name: "LibreTranslate",
            description: "Terjemahan open source dan gratis (API key opsional untuk rate limit lebih tinggi)",
            requires_key: false,
            free_limit: Some(100),
            priority: 3,
            default_active: true,
        },
        ProviderConfig {
            id: "mymemory",
            name: "MyMemory",
            description: "Terjemahan gratis dengan database terbesar (API key opsional untuk rate limit lebih tinggi)",
            requires_key: false,
            free_limit: Some(1000),
            priority: 4,
            default_active: true,
        },
    ]
}
