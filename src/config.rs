use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Local state
    pub database_path: String,

    // HTTP surface
    pub port: u16,
    pub admin_api_key: Option<String>,

    // OpenAI (structured-output provider)
    pub openai_api_url: String,
    pub openai_model: String,

    // Plain-text providers
    pub google_translate_api_url: String,
    pub libretranslate_api_url: String,
    pub mymemory_api_url: String,

    // Remote auth/history collaborator (optional)
    pub history_api_url: Option<String>,

    // Daily free-quota rollover, HH:MM in UTC
    pub usage_reset_time: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: std::env::var("PENERJEMAH_DB_PATH")
                .unwrap_or_else(|_| "data/penerjemah.db".to_string()),

            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a number")?,
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),

            // Endpoint overrides exist so tests can point adapters at mock servers
            openai_api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            google_translate_api_url: std::env::var("GOOGLE_TRANSLATE_API_URL").unwrap_or_else(
                |_| "https://translation.googleapis.com/language/translate/v2".to_string(),
            ),
            libretranslate_api_url: std::env::var("LIBRETRANSLATE_API_URL")
                .unwrap_or_else(|_| "https://libretranslate.de".to_string()),
            mymemory_api_url: std::env::var("MYMEMORY_API_URL")
                .unwrap_or_else(|_| "https://api.mymemory.translated.net".to_string()),

            history_api_url: std::env::var("HISTORY_API_URL").ok(),

            usage_reset_time: std::env::var("USAGE_RESET_TIME")
                .unwrap_or_else(|_| "00:00".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "PENERJEMAH_DB_PATH",
            "PORT",
            "ADMIN_API_KEY",
            "OPENAI_API_URL",
            "OPENAI_MODEL",
            "GOOGLE_TRANSLATE_API_URL",
            "LIBRETRANSLATE_API_URL",
            "MYMEMORY_API_URL",
            "HISTORY_API_URL",
            "USAGE_RESET_TIME",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_path, "data/penerjemah.db");
        assert_eq!(config.port, 8080);
        assert!(config.admin_api_key.is_none());
        assert_eq!(
            config.openai_api_url,
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.libretranslate_api_url, "https://libretranslate.de");
        assert!(config.history_api_url.is_none());
        assert_eq!(config.usage_reset_time, "00:00");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("PORT", "9090");
        std::env::set_var("ADMIN_API_KEY", "rahasia");
        std::env::set_var("OPENAI_API_URL", "http://localhost:1234/v1/chat/completions");
        std::env::set_var("HISTORY_API_URL", "http://localhost:5678");

        let config = Config::from_env().unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.admin_api_key.as_deref(), Some("rahasia"));
        assert_eq!(
            config.openai_api_url,
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            config.history_api_url.as_deref(),
            Some("http://localhost:5678")
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        clear_env();
        std::env::set_var("PORT", "not-a-port");

        assert!(Config::from_env().is_err());

        clear_env();
    }
}
