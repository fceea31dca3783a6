//! One-shot CLI translation: `terjemah <direction> <text...>`.
//!
//! Builds the broker from the environment, translates once and prints the
//! outcome as JSON. Useful for trying provider configurations without
//! running the server.

use anyhow::{bail, Result};

use penerjemah::adapters::build_adapters;
use penerjemah::broker::TranslationBroker;
use penerjemah::config::Config;
use penerjemah::db::Database;
use penerjemah::direction::Direction;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("penerjemah=warn".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let direction = match args.next() {
        Some(value) => Direction::from_str(&value)?,
        None => bail!(
            "Usage: terjemah <indonesia-japanese|japanese-indonesia> <text...>"
        ),
    };
    let text = args.collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        bail!("Usage: terjemah <indonesia-japanese|japanese-indonesia> <text...>");
    }

    let config = Config::from_env()?;
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(&config.database_path)?;
    let broker = TranslationBroker::new(db, build_adapters(&config))?;

    let outcome = broker.translate(&text, direction).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
