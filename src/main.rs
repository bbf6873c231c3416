use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;

use tenpo::config::BotConfiguration;
use tenpo::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the config reads its overrides
    dotenv::dotenv().ok();
    let config = BotConfiguration::load_from_env().await?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level)).init();
    info!("Starting tenpo v{}", tenpo::VERSION);

    let source = config.dictionary_source()?;
    let dictionary = match Dictionary::load(&source, config.dictionary.recognition_cutoff).await {
        Ok(dictionary) => dictionary,
        Err(e) => {
            error!("Failed to load dictionary from {}: {}", config.dictionary.source, e);
            return Err(e).context("Dictionary is required");
        }
    };
    info!("Loaded {} dictionary words", dictionary.len());

    let classifier = Arc::new(
        Classifier::builder(dictionary)
            .cache_capacity(config.classifier.cache_capacity)
            .build()
            .context("Failed to build classifier")?,
    );

    let store = Arc::new(match &config.store.snapshot_path {
        Some(path) => MemoryStore::open(path).await?,
        None => MemoryStore::new(),
    });

    let mut platform = ConsolePlatform::new(ConsoleConfig::default()).with_store(store.clone());
    platform.seed_rules().await.context("Failed to seed console rules")?;
    platform.connect().await.context("Failed to connect to console")?;
    let receiver = platform
        .get_event_receiver()
        .context("Console produced no event stream")?;
    let platform: Arc<dyn PlatformConnection> = Arc::new(platform);

    let gate = Arc::new(Gate::new(
        store.clone(),
        classifier,
        config.threshold()?,
        config.classifier.tier,
    ));
    let moderator = Arc::new(Moderator::new(platform.clone(), store.clone(), config.moderation.clone()));
    let bot = Arc::new(TenpoBot::new(gate, moderator));

    info!(
        "Checking {} at threshold {} via {}",
        config.classifier.tier,
        config.classifier.threshold,
        platform.platform_name()
    );
    bot.run(receiver).await?;

    if let Err(e) = platform.disconnect().await {
        error!("Error disconnecting from {}: {}", platform.platform_name(), e);
    }
    store.save_snapshot().await?;

    info!("tenpo shutdown complete");
    Ok(())
}
