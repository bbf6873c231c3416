// src/config/mod.rs - Process configuration for the moderation bot

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::classifier::dictionary::DEFAULT_RECOGNITION_CUTOFF;
use crate::classifier::{DictionarySource, Threshold, Tier, DEFAULT_CACHE_CAPACITY, DEFAULT_THRESHOLD};

pub const CONFIG_PATH_ENV: &str = "TENPO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/tenpo.yaml";

/// Emoji used when an author has not picked their own
pub const DEFAULT_REACTS: [&str; 8] = ["🌵", "🌲", "🌳", "🍀", "🍃", "🌿", "🌱", "🌴"];

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfiguration {
    pub classifier: ClassifierSettings,
    pub dictionary: DictionarySettings,
    pub moderation: ModerationSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Share of countable words that must pass, in (0, 1]
    pub threshold: f64,
    pub tier: Tier,
    /// Memo entries per tier; 0 disables memoization
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionarySettings {
    /// "builtin", a file path, or an http(s) URL
    pub source: String,
    /// Minimum recognition percentage for a word to be loaded
    pub recognition_cutoff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub default_reacts: Vec<String>,
    /// How many reacts to try before giving up on a message
    pub react_attempts: u32,
    /// Reacts users may not choose
    pub banned_reacts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON snapshot of per-guild and per-user settings; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            dictionary: DictionarySettings::default(),
            moderation: ModerationSettings::default(),
            logging: LoggingSettings::default(),
            store: StoreSettings {
                snapshot_path: Some(PathBuf::from("data/tenpo-store.json")),
            },
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            tier: Tier::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            source: "builtin".to_string(),
            recognition_cutoff: DEFAULT_RECOGNITION_CUTOFF,
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            default_reacts: DEFAULT_REACTS.iter().map(|r| r.to_string()).collect(),
            react_attempts: 5,
            banned_reacts: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BotConfiguration {
    /// Load from `TENPO_CONFIG`, or the default path
    pub async fn load_from_env() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML or TOML file, chosen by extension. A missing file is
    /// created with defaults first.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file not found, creating default: {}", path.display());
            Self::create_default(path).await?;
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = if is_toml(path) {
            toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))?
        };

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    async fn create_default(path: &Path) -> Result<()> {
        let config = Self::default();
        let content = if is_toml(path) {
            toml::to_string_pretty(&config).context("Failed to serialize default config")?
        } else {
            serde_yaml::to_string(&config).context("Failed to serialize default config")?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write default config to: {}", path.display()))?;

        info!("Created default configuration at: {}", path.display());
        Ok(())
    }

    /// `TENPO_THRESHOLD`, `TENPO_TIER`, `TENPO_DICTIONARY` and `TENPO_LOG_LEVEL`
    /// take precedence over the file
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(threshold) = env::var("TENPO_THRESHOLD") {
            self.classifier.threshold = threshold
                .parse()
                .with_context(|| format!("TENPO_THRESHOLD is not a number: {}", threshold))?;
        }
        if let Ok(tier) = env::var("TENPO_TIER") {
            self.classifier.tier = tier.parse().context("TENPO_TIER is not a known tier")?;
        }
        if let Ok(source) = env::var("TENPO_DICTIONARY") {
            self.dictionary.source = source;
        }
        if let Ok(level) = env::var("TENPO_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        Threshold::new(self.classifier.threshold).context("Invalid classifier threshold")?;
        self.dictionary_source()?;
        if !(0.0..=100.0).contains(&self.dictionary.recognition_cutoff) {
            anyhow::bail!(
                "Recognition cutoff must be between 0 and 100, got {}",
                self.dictionary.recognition_cutoff
            );
        }
        if self.moderation.default_reacts.is_empty() {
            anyhow::bail!("At least one default react is required");
        }
        if let Some(banned) = self
            .moderation
            .default_reacts
            .iter()
            .find(|r| self.moderation.banned_reacts.contains(r))
        {
            anyhow::bail!("Default react {} is also banned", banned);
        }
        if self.moderation.react_attempts == 0 {
            anyhow::bail!("react_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn threshold(&self) -> Result<Threshold> {
        Ok(Threshold::new(self.classifier.threshold)?)
    }

    pub fn dictionary_source(&self) -> Result<DictionarySource> {
        self.dictionary
            .source
            .parse()
            .with_context(|| format!("Invalid dictionary source: {}", self.dictionary.source))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("toml"))
}
