// src/classifier/dictionary.rs - Known toki pona words, loaded once at startup

use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use super::phonotactics::matches_strict;

/// Words below this share of speakers recognizing them are left out by default.
/// Rarely recognized words include nonstandard spellings that would break the
/// dictionary-implies-strict guarantee.
pub const DEFAULT_RECOGNITION_CUTOFF: f64 = 40.0;

const BUILTIN_WORDS: &str = include_str!("../../data/nimi.json");

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to fetch dictionary: {0}")]
    Fetch(String),
    #[error("dictionary contains no usable words")]
    Empty,
    #[error("invalid dictionary source: {0}")]
    InvalidSource(String),
}

/// Where the word list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionarySource {
    /// Snapshot compiled into the binary
    Builtin,
    File(PathBuf),
    Url(Url),
}

impl FromStr for DictionarySource {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DictionaryError::InvalidSource("empty source".to_string()));
        }
        if s.eq_ignore_ascii_case("builtin") {
            return Ok(DictionarySource::Builtin);
        }
        match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(DictionarySource::Url(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(DictionarySource::File)
                .map_err(|_| DictionaryError::InvalidSource(s.to_string())),
            Ok(url) if url.scheme().len() > 1 => Err(DictionaryError::InvalidSource(format!(
                "unsupported scheme '{}'",
                url.scheme()
            ))),
            // relative paths and Windows drive letters end up here
            _ => Ok(DictionarySource::File(PathBuf::from(s))),
        }
    }
}

/// Survey percentages appear both as numbers and as numeric strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Percent {
    Number(f64),
    Text(String),
}

impl Percent {
    fn value(&self) -> Option<f64> {
        match self {
            Percent::Number(n) => Some(*n),
            Percent::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    /// survey date (YYYY-MM) -> percent of respondents recognizing the word
    #[serde(default)]
    recognition: BTreeMap<String, Percent>,
}

impl Entry {
    /// The most recent survey result
    fn latest_recognition(&self) -> Option<f64> {
        self.recognition.values().next_back().and_then(Percent::value)
    }
}

/// Immutable set of known words
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    /// Build from a plain word list, no cutoff applied
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(|w| w.into().to_lowercase()).collect(),
        }
    }

    /// Parse a JSON object keyed by word, keeping words whose latest
    /// recognition is at least `cutoff` percent.
    pub fn from_json(json: &str, cutoff: f64) -> Result<Self, DictionaryError> {
        let entries: HashMap<String, Entry> = serde_json::from_str(json)?;
        let total = entries.len();
        let mut below_cutoff = 0;
        let mut words = HashSet::with_capacity(total);

        for (word, entry) in entries {
            let word = word.trim().to_lowercase();
            match entry.latest_recognition() {
                Some(r) if r >= cutoff => {}
                _ => {
                    below_cutoff += 1;
                    continue;
                }
            }
            if !matches_strict(&word) {
                warn!("Skipping dictionary word '{}': not phonotactically valid", word);
                continue;
            }
            words.insert(word);
        }

        if words.is_empty() {
            return Err(DictionaryError::Empty);
        }
        info!(
            "Loaded {} dictionary words ({} of {} below {}% recognition)",
            words.len(),
            below_cutoff,
            total,
            cutoff
        );
        Ok(Self { words })
    }

    /// The word list bundled with the crate
    pub fn builtin(cutoff: f64) -> Result<Self, DictionaryError> {
        Self::from_json(BUILTIN_WORDS, cutoff)
    }

    pub async fn load(source: &DictionarySource, cutoff: f64) -> Result<Self, DictionaryError> {
        match source {
            DictionarySource::Builtin => Self::builtin(cutoff),
            DictionarySource::File(path) => {
                debug!("Reading dictionary from {}", path.display());
                let json = tokio::fs::read_to_string(path).await?;
                Self::from_json(&json, cutoff)
            }
            DictionarySource::Url(url) => {
                let json = fetch(url).await?;
                Self::from_json(&json, cutoff)
            }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.words.contains(token)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}

#[cfg(feature = "remote_dictionary")]
async fn fetch(url: &Url) -> Result<String, DictionaryError> {
    info!("Fetching dictionary from {}", url);
    let response = reqwest::get(url.clone())
        .await
        .map_err(|e| DictionaryError::Fetch(e.to_string()))?;
    let response = response
        .error_for_status()
        .map_err(|e| DictionaryError::Fetch(e.to_string()))?;
    response
        .text()
        .await
        .map_err(|e| DictionaryError::Fetch(e.to_string()))
}

#[cfg(not(feature = "remote_dictionary"))]
async fn fetch(url: &Url) -> Result<String, DictionaryError> {
    Err(DictionaryError::Fetch(format!(
        "cannot fetch {}: built without the remote_dictionary feature",
        url
    )))
}
