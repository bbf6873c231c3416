// src/classifier/mod.rs - Decides whether a message is toki pona
//
// raw text -> SentenceCleaner -> tokenize -> filter_tokens
//          -> (clean_token -> TokenValidator) per token -> score

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod cleaner;
pub mod dictionary;
pub mod filter;
pub mod phonotactics;
pub mod scorer;
pub mod token;
pub mod tokenizer;
pub mod validators;

pub use cleaner::{CleanOptions, SentenceCleaner};
pub use dictionary::{Dictionary, DictionaryError, DictionarySource};
pub use scorer::{score, Verdict};
pub use validators::TokenValidator;

use phonotactics::LooseGrammar;
use validators::{
    AlphabeticValidator, DictionaryValidator, FallbackValidator, LooseValidator, Memoized,
    PhonemicValidator, StrictValidator, TransliterationValidator,
};

pub const DEFAULT_THRESHOLD: f64 = 0.9;
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("unknown verifier tier '{0}'")]
    UnknownTier(String),
    #[error("failed to compile pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Verifier tiers, from "rejects everything" through strongest to weakest
/// guarantee to "accepts everything". Deserializes through `FromStr`, so
/// config files take the same names and aliases as the environment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Tier {
    Fail,
    Dictionary,
    Strict,
    Loose,
    #[default]
    Alphabetic,
    TranslitScript,
    Phonemic,
    Fallback,
    Pass,
}

impl Tier {
    /// Concrete tiers tried by `Fallback`, strongest first. Correctness
    /// depends on this list, not on declaration order.
    pub const CASCADE: [Tier; 6] = [
        Tier::Dictionary,
        Tier::Strict,
        Tier::Loose,
        Tier::Alphabetic,
        Tier::TranslitScript,
        Tier::Phonemic,
    ];

    /// Tiers over ASCII input where acceptance is monotonic: whatever one tier
    /// accepts, every later tier accepts.
    pub const ASCII_LADDER: [Tier; 4] = [Tier::Dictionary, Tier::Strict, Tier::Loose, Tier::Alphabetic];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Fail => "fail",
            Tier::Dictionary => "dictionary",
            Tier::Strict => "strict",
            Tier::Loose => "loose",
            Tier::Alphabetic => "alphabetic",
            Tier::TranslitScript => "translit_script",
            Tier::Phonemic => "phonemic",
            Tier::Fallback => "fallback",
            Tier::Pass => "pass",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Tier::Fail),
            "dict" | "dictionary" => Ok(Tier::Dictionary),
            "strict" => Ok(Tier::Strict),
            "loose" | "ascii" => Ok(Tier::Loose),
            "alphabetic" => Ok(Tier::Alphabetic),
            "translit_script" | "translit" | "unidecode" => Ok(Tier::TranslitScript),
            "phonemic" => Ok(Tier::Phonemic),
            "fallback" => Ok(Tier::Fallback),
            "pass" => Ok(Tier::Pass),
            other => Err(ClassifierError::UnknownTier(other.to_string())),
        }
    }
}

impl TryFrom<String> for Tier {
    type Error = ClassifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Share of countable tokens that must validate, in (0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(p: f64) -> Result<Self, ClassifierError> {
        // NaN fails both comparisons
        if p > 0.0 && p <= 1.0 {
            Ok(Self(p))
        } else {
            Err(ClassifierError::InvalidThreshold(p))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

pub struct ClassifierBuilder {
    dictionary: Arc<Dictionary>,
    cache_capacity: usize,
    overrides: Vec<Arc<dyn TokenValidator>>,
}

impl ClassifierBuilder {
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Replace the built-in validator for `validator.tier()`; this is how the
    /// transliteration and phonemic tiers get real implementations.
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.overrides.push(validator);
        self
    }

    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let grammar = LooseGrammar::new()?;

        let mut concrete: HashMap<Tier, Arc<dyn TokenValidator>> = HashMap::new();
        concrete.insert(Tier::Dictionary, Arc::new(DictionaryValidator::new(Arc::clone(&self.dictionary))));
        concrete.insert(Tier::Strict, Arc::new(StrictValidator));
        concrete.insert(Tier::Loose, Arc::new(LooseValidator::new(grammar.clone())));
        concrete.insert(Tier::Alphabetic, Arc::new(AlphabeticValidator));
        concrete.insert(Tier::TranslitScript, Arc::new(TransliterationValidator::new(grammar)));
        concrete.insert(Tier::Phonemic, Arc::new(PhonemicValidator));
        for validator in self.overrides {
            concrete.insert(validator.tier(), validator);
        }

        let mut ladder: Vec<Arc<dyn TokenValidator>> = Vec::with_capacity(Tier::CASCADE.len());
        for tier in Tier::CASCADE {
            if let Some(v) = concrete.remove(&tier) {
                ladder.push(Arc::new(Memoized::new(v, self.cache_capacity)));
            }
        }
        let fallback: Arc<dyn TokenValidator> = Arc::new(Memoized::new(
            Arc::new(FallbackValidator::new(ladder.clone())),
            self.cache_capacity,
        ));

        Ok(Classifier {
            cleaner: SentenceCleaner::new()?,
            dictionary: self.dictionary,
            ladder,
            fallback,
        })
    }
}

/// Stateless apart from the read-only dictionary and the memo caches, so one
/// instance can be shared across tasks behind an `Arc`.
pub struct Classifier {
    cleaner: SentenceCleaner,
    dictionary: Arc<Dictionary>,
    /// Memoized validators in `Tier::CASCADE` order
    ladder: Vec<Arc<dyn TokenValidator>>,
    fallback: Arc<dyn TokenValidator>,
}

impl Classifier {
    pub fn builder(dictionary: Dictionary) -> ClassifierBuilder {
        ClassifierBuilder {
            dictionary: Arc::new(dictionary),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            overrides: Vec::new(),
        }
    }

    pub fn new(dictionary: Dictionary) -> Result<Self, ClassifierError> {
        Self::builder(dictionary).build()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Production entry point: default threshold, default tier, spoilers stripped
    pub fn is_toki_pona(&self, text: &str) -> bool {
        self.check(text, Threshold::default(), Tier::default(), CleanOptions::default())
    }

    /// Whether `text` is toki pona at `tier` with at least `p` of its
    /// countable words passing. Rejects a bad threshold instead of clamping.
    pub fn is_valid(&self, text: &str, p: f64, tier: Tier) -> Result<bool, ClassifierError> {
        Ok(self.check(text, Threshold::new(p)?, tier, CleanOptions::default()))
    }

    /// Like `is_toki_pona` at a chosen threshold and tier
    pub fn is_toki_pona_with(&self, text: &str, p: Threshold, tier: Tier) -> bool {
        self.check(text, p, tier, CleanOptions::default())
    }

    /// Like `is_valid`, with the tier given by name
    pub fn is_valid_named(&self, text: &str, p: f64, tier: &str) -> Result<bool, ClassifierError> {
        self.is_valid(text, p, tier.parse()?)
    }

    pub fn check(&self, text: &str, p: Threshold, tier: Tier, options: CleanOptions) -> bool {
        let tokens = self.countable_tokens(text, options);
        let valid = match tier {
            Tier::Fail => false,
            Tier::Pass => true,
            Tier::Fallback => Tier::CASCADE
                .iter()
                .any(|t| self.tally(&tokens, *t, p).map_or(false, |v| v.valid)),
            concrete => self.tally(&tokens, concrete, p).map_or(false, |v| v.valid),
        };
        debug!("Classified {} countable tokens at {}: {}", tokens.len(), tier, valid);
        valid
    }

    /// Full tally for one concrete tier; `None` for the pseudo tiers
    /// (`Fail`, `Fallback`, `Pass`).
    pub fn evaluate(&self, text: &str, p: Threshold, tier: Tier, options: CleanOptions) -> Option<Verdict> {
        let tokens = self.countable_tokens(text, options);
        self.tally(&tokens, tier, p)
    }

    /// Strongest concrete tier at which `text` passes
    pub fn strongest_tier(&self, text: &str, p: Threshold, options: CleanOptions) -> Option<Tier> {
        let tokens = self.countable_tokens(text, options);
        Tier::CASCADE
            .into_iter()
            .find(|t| self.tally(&tokens, *t, p).map_or(false, |v| v.valid))
    }

    /// Judge a single raw token at a tier, cleaning it the way sentences are
    pub fn validate_token(&self, token: &str, tier: Tier) -> bool {
        match tier {
            Tier::Fail => false,
            Tier::Pass => true,
            Tier::Fallback => self.fallback.validate(&token::clean_token(token, true)),
            concrete => self
                .validator(concrete)
                .map_or(false, |v| v.validate(&token::clean_token(token, !v.collapses_duplicates()))),
        }
    }

    /// Custom emoji tags in `text`; reaction lists are parsed with this
    pub fn emotes<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.cleaner.emotes(text)
    }

    fn countable_tokens(&self, text: &str, options: CleanOptions) -> Vec<String> {
        let cleaned = self.cleaner.clean(text, options);
        filter::filter_tokens(tokenizer::tokenize(&cleaned))
            .map(str::to_string)
            .collect()
    }

    fn validator(&self, tier: Tier) -> Option<&Arc<dyn TokenValidator>> {
        self.ladder.iter().find(|v| v.tier() == tier)
    }

    fn tally(&self, tokens: &[String], tier: Tier, p: Threshold) -> Option<Verdict> {
        let validator = self.validator(tier)?;
        let skip_dedup = !validator.collapses_duplicates();
        let failed = tokens
            .iter()
            .filter(|t| !validator.validate(&token::clean_token(t, skip_dedup)))
            .count();
        Some(Verdict::new(tier, failed, tokens.len(), p.get()))
    }
}
