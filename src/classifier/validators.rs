// src/classifier/validators.rs - One token validator per tier

use std::sync::Arc;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::cache::MemoCache;
use super::dictionary::Dictionary;
use super::phonotactics::{matches_alphabet, matches_strict, LooseGrammar};
use super::token::collapse_duplicates;
use super::Tier;

/// Contract shared by every tier. Implementations must be pure: the same
/// token always yields the same answer, which is what makes memoization safe.
pub trait TokenValidator: Send + Sync {
    fn tier(&self) -> Tier;

    /// Judge an already cleaned token
    fn validate(&self, token: &str) -> bool;

    /// Whether the token cleaner should collapse repeated letters first.
    /// Scripts where doubled characters are meaningful turn this off.
    fn collapses_duplicates(&self) -> bool {
        true
    }
}

pub struct DictionaryValidator {
    dictionary: Arc<Dictionary>,
}

impl DictionaryValidator {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self { dictionary }
    }
}

impl TokenValidator for DictionaryValidator {
    fn tier(&self) -> Tier {
        Tier::Dictionary
    }

    fn validate(&self, token: &str) -> bool {
        self.dictionary.contains(token)
    }
}

pub struct StrictValidator;

impl TokenValidator for StrictValidator {
    fn tier(&self) -> Tier {
        Tier::Strict
    }

    fn validate(&self, token: &str) -> bool {
        matches_strict(token)
    }
}

pub struct LooseValidator {
    grammar: LooseGrammar,
}

impl LooseValidator {
    pub fn new(grammar: LooseGrammar) -> Self {
        Self { grammar }
    }
}

impl TokenValidator for LooseValidator {
    fn tier(&self) -> Tier {
        Tier::Loose
    }

    fn validate(&self, token: &str) -> bool {
        self.grammar.matches(token)
    }
}

pub struct AlphabeticValidator;

impl TokenValidator for AlphabeticValidator {
    fn tier(&self) -> Tier {
        Tier::Alphabetic
    }

    fn validate(&self, token: &str) -> bool {
        matches_alphabet(token)
    }
}

/// Latin text written with diacritics ("tóki", "pōna"). Decomposes, drops
/// combining marks, and checks the result against the loose grammar. Other
/// scripts are not transliterated and fail.
pub struct TransliterationValidator {
    grammar: LooseGrammar,
}

impl TransliterationValidator {
    pub fn new(grammar: LooseGrammar) -> Self {
        Self { grammar }
    }

    fn strip_marks(token: &str) -> String {
        token.nfkd().filter(|c| !is_combining_mark(*c)).collect()
    }
}

impl TokenValidator for TransliterationValidator {
    fn tier(&self) -> Tier {
        Tier::TranslitScript
    }

    fn validate(&self, token: &str) -> bool {
        let stripped = Self::strip_marks(token);
        if !stripped.is_ascii() {
            return false;
        }
        self.grammar.matches(&collapse_duplicates(&stripped))
    }

    fn collapses_duplicates(&self) -> bool {
        false
    }
}

/// Placeholder for sound-based matching; rejects everything until a real
/// implementation is registered through `ClassifierBuilder::with_validator`.
pub struct PhonemicValidator;

impl TokenValidator for PhonemicValidator {
    fn tier(&self) -> Tier {
        Tier::Phonemic
    }

    fn validate(&self, _token: &str) -> bool {
        false
    }

    fn collapses_duplicates(&self) -> bool {
        false
    }
}

/// Accepts a token when any concrete tier does, strongest first
pub struct FallbackValidator {
    ladder: Vec<Arc<dyn TokenValidator>>,
}

impl FallbackValidator {
    pub fn new(ladder: Vec<Arc<dyn TokenValidator>>) -> Self {
        Self { ladder }
    }
}

impl TokenValidator for FallbackValidator {
    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    fn validate(&self, token: &str) -> bool {
        self.ladder.iter().any(|v| {
            let cleaned = super::token::clean_token(token, !v.collapses_duplicates());
            v.validate(&cleaned)
        })
    }

    fn collapses_duplicates(&self) -> bool {
        false
    }
}

/// Wraps a validator with a bounded cache keyed by token
pub struct Memoized {
    inner: Arc<dyn TokenValidator>,
    cache: MemoCache,
}

impl Memoized {
    pub fn new(inner: Arc<dyn TokenValidator>, capacity: usize) -> Self {
        Self {
            inner,
            cache: MemoCache::new(capacity),
        }
    }

    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }
}

impl TokenValidator for Memoized {
    fn tier(&self) -> Tier {
        self.inner.tier()
    }

    fn validate(&self, token: &str) -> bool {
        self.cache.get_or_insert_with(token, || self.inner.validate(token))
    }

    fn collapses_duplicates(&self) -> bool {
        self.inner.collapses_duplicates()
    }
}
