// src/classifier/cleaner.rs - Strips spans of a message that are never judged

use regex::Regex;

use super::ClassifierError;

/// Code blocks first, then inline code. Both may span lines.
const CODE_RE: &str = r"(?s)```.*?```|`[^`]+`";
const SPOILERS_RE: &str = r"\|\|([^|]+)\|\|";
const QUOTES_RE: &str = r#""[^"]+"|'[^']+'|“[^”]+”|‘[^’]+’"#;
/// Discord blockquote lines and anything wrapped in arrows: mentions,
/// channel links, suppressed links.
const REFERENCES_RE: &str = r"(?m)^>.*$|<[^<>\s]*>";
const URLS_RE: &str = r"[a-zA-Z][a-zA-Z0-9+.\-]*://\S+";
const EMOTES_RE: &str = r"<a?:\w+:\d+>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    /// Replace `||spoiler||` spans instead of judging them
    pub strip_spoilers: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self { strip_spoilers: true }
    }
}

/// Compiled sentence cleaners, applied in a fixed order
#[derive(Debug, Clone)]
pub struct SentenceCleaner {
    code: Regex,
    spoilers: Regex,
    quotes: Regex,
    references: Regex,
    urls: Regex,
    emotes: Regex,
}

impl SentenceCleaner {
    pub fn new() -> Result<Self, ClassifierError> {
        Ok(Self {
            code: Regex::new(CODE_RE)?,
            spoilers: Regex::new(SPOILERS_RE)?,
            quotes: Regex::new(QUOTES_RE)?,
            references: Regex::new(REFERENCES_RE)?,
            urls: Regex::new(URLS_RE)?,
            emotes: Regex::new(EMOTES_RE)?,
        })
    }

    /// Replace every unjudged span with a single space.
    ///
    /// Code and spoiler spans go before quotes so that a stray quote inside a
    /// spoiler cannot pair with one outside of it.
    pub fn clean(&self, sentence: &str, options: CleanOptions) -> String {
        let mut s = self.code.replace_all(sentence, " ").into_owned();
        let spoilers = if options.strip_spoilers { " " } else { " ${1} " };
        s = self.spoilers.replace_all(&s, spoilers).into_owned();
        for cleaner in [&self.quotes, &self.references, &self.urls, &self.emotes] {
            s = cleaner.replace_all(&s, " ").into_owned();
        }
        s
    }

    /// Custom emoji tags found in `s`, e.g. `<:pona:1234>`
    pub fn emotes<'a>(&self, s: &'a str) -> Vec<&'a str> {
        self.emotes.find_iter(s).map(|m| m.as_str()).collect()
    }
}
