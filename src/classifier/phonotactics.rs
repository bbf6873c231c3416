// src/classifier/phonotactics.rs - Syllable grammars of toki pona
//
// Strict:  ( V@start | [klmnps]V | [jt][aeou] | w[aei] ) ( n not before m/n )?  repeated, or "n"
// Loose:   C?V n? ( C V n? )*, or "n"
// Alphabet: a e i o u j k l m n p s t w

use regex::Regex;

use super::ClassifierError;

pub const VOWELS: &str = "aeiou";
pub const CONSONANTS: &str = "jklmnpstw";

const LOOSE_RE: &str = r"^(?:[jklmnpstw]?[aeiou]n?)(?:[jklmnpstw][aeiou]n?)*$|^n$";

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u')
}

/// Onsets that may precede a vowel under the strict grammar. "wo", "wu",
/// "ji" and "ti" are excluded.
fn is_strict_onset(consonant: u8, vowel: u8) -> bool {
    match consonant {
        b'k' | b'l' | b'm' | b'n' | b'p' | b's' => is_vowel(vowel),
        b'j' | b't' => matches!(vowel, b'a' | b'e' | b'o' | b'u'),
        b'w' => matches!(vowel, b'a' | b'e' | b'i'),
        _ => false,
    }
}

/// Strict phonotactic match, written as a small automaton over syllable
/// boundaries since the `n(?![mn])` coda needs lookahead.
///
/// `starts[i]` records that a syllable may begin at byte `i`; the token
/// matches when the end of input is reachable.
pub fn matches_strict(token: &str) -> bool {
    if token == "n" {
        return true;
    }
    let b = token.as_bytes();
    let len = b.len();
    if len == 0 || !token.is_ascii() {
        return false;
    }

    let mut starts = vec![false; len + 1];
    starts[0] = true;
    for i in 0..len {
        if !starts[i] {
            continue;
        }

        let nucleus_end = if i == 0 && is_vowel(b[0]) {
            1
        } else if i + 1 < len && is_strict_onset(b[i], b[i + 1]) {
            i + 2
        } else {
            continue;
        };

        starts[nucleus_end] = true;
        if nucleus_end < len && b[nucleus_end] == b'n' {
            let next = b.get(nucleus_end + 1);
            if !matches!(next, Some(b'm') | Some(b'n')) {
                starts[nucleus_end + 1] = true;
            }
        }
    }
    starts[len]
}

/// Every character belongs to the 14 letter alphabet
pub fn matches_alphabet(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| VOWELS.contains(c) || CONSONANTS.contains(c))
}

/// Loose phonotactic grammar, compiled once and shared
#[derive(Debug, Clone)]
pub struct LooseGrammar {
    pattern: Regex,
}

impl LooseGrammar {
    pub fn new() -> Result<Self, ClassifierError> {
        Ok(Self {
            pattern: Regex::new(LOOSE_RE)?,
        })
    }

    pub fn matches(&self, token: &str) -> bool {
        self.pattern.is_match(token)
    }
}
