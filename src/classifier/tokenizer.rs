// src/classifier/tokenizer.rs - Splits a cleaned sentence into candidate words

/// Sentence-terminal punctuation; a token boundary is placed right before each.
pub const TERMINALS: [char; 5] = ['.', '?', '!', ';', ':'];

fn is_terminal(c: char) -> bool {
    TERMINALS.contains(&c)
}

/// Split on whitespace runs and immediately before terminal punctuation.
///
/// The iterator is lazy and cheap to clone, so it can be restarted. It never
/// yields empty strings; punctuation remnants such as `"."` or `"!!"` are
/// yielded as their own tokens and dropped later by the token filter.
pub fn tokenize(sentence: &str) -> Tokens<'_> {
    Tokens { rest: sentence }
}

#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }

        // The first character always belongs to the token, even when it is a
        // terminal; the boundary sits before it, not after.
        let mut end = trimmed.len();
        for (i, c) in trimmed.char_indices().skip(1) {
            if c.is_whitespace() || is_terminal(c) {
                end = i;
                break;
            }
        }

        let (token, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(token)
    }
}
