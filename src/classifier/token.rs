// src/classifier/token.rs - Token normalization ahead of validation

/// Lowercase, then collapse every run of identical characters to one, so
/// "wileeeee" becomes "wile". Lowercasing must come first: "aAAAa" has to
/// collapse to "a".
pub fn clean_token(token: &str, skip_dedup: bool) -> String {
    let lowered = token.to_lowercase();
    if skip_dedup {
        return lowered;
    }
    collapse_duplicates(&lowered)
}

pub fn collapse_duplicates(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev = None;
    for c in s.chars() {
        if prev != Some(c) {
            result.push(c);
        }
        prev = Some(c);
    }
    result
}
