// src/classifier/filter.rs - Drops tokens that should never count toward a score

/// Short tokens that are tolerated in otherwise toki pona text. Filtered out
/// before counting, the same way proper names are.
pub const COMMON_ALLOWABLES: [&str; 2] = ["msa", "cw"];

/// Entirely alphabetic; also rejects the empty string
pub fn is_alphabetic(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphabetic)
}

/// True when the token is exactly its own capitalized form: an uppercase
/// first letter followed only by lowercase letters. Single uppercase letters
/// ("B", "M") qualify too.
pub fn is_capitalized(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => chars.all(|c| !c.is_uppercase()),
        _ => false,
    }
}

pub fn is_common_allowable(token: &str) -> bool {
    let lowered = token.to_lowercase();
    COMMON_ALLOWABLES.contains(&lowered.as_str())
}

/// Keep only tokens that count: alphabetic, not name-like, not an allowable.
/// The alphabetic check must come first; the others assume letters.
pub fn filter_tokens<'a, I>(tokens: I) -> impl Iterator<Item = &'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .filter(|t| is_alphabetic(t))
        .filter(|t| !is_capitalized(t))
        .filter(|t| !is_common_allowable(t))
}
