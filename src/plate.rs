use once_cell::sync::Lazy;
use regex::Regex;

// Three alphanumerics, a hyphen, three alphanumerics. Whitespace may sit
// between the characters of a candidate, and the candidate must not touch
// another letter or digit on either side. Input is upper-cased first, so the
// classes only need A-Z.
static PLATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[^\p{Alphabetic}\p{N}])([A-Z0-9](?:\s*[A-Z0-9]){2}\s*-\s*[A-Z0-9](?:\s*[A-Z0-9]){2})(?:$|[^\p{Alphabetic}\p{N}])",
    )
    .expect("plate pattern compiles")
});

/// Returns the first `XXX-XXX` plate found in recognized text, if any.
///
/// Matching ignores case and whitespace inside a candidate, so `"ab c-123"`
/// yields `"ABC-123"`. Whitespace still separates words: in
/// `"car ABC-123 then XYZ-789"` the leftmost plate, `"ABC-123"`, wins.
pub fn extract_plate(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    let candidate = PLATE_PATTERN.captures(&upper)?.get(1)?;
    Some(
        candidate
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect(),
    )
}
