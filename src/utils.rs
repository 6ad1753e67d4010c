/// Returns true if the haystack contains the needle, ignoring case.
///
/// ASCII needles take a byte-window fast path; anything else falls back to
/// Unicode lowercasing of both sides.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    if needle.is_ascii() {
        if needle.len() > haystack.len() {
            return false;
        }
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()));
    }

    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Cuts `text` to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
