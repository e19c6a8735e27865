//! Character-bounded truncation.

/// Marker appended to content cut down to a size ceiling.
pub const TRUNCATION_MARKER: &str = "\n\n[... truncated]";

/// Byte offset of the `chars`-th character, or `None` if `text` is shorter.
pub fn char_boundary(text: &str, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(0);
    }
    text.char_indices().nth(chars).map(|(idx, _)| idx)
}

/// Truncate `text` to at most `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// Returns `None` when the text already fits. Applying this to its own output
/// yields the same output.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> Option<String> {
    let cut = char_boundary(text, max_chars)?;
    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_MARKER);
    if out == text {
        return None;
    }
    Some(out)
}

/// Like [`truncate_with_marker`] but always returns an owned string.
pub fn cap_text(text: String, max_chars: usize) -> String {
    match truncate_with_marker(&text, max_chars) {
        Some(cut) => cut,
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_with_marker("hello", 10), None);
        assert_eq!(truncate_with_marker("hello", 5), None);
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let text = "é".repeat(20);
        let cut = truncate_with_marker(&text, 5).unwrap();
        assert!(cut.starts_with(&"é".repeat(5)));
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), 5 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn truncation_is_stable_when_reapplied() {
        let text = "x".repeat(100);
        let once = cap_text(text, 10);
        let twice = cap_text(once.clone(), 10);
        assert_eq!(once, twice);
    }
}
