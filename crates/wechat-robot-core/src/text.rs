pub fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    let len = s.len();
    if index >= len {
        return len;
    }

    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }

    index
}

/// Cut `text` to at most `max_bytes` bytes without splitting a character.
/// An ellipsis marker is appended when anything was dropped and it fits.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    const MARKER: &str = "...";
    if max_bytes < MARKER.len() {
        return text[..floor_char_boundary(text, max_bytes)].to_string();
    }
    let cut = floor_char_boundary(text, max_bytes - MARKER.len());
    format!("{}{MARKER}", &text[..cut])
}

/// Keep only ASCII alphanumerics, up to `max_len` characters.
pub fn ascii_alnum_prefix(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(max_len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_char_boundary_on_multibyte() {
        let s = "你好";
        assert_eq!(floor_char_boundary(s, 1), 0);
        assert_eq!(floor_char_boundary(s, 4), 3);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }

    #[test]
    fn test_truncate_utf8_short_text_untouched() {
        assert_eq!(truncate_utf8("hello", 2048), "hello");
    }

    #[test]
    fn test_truncate_utf8_respects_limit_and_boundary() {
        let text = "机器人".repeat(1000);
        let out = truncate_utf8(&text, 2048);
        assert!(out.len() <= 2048);
        assert!(out.ends_with("..."));
        assert!(out.trim_end_matches("...").chars().all(|c| "机器人".contains(c)));
    }

    #[test]
    fn test_truncate_utf8_tiny_limit() {
        assert_eq!(truncate_utf8("abcdef", 2), "ab");
    }

    #[test]
    fn test_ascii_alnum_prefix() {
        assert_eq!(
            ascii_alnum_prefix("oAbC-12_xyz", 32),
            "oAbC12xyz".to_string()
        );
        assert_eq!(ascii_alnum_prefix("abcdef", 3), "abc");
        assert_eq!(ascii_alnum_prefix("--__", 32), "");
    }
}
