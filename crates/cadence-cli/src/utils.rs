//! Shared utilities

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// One-line preview of possibly multi-line text
pub fn preview(s: &str, max: usize) -> String {
    truncate_chars(&s.replace('\n', " "), max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("18°C clear", 4), "18°C...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_preview_flattens_lines() {
        assert_eq!(preview("a\nb", 10), "a b");
    }
}
