//! Text helpers for bounding captured output and deriving safe file names.

/// Keep at most the last `max_chars` characters of `text`.
///
/// Output of failing tools carries the relevant error at the end, so the head
/// is dropped. A marker line records how much was cut.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    format!("[... {skip} characters truncated ...]\n{}", &text[start..])
}

/// Replace characters that are unsafe inside a `Content-Disposition` filename.
pub fn sanitize_filename_component(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim_matches('.');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_filename_component, tail_chars};

    #[test]
    fn tail_chars_keeps_short_text() {
        assert_eq!(tail_chars("hello", 10), "hello");
        assert_eq!(tail_chars("", 10), "");
    }

    #[test]
    fn tail_chars_keeps_the_end() {
        let out = tail_chars("abcdefghij", 4);
        assert!(out.ends_with("\nghij"), "unexpected tail: {out}");
        assert!(out.starts_with("[... 6 characters truncated ...]"));
    }

    #[test]
    fn tail_chars_respects_char_boundaries() {
        let out = tail_chars("ññññ", 2);
        assert!(out.ends_with("ññ"));
    }

    #[test]
    fn filename_component_strips_header_breaking_chars() {
        assert_eq!(
            sanitize_filename_component("4056301QJ3245N"),
            "4056301QJ3245N"
        );
        assert_eq!(sanitize_filename_component("a\"b\r\nc"), "a_b__c");
        assert_eq!(sanitize_filename_component("../x"), "_x");
        assert_eq!(sanitize_filename_component(".."), "report");
    }
}
