//! Deterministic summary used when no backend answers.

const MAX_WORDS: usize = 40;
const SUFFIX: &str = " (fallback summary)";

/// Text of at most 40 words is returned unchanged; longer text is cut to its
/// first 40 words, joined by single spaces, and marked as a fallback.
pub fn fallback_summary(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= MAX_WORDS {
        return text.to_string();
    }
    format!("{}{}", words[..MAX_WORDS].join(" "), SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(fallback_summary("hello world"), "hello world");
        let forty = vec!["w"; 40].join("  ");
        assert_eq!(fallback_summary(&forty), forty);
    }

    #[test]
    fn test_long_text_truncated() {
        let text = (1..=41).map(|i| format!("w{}", i)).collect::<Vec<_>>().join("\n ");
        let expected = format!(
            "{} (fallback summary)",
            (1..=40).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
        );
        assert_eq!(fallback_summary(&text), expected);
    }
}
