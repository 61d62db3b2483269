//! Rubric scoring prompts and score extraction.
//!
//! The assistant is asked to answer with a flat JSON-like score map whose
//! `"total"` key holds the sum. Its output is not reliable, so extraction is a
//! tolerant pattern match that falls back to zero.

use std::sync::LazyLock;

use regex::Regex;

/// Matches `"total": 3`, `"total" : "3"`, and similar.
static TOTAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""total"\s*:\s*"?(\d+)"?"#).expect("total score pattern is valid")
});

/// Build the scoring request sent after the user's answer.
pub fn build_scoring_instructions(rubric: &str) -> String {
    format!(
        "Please score the user's previous response based on the following rubric: \n {rubric}\n\n\
         Please output your response as JSON, using this format: \
         {{ \"[criteria 1]\": \"[score 1]\", \"[criteria 2]\": \"[score 2]\", \"total\": \"[total score]\" }}"
    )
}

/// Pull the total score out of a scoring reply.
///
/// Returns the first `"total"` value found, or 0 when there is none (or it
/// does not fit in a `u32`). A missing score therefore always fails the
/// threshold check.
pub fn extract_score(text: &str) -> u32 {
    let Some(caps) = TOTAL_PATTERN.captures(text) else {
        tracing::debug!("No total found in scoring reply");
        return 0;
    };
    caps[1].parse().unwrap_or_else(|e| {
        tracing::warn!("Unusable total in scoring reply: {}", e);
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_embed_rubric_verbatim() {
        let rubric = "1. Credibility\n   2 points - compelling";
        let text = build_scoring_instructions(rubric);
        assert!(text.starts_with("Please score the user's previous response"));
        assert!(text.contains(rubric));
        assert!(text.contains(r#""total": "[total score]""#));
        assert!(text.find(rubric).unwrap() < text.find("output your response as JSON").unwrap());
    }

    #[test]
    fn extracts_quoted_total() {
        let text = r#"{"Organization Introduction": "1", "Credibility": "1", "total": "2"}"#;
        assert_eq!(extract_score(text), 2);
    }

    #[test]
    fn extracts_unquoted_total() {
        assert_eq!(extract_score(r#""total": 1"#), 1);
        assert_eq!(extract_score(r#"{"a": 2, "total": 17}"#), 17);
    }

    #[test]
    fn tolerates_whitespace_and_surrounding_text() {
        let text = "Here is my scoring:\n```json\n{\n  \"Credibility\": \"2\",\n  \"total\" :   \"4\"\n}\n```\nGood work overall.";
        assert_eq!(extract_score(text), 4);
    }

    #[test]
    fn first_total_wins() {
        let text = r#"{"total": "3"} and later {"total": 5}"#;
        assert_eq!(extract_score(text), 3);
    }

    #[test]
    fn missing_total_is_zero() {
        assert_eq!(extract_score(""), 0);
        assert_eq!(extract_score("I cannot score this response."), 0);
        assert_eq!(extract_score(r#"{"total": "n/a"}"#), 0);
        assert_eq!(extract_score(r#"{"Total": 4}"#), 0);
    }

    #[test]
    fn overflowing_total_is_zero() {
        assert_eq!(extract_score(r#""total": 99999999999999999999"#), 0);
    }
}
