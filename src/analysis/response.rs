//! Turning a model's reply text into an `AnalysisResult`.
//!
//! Models are told to answer with bare JSON but often wrap it in code
//! fences or prose. Anything we can't read as JSON is kept verbatim as the
//! summary rather than treated as an error.

use super::AnalysisResult;
use serde_json::Value;

/// Parse reply text into a result. Never fails.
pub fn parse_response(raw: &str) -> AnalysisResult {
    let clean = strip_code_fences(raw);

    let parsed = serde_json::from_str::<Value>(&clean).ok().or_else(|| {
        first_object(&clean).and_then(|span| serde_json::from_str::<Value>(span).ok())
    });

    match parsed.as_ref().and_then(AnalysisResult::from_json) {
        Some(result) => {
            if result.is_empty() {
                log::warn!("[ANALYSIS] Reply JSON had no summary/text/code fields");
            }
            result
        }
        None => {
            log::debug!("[ANALYSIS] Reply is not a JSON object, using raw text as summary");
            AnalysisResult {
                summary: Some(raw.to_string()),
                ..AnalysisResult::default()
            }
        }
    }
}

/// Strip markdown code fences from reply text.
///
/// The opening fence line and its language tag are dropped. A missing
/// closing fence is tolerated.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(after_fence) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = after_fence
        .split_once('\n')
        .map_or(after_fence, |(_tag, body)| body)
        .trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// First balanced `{...}` span in `text`, ignoring braces inside strings.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_summary() {
        let result = parse_response("hello");
        assert_eq!(result.summary.as_deref(), Some("hello"));
        assert!(result.text.is_none());
        assert!(result.code.is_none());
    }

    #[test]
    fn all_fields_parsed() {
        let result = parse_response(r#"{"summary":"s","text":"t","code":"c"}"#);
        assert_eq!(result.summary.as_deref(), Some("s"));
        assert_eq!(result.text.as_deref(), Some("t"));
        assert_eq!(result.code.as_deref(), Some("c"));
    }

    #[test]
    fn description_is_summary_synonym() {
        let result = parse_response(r#"{"description":"a login form"}"#);
        assert_eq!(result.summary.as_deref(), Some("a login form"));
    }

    #[test]
    fn summary_wins_over_description() {
        let result = parse_response(r#"{"summary":"one","description":"two"}"#);
        assert_eq!(result.summary.as_deref(), Some("one"));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let result = parse_response("```json\n{\"text\": \"line 1\"}\n```");
        assert_eq!(result.text.as_deref(), Some("line 1"));
    }

    #[test]
    fn json_inside_prose_is_found() {
        let result = parse_response(r#"Sure! Here you go: {"code": "fn main() {}"} Hope it helps."#);
        assert_eq!(result.code.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn non_string_fields_are_ignored() {
        let result = parse_response(r#"{"summary": 42, "text": "ok"}"#);
        assert!(result.summary.is_none());
        assert_eq!(result.text.as_deref(), Some("ok"));
    }

    #[test]
    fn json_scalar_is_raw_summary() {
        let result = parse_response("\"quoted\"");
        assert_eq!(result.summary.as_deref(), Some("\"quoted\""));
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_object() {
        assert_eq!(
            first_object(r#"see {"a": "}{\"}", "b": {"c": 1}} after"#),
            Some(r#"{"a": "}{\"}", "b": {"c": 1}}"#)
        );
        assert_eq!(first_object("no braces here"), None);
        assert_eq!(first_object("{ never closed"), None);
    }

    #[test]
    fn strip_fences_drops_language_tag() {
        assert_eq!(strip_code_fences("```JSON\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("```\n{}```"), "{}");
    }

    #[test]
    fn strip_fences_without_closer() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }
}
