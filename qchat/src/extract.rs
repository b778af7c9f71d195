//! Best-effort JSON extraction from model output.
//!
//! Models asked for JSON routinely wrap it in reasoning spans, code fences,
//! or prose. The extractor strips `<think>...</think>` spans, unwraps fenced
//! blocks, and falls back to the substring between the first `{` and the
//! last `}`. Sanitizing already-minimal JSON is a no-op.

pub fn extract_json(input: &str) -> String {
    let without_think = strip_think_spans(input);
    let unfenced = unwrap_code_fence(&without_think);

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => unfenced[start..=end].to_string(),
        _ => unfenced.trim().to_string(),
    }
}

fn strip_think_spans(input: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open_at) = rest.find(OPEN) {
        output.push_str(&rest[..open_at]);
        let after_open = &rest[open_at + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(close_at) => rest = &after_open[close_at + CLOSE.len()..],
            // Unterminated span: drop everything after the opener.
            None => return output,
        }
    }

    output.push_str(rest);
    output
}

fn unwrap_code_fence(input: &str) -> String {
    let trimmed = input.trim();
    let Some(open_at) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_open = &trimmed[open_at + 3..];
    // Skip the info string ("json", "JSON", ...) on the opening line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let body_end = body.rfind("```").unwrap_or(body.len());

    body[..body_end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_passes_through_unchanged() {
        assert_eq!(extract_json("{\"result\": 100}"), "{\"result\": 100}");
    }

    #[test]
    fn think_spans_are_stripped() {
        let input = "<think>the user wants weather</think>{\"city\": \"Beijing\"}";
        assert_eq!(extract_json(input), "{\"city\": \"Beijing\"}");
    }

    #[test]
    fn unterminated_think_span_drops_the_tail() {
        let input = "{\"ok\": true}<think>still going";
        assert_eq!(extract_json(input), "{\"ok\": true}");
    }

    #[test]
    fn json_code_fences_are_unwrapped() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(input), "{\"a\": 1}");

        let bare_fence = "```\n{\"b\": 2}\n```";
        assert_eq!(extract_json(bare_fence), "{\"b\": 2}");
    }

    #[test]
    fn surrounding_prose_is_trimmed_to_the_braces() {
        let input = "Sure! Here is the JSON you asked for: {\"a\": [1, 2]} Hope that helps.";
        assert_eq!(extract_json(input), "{\"a\": [1, 2]}");
    }

    #[test]
    fn input_without_braces_is_returned_trimmed() {
        assert_eq!(extract_json("  not json at all  "), "not json at all");
    }

    #[test]
    fn sanitizing_twice_is_idempotent() {
        let input = "```json\n{\"nested\": {\"x\": 1}}\n```";
        let once = extract_json(input);
        assert_eq!(extract_json(&once), once);
    }
}
