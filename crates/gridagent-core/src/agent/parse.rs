//! Free-text reply parsing for the reactive loop and plan extraction.

use std::sync::OnceLock;

use regex::Regex;

/// Structured view of one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub thought: String,
    pub tool: Option<String>,
    pub input: Option<String>,
}

const THOUGHT_FALLBACK_CHARS: usize = 200;

/// Parse a reply into `Thought:` / `Action:` / `Action Input:` sections.
///
/// Markers are matched case-insensitively; any section may be missing. A
/// missing thought falls back to the leading characters of the raw reply,
/// so a reply in no particular format still yields a usable thought and
/// no action.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let thought_at = find_marker(reply, "thought:");
    let action_at = find_marker(reply, "action:");
    let input_at = find_marker(reply, "action input:");

    let thought = match thought_at {
        Some((start, len)) => {
            let body_start = start + len;
            let body_end = [action_at, input_at]
                .into_iter()
                .flatten()
                .map(|(at, _)| at)
                .filter(|at| *at > start)
                .min()
                .unwrap_or(reply.len());
            reply[body_start..body_end].trim().to_string()
        }
        None => truncate_chars(reply.trim(), THOUGHT_FALLBACK_CHARS),
    };

    let tool = action_at.map(|(start, len)| {
        let body_start = start + len;
        let body_end = input_at
            .map(|(at, _)| at)
            .filter(|at| *at > body_start)
            .unwrap_or(reply.len());
        let line = reply[body_start..body_end]
            .lines()
            .next()
            .unwrap_or("")
            .trim();
        line.trim_matches(|c| c == '`' || c == '*').to_string()
    });
    let tool = tool.filter(|t| !t.is_empty());

    let input = input_at
        .map(|(start, len)| reply[start + len..].trim().to_string())
        .filter(|i| !i.is_empty());

    ParsedReply {
        thought,
        tool,
        input,
    }
}

/// Find an ASCII marker case-insensitively, returning (byte offset, len).
///
/// Only matches anchored at a line start (leading whitespace allowed), so
/// prose like "Reaction: positive" never reads as an `Action:` marker.
/// `"action:"` cannot false-match inside `"action input:"`; the colon
/// position differs, so the two searches are independent.
fn find_marker(text: &str, marker: &str) -> Option<(usize, usize)> {
    let haystack = text.as_bytes();
    let needle = marker.as_bytes();
    let mut at = 0;
    while at + needle.len() <= haystack.len() {
        if haystack[at..at + needle.len()].eq_ignore_ascii_case(needle)
            && line_anchored(haystack, at)
        {
            return Some((at, needle.len()));
        }
        at += 1;
    }
    None
}

/// True when everything between the previous newline (or start of text)
/// and `at` is whitespace.
fn line_anchored(haystack: &[u8], at: usize) -> bool {
    haystack[..at]
        .iter()
        .rev()
        .take_while(|b| **b != b'\n')
        .all(|b| b.is_ascii_whitespace())
}

/// Extract numbered plan steps (`1.` / `2)` markers at line starts).
///
/// Falls back to the whole text as a single step when no numbered lines
/// are present, so an unformatted plan still executes.
pub fn extract_plan_steps(plan: &str) -> Vec<String> {
    static STEP_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = STEP_RE.get_or_init(|| Regex::new(r"^\s*\d+\s*[.)]\s*(.+)$").ok());

    let steps: Vec<String> = match re {
        Some(re) => plan
            .lines()
            .filter_map(|line| {
                re.captures(line)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect(),
        None => Vec::new(),
    };

    if steps.is_empty() {
        let whole = plan.trim();
        if whole.is_empty() {
            Vec::new()
        } else {
            vec![whole.to_string()]
        }
    } else {
        steps
    }
}

/// Char-boundary-safe prefix truncation.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_react_reply() {
        let reply = "Thought: I should compute it\nAction: calculator\nAction Input: 6 * 7";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.thought, "I should compute it");
        assert_eq!(parsed.tool.as_deref(), Some("calculator"));
        assert_eq!(parsed.input.as_deref(), Some("6 * 7"));
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let reply = "THOUGHT: ok\nACTION: finish\nACTION INPUT: 42";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.tool.as_deref(), Some("finish"));
        assert_eq!(parsed.input.as_deref(), Some("42"));
    }

    #[test]
    fn test_missing_thought_falls_back_to_prefix() {
        let reply = "Action: think\nAction Input: step";
        let parsed = parse_reply(reply);
        assert!(parsed.thought.starts_with("Action: think"));
        assert_eq!(parsed.tool.as_deref(), Some("think"));
    }

    #[test]
    fn test_marker_inside_a_word_is_not_an_action() {
        let reply = "Reaction: positive. The run went well.";
        let parsed = parse_reply(reply);
        assert!(parsed.tool.is_none());
        assert_eq!(parsed.thought, reply);
    }

    #[test]
    fn test_marker_mid_line_is_not_an_action() {
        let reply = "Thought: my reaction: do nothing yet\nno action taken";
        let parsed = parse_reply(reply);
        assert!(parsed.tool.is_none());
        assert!(parsed.thought.starts_with("my reaction:"));
    }

    #[test]
    fn test_indented_marker_still_matches() {
        let reply = "Thought: t\n  Action: finish\nAction Input: done";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.tool.as_deref(), Some("finish"));
    }

    #[test]
    fn test_freeform_reply_has_no_action() {
        let reply = "The goal is achieved, nothing more to do.";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.thought, reply);
        assert!(parsed.tool.is_none());
        assert!(parsed.input.is_none());
    }

    #[test]
    fn test_long_freeform_thought_truncated() {
        let reply = "x".repeat(500);
        let parsed = parse_reply(&reply);
        assert_eq!(parsed.thought.chars().count(), 200);
    }

    #[test]
    fn test_action_line_stops_at_newline() {
        let reply = "Thought: t\nAction: write_file\nsome stray prose\nAction Input: a.txt :: hi";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.tool.as_deref(), Some("write_file"));
        assert_eq!(parsed.input.as_deref(), Some("a.txt :: hi"));
    }

    #[test]
    fn test_multiline_action_input_kept_whole() {
        let reply = "Action: write_file\nAction Input: code/a.py :: line1\nline2";
        let parsed = parse_reply(reply);
        assert_eq!(parsed.input.as_deref(), Some("code/a.py :: line1\nline2"));
    }

    #[test]
    fn test_numbered_plan_extraction() {
        let plan = "Here is the plan:\n1. Gather input\n2) Transform it\n 3. Write output\ndone";
        let steps = extract_plan_steps(plan);
        assert_eq!(steps, vec!["Gather input", "Transform it", "Write output"]);
    }

    #[test]
    fn test_unnumbered_plan_is_single_step() {
        let steps = extract_plan_steps("just do the whole thing at once");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0], "just do the whole thing at once");
    }

    #[test]
    fn test_empty_plan_has_no_steps() {
        assert!(extract_plan_steps("   \n  ").is_empty());
    }
}
