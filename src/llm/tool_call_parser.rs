//! Recovery of structured tool calls from free-form model text.
//!
//! Backends without native tool calling (CLI tools, some local models) still
//! describe tool invocations in their answers, either as JSON or as
//! `<tool_call>` markup. [`extract_tool_calls`] tries, in order:
//!
//! 1. JSON: the whole text, fenced code blocks, then a balanced `{...}` span
//!    around the first `"tool_calls"` / `"toolCalls"` key.
//! 2. Tags: `<tool_call>name<arg_key>k</arg_key><arg_value>v</arg_value></tool_call>`.
//!
//! An opening tag without a closing tag is reported as truncated so callers can
//! ask the model to continue instead of treating the answer as plain text.
//! Calls that closed before the cut are still returned, flagged as truncated.

use crate::llm::types::{ToolArguments, ToolCall, coerce_arguments};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::ops::Range;
use std::sync::LazyLock;
use uuid::Uuid;

const OPEN_TAG: &str = "<tool_call";
const CLOSE_TAG: &str = "</tool_call>";
const JSON_KEYS: [&str; 2] = ["\"tool_calls\"", "\"toolCalls\""];

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static ARG_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<arg_key>(.*?)</arg_key>\s*<arg_value>(.*?)</arg_value>")
        .expect("valid regex")
});

static NUMBER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?$").expect("valid regex")
});

/// Outcome of [`extract_tool_calls`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallExtraction {
    /// At least one call was recovered; `cleaned_content` is the input with
    /// the matched markup removed. `truncated` is set when a later tag never
    /// closed; its partial markup is dropped from `cleaned_content`.
    Found {
        tool_calls: Vec<ToolCall>,
        cleaned_content: String,
        truncated: bool,
    },
    /// The text looked like tool-call markup but nothing could be parsed.
    Malformed { truncated: bool },
    /// No tool-call markup at all.
    Absent,
}

impl ToolCallExtraction {
    pub fn is_found(&self) -> bool {
        matches!(self, ToolCallExtraction::Found { .. })
    }

    pub fn is_truncated(&self) -> bool {
        matches!(
            self,
            ToolCallExtraction::Malformed { truncated: true }
                | ToolCallExtraction::Found {
                    truncated: true,
                    ..
                }
        )
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ToolCallExtraction::Found { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Cheap check for tool-call markup; a `true` here is worth a full parse.
pub fn looks_like_tool_call_markup(text: &str) -> bool {
    text.contains(OPEN_TAG) || JSON_KEYS.iter().any(|key| text.contains(key))
}

pub fn extract_tool_calls(text: &str) -> ToolCallExtraction {
    if let Some((tool_calls, span)) = extract_json(text) {
        let cleaned_content = remove_spans(text, std::slice::from_ref(&span));
        return ToolCallExtraction::Found {
            tool_calls,
            cleaned_content,
            truncated: false,
        };
    }

    match extract_tagged(text) {
        TagOutcome::Parsed {
            calls,
            spans,
            truncated,
        } => {
            return ToolCallExtraction::Found {
                tool_calls: calls,
                cleaned_content: remove_spans(text, &spans),
                truncated,
            };
        }
        TagOutcome::Truncated => return ToolCallExtraction::Malformed { truncated: true },
        TagOutcome::Unparseable | TagOutcome::NoTags => {}
    }

    if looks_like_tool_call_markup(text) {
        ToolCallExtraction::Malformed { truncated: false }
    } else {
        ToolCallExtraction::Absent
    }
}

fn extract_json(text: &str) -> Option<(Vec<ToolCall>, Range<usize>)> {
    json_candidates(text).into_iter().find_map(|(parse, span)| {
        let value: Value = serde_json::from_str(&text[parse]).ok()?;
        let calls = coerce_tool_calls(&value);
        (!calls.is_empty()).then_some((calls, span))
    })
}

/// Candidate substrings as (range to parse, range to remove on success).
fn json_candidates(text: &str) -> Vec<(Range<usize>, Range<usize>)> {
    let mut candidates = Vec::new();

    let leading = text.len() - text.trim_start().len();
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let whole = leading..leading + trimmed.len();
        candidates.push((whole.clone(), whole));
    }

    for captures in FENCED_BLOCK.captures_iter(text) {
        let language = captures.get(1).map_or("", |m| m.as_str());
        if !(language.is_empty() || language.eq_ignore_ascii_case("json")) {
            continue;
        }
        if let (Some(block), Some(body)) = (captures.get(0), captures.get(2)) {
            candidates.push((body.range(), block.range()));
        }
    }

    let key_pos = JSON_KEYS.iter().filter_map(|key| text.find(key)).min();
    if let Some(key_pos) = key_pos
        && let Some(span) = enclosing_object(text, key_pos)
    {
        candidates.push((span.clone(), span));
    }

    candidates
}

/// Innermost balanced `{...}` that contains `pos`.
fn enclosing_object(text: &str, pos: usize) -> Option<Range<usize>> {
    text[..pos]
        .char_indices()
        .rev()
        .filter(|&(_, ch)| ch == '{')
        .find_map(|(start, _)| {
            balanced_object_end(text, start)
                .filter(|&end| end > pos)
                .map(|end| start..end)
        })
}

/// Byte offset one past the `}` matching the `{` at `start`.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn coerce_tool_calls(value: &Value) -> Vec<ToolCall> {
    match value {
        Value::Array(items) => items.iter().filter_map(coerce_call).collect(),
        Value::Object(map) => match map.get("tool_calls").or_else(|| map.get("toolCalls")) {
            Some(Value::Array(items)) => items.iter().filter_map(coerce_call).collect(),
            Some(single @ Value::Object(_)) => coerce_call(single).into_iter().collect(),
            Some(_) => Vec::new(),
            None if map.contains_key("function")
                || (map.contains_key("name") && map.contains_key("arguments")) =>
            {
                coerce_call(value).into_iter().collect()
            }
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Accepts `{name, arguments}` and `{function: {name, arguments}}`.
fn coerce_call(value: &Value) -> Option<ToolCall> {
    let object = value.as_object()?;
    let source = object
        .get("function")
        .and_then(Value::as_object)
        .unwrap_or(object);

    let name = source.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(synthesized_id);

    Some(ToolCall::new(id, name, coerce_arguments(source.get("arguments"))))
}

fn synthesized_id() -> String {
    format!("parsed-{}", Uuid::new_v4())
}

enum TagOutcome {
    Parsed {
        calls: Vec<ToolCall>,
        spans: Vec<Range<usize>>,
        truncated: bool,
    },
    Truncated,
    Unparseable,
    NoTags,
}

fn extract_tagged(text: &str) -> TagOutcome {
    if !text.contains(OPEN_TAG) {
        return TagOutcome::NoTags;
    }
    if !text.contains(CLOSE_TAG) {
        return TagOutcome::Truncated;
    }

    let mut calls = Vec::new();
    let mut spans = Vec::new();
    let mut truncated = false;
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(OPEN_TAG) {
        let open = cursor + found;
        let close = text[open..]
            .find('>')
            .map(|i| open + i + 1)
            .and_then(|tag_end| {
                text[tag_end..]
                    .find(CLOSE_TAG)
                    .map(|i| (tag_end, tag_end + i))
            });
        let Some((tag_end, close)) = close else {
            truncated = true;
            spans.push(open..text.len());
            break;
        };

        if let Some(call) = parse_tag_body(&text[tag_end..close]) {
            calls.push(call);
        }
        let span_end = close + CLOSE_TAG.len();
        spans.push(open..span_end);
        cursor = span_end;
    }

    match (calls.is_empty(), truncated) {
        (true, true) => TagOutcome::Truncated,
        (true, false) => TagOutcome::Unparseable,
        (false, _) => TagOutcome::Parsed {
            calls,
            spans,
            truncated,
        },
    }
}

fn parse_tag_body(body: &str) -> Option<ToolCall> {
    let trimmed = body.trim();
    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
    {
        return coerce_call(&value);
    }

    let head = &body[..body.find('<').unwrap_or(body.len())];
    let name = head.trim().lines().next().unwrap_or("").trim();
    if name.is_empty() {
        return None;
    }

    let mut arguments = ToolArguments::new();
    for captures in ARG_PAIR.captures_iter(body) {
        let key = captures.get(1).map_or("", |m| m.as_str()).trim();
        let value = captures.get(2).map_or("", |m| m.as_str());
        if !key.is_empty() {
            arguments.insert(key.to_string(), parse_literal(value));
        }
    }

    Some(ToolCall::new(synthesized_id(), name, arguments))
}

/// Small literal grammar for tag argument values.
fn parse_literal(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if NUMBER_LITERAL.is_match(trimmed) {
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::from(int);
        }
        if let Ok(float) = trimmed.parse::<f64>()
            && let Some(number) = serde_json::Number::from_f64(float)
        {
            return Value::Number(number);
        }
    }

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
    {
        return value;
    }

    Value::String(trimmed.to_string())
}

fn remove_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut last = 0;
    for span in spans {
        cleaned.push_str(&text[last..span.start]);
        last = span.end;
    }
    cleaned.push_str(&text[last..]);
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn found(text: &str) -> (Vec<ToolCall>, String) {
        match extract_tool_calls(text) {
            ToolCallExtraction::Found {
                tool_calls,
                cleaned_content,
                truncated: false,
            } => (tool_calls, cleaned_content),
            other => panic!("expected tool calls in {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_whole_text_json() {
        let (calls, cleaned) =
            found(r#"{"tool_calls":[{"name":"search","arguments":{"q":"x"}}]}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["q"], "x");
        assert!(calls[0].id.starts_with("parsed-"));
        assert_eq!(cleaned, "");
    }

    #[test]
    fn test_nested_function_shape_with_string_arguments() {
        let text = r#"[{"id":"call_9","function":{"name":"read","arguments":"{\"path\":\"a.txt\"}"}}]"#;
        let (calls, _) = found(text);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].name, "read");
        assert_eq!(calls[0].arguments["path"], "a.txt");
    }

    #[test]
    fn test_unparseable_string_arguments_become_empty_map() {
        let (calls, _) = found(r#"{"name":"noop","arguments":"not json"}"#);
        assert_eq!(calls[0].name, "noop");
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_fenced_block_is_removed_from_content() {
        let text = "I'll look that up.\n```json\n{\"name\":\"search\",\"arguments\":{\"q\":\"rust\"}}\n```\nDone.";
        let (calls, cleaned) = found(text);
        assert_eq!(calls[0].arguments["q"], "rust");
        assert_eq!(cleaned, "I'll look that up.\n\nDone.");
    }

    #[test]
    fn test_key_anchored_span_inside_prose() {
        let text = r#"Sure. {"toolCalls": [{"name": "ls", "arguments": {"dir": "{weird}"}}]} then more"#;
        let (calls, cleaned) = found(text);
        assert_eq!(calls[0].name, "ls");
        assert_eq!(calls[0].arguments["dir"], "{weird}");
        assert_eq!(cleaned, "Sure.  then more");
    }

    #[test]
    fn test_json_fence_after_other_language_fence() {
        let text = "Example:\n```python\nprint(1)\n```\nNow:\n```json\n{\"name\":\"search\",\"arguments\":{\"q\":\"x\"}}\n```";
        let (calls, cleaned) = found(text);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments["q"], "x");
        assert_eq!(cleaned, "Example:\n```python\nprint(1)\n```\nNow:");
    }

    #[test]
    fn test_key_anchored_span_skips_nested_objects_before_key() {
        let text = r#"Calling now: {"meta":{"v":1},"tool_calls":[{"name":"search","arguments":{"q":"x"}}]} ok"#;
        let (calls, cleaned) = found(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(cleaned, "Calling now:  ok");
    }

    #[test]
    fn test_tagged_call_keeps_string_path() {
        let (calls, cleaned) = found(
            "<tool_call>read_file<arg_key>path</arg_key><arg_value>/tmp/a</arg_value></tool_call>",
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], json!("/tmp/a"));
        assert_eq!(cleaned, "");
    }

    #[test]
    fn test_tagged_literal_grammar() {
        let text = "Running now\n<tool_call>configure\n<arg_key>verbose</arg_key><arg_value>TRUE</arg_value>\n<arg_key>limit</arg_key><arg_value> 10 </arg_value>\n<arg_key>ratio</arg_key><arg_value>0.5</arg_value>\n<arg_key>extra</arg_key><arg_value>null</arg_value>\n<arg_key>tags</arg_key><arg_value>[\"a\",\"b\"]</arg_value>\n<arg_key>note</arg_key><arg_value>  hello world </arg_value>\n</tool_call>";
        let (calls, cleaned) = found(text);
        let args = &calls[0].arguments;
        assert_eq!(calls[0].name, "configure");
        assert_eq!(args["verbose"], json!(true));
        assert_eq!(args["limit"], json!(10));
        assert_eq!(args["ratio"], json!(0.5));
        assert_eq!(args["extra"], Value::Null);
        assert_eq!(args["tags"], json!(["a", "b"]));
        assert_eq!(args["note"], json!("hello world"));
        assert_eq!(cleaned, "Running now");
    }

    #[test]
    fn test_multiple_tagged_calls() {
        let text = "<tool_call>a</tool_call> and <tool_call>b<arg_key>x</arg_key><arg_value>1</arg_value></tool_call>";
        let (calls, cleaned) = found(text);
        assert_eq!(
            calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(cleaned, "and");
    }

    #[test]
    fn test_json_inside_tags() {
        let (calls, _) = found(r#"<tool_call>{"name":"grep","arguments":{"pattern":"fn"}}</tool_call>"#);
        assert_eq!(calls[0].name, "grep");
        assert_eq!(calls[0].arguments["pattern"], "fn");
    }

    #[test]
    fn test_open_tag_without_close_is_truncated() {
        let result = extract_tool_calls("<tool_call>read_file<arg_key>path</arg_key><arg_val");
        assert_eq!(result, ToolCallExtraction::Malformed { truncated: true });
        assert!(result.is_truncated());
        assert!(result.tool_calls().is_empty());
    }

    #[test]
    fn test_complete_calls_survive_later_truncation() {
        let text = "<tool_call>a<arg_key>n</arg_key><arg_value>1</arg_value></tool_call> then <tool_call>b<arg_key>k";
        let result = extract_tool_calls(text);
        assert!(result.is_found());
        assert!(result.is_truncated());
        assert_eq!(result.tool_calls().len(), 1);
        assert_eq!(result.tool_calls()[0].name, "a");
        match result {
            ToolCallExtraction::Found {
                cleaned_content, ..
            } => assert_eq!(cleaned_content, "then"),
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_markup_without_usable_calls_is_malformed() {
        let result = extract_tool_calls(r#"{"tool_calls": "soon"}"#);
        assert_eq!(result, ToolCallExtraction::Malformed { truncated: false });

        let result = extract_tool_calls("<tool_call>\n</tool_call>");
        assert_eq!(result, ToolCallExtraction::Malformed { truncated: false });
    }

    #[test]
    fn test_plain_text_is_absent() {
        assert_eq!(
            extract_tool_calls("The answer is 42."),
            ToolCallExtraction::Absent
        );
        assert_eq!(extract_tool_calls("[1, 2, 3]"), ToolCallExtraction::Absent);
        assert!(!looks_like_tool_call_markup("The answer is 42."));
        assert!(looks_like_tool_call_markup("x <tool_call> y"));
        assert!(looks_like_tool_call_markup(r#"{"toolCalls": []}"#));
    }

    #[test]
    fn test_bare_object_requires_name_and_arguments() {
        assert_eq!(
            extract_tool_calls(r#"{"name":"just a name"}"#),
            ToolCallExtraction::Absent
        );
    }
}
