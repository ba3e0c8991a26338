//! Normalization of raw CLI stdout into answer text.

use crate::llm::config::CliFlavor;
use regex::Regex;
use std::sync::LazyLock;

const THINK_CLOSE: &str = "</think>";
const TURN_MARKER: &str = "TurnBegin(";

/// Turns carrying these markers are loop-control chatter, not answers.
const LOOP_CONTROL_MARKERS: &[&str] = &["Available branches:", "automated loop"];

/// Echoed prompt fragments start with these role prefixes.
const ECHO_PREFIXES: &[&str] = &["System:", "User:"];

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

static CHOICE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<choice>.*?</choice>").expect("valid regex"));

/// `TextPart(type='text', text='...')` with either quote style; the body may
/// span lines and contain escaped quotes.
static TEXT_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)TextPart\(.*?type=['"]text['"].*?text=(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#,
    )
    .expect("valid regex")
});

/// Turn raw process output into the answer text for `flavor`.
pub fn normalize_output(flavor: CliFlavor, raw: &str) -> String {
    if flavor.is_turn_structured() {
        parse_turn_output(raw)
    } else {
        strip_choice_blocks(&strip_reasoning(raw))
    }
}

/// Drop `<think>` reasoning. With a closing tag present everything up to and
/// including the last one goes; otherwise only complete blocks are removed.
pub fn strip_reasoning(text: &str) -> String {
    match text.rfind(THINK_CLOSE) {
        Some(pos) => text[pos + THINK_CLOSE.len()..].to_string(),
        None => THINK_BLOCK.replace_all(text, "").into_owned(),
    }
}

pub fn strip_choice_blocks(text: &str) -> String {
    CHOICE_BLOCK.replace_all(text, "").trim().to_string()
}

/// Extract answer text from `TurnBegin(`-delimited protocol output.
pub fn parse_turn_output(raw: &str) -> String {
    let payloads: Vec<String> = raw
        .split(TURN_MARKER)
        .skip(1)
        .filter(|turn| !LOOP_CONTROL_MARKERS.iter().any(|m| turn.contains(m)))
        .flat_map(|turn| {
            TEXT_PART
                .captures_iter(turn)
                .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
                .map(|m| unescape(m.as_str()))
                .collect::<Vec<_>>()
        })
        .filter(|payload| {
            let head = payload.trim_start();
            !ECHO_PREFIXES.iter().any(|prefix| head.starts_with(prefix))
        })
        .collect();

    strip_choice_blocks(&payloads.join("\n"))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
