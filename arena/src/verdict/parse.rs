//! Lenient parsing of the judge's reply.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use super::Verdict;
use crate::submission::Submission;

/// Why a judge reply was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    #[error("no JSON object in judge reply")]
    NoJson,

    #[error("judge reply has no winner")]
    MissingWinner,

    #[error("judge picked '{0}', which is not a successful round-1 agent")]
    IneligibleWinner(String),
}

/// Parse `raw` into a verdict whose winner is a successful round-1 agent.
pub(crate) fn parse_verdict(raw: &str, round_one: &[Submission]) -> Result<Verdict, Rejection> {
    let object = find_object(raw).ok_or(Rejection::NoJson)?;

    let named = object
        .get("winner")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or(Rejection::MissingWinner)?;
    let winner = eligible_winner(named, round_one)
        .ok_or_else(|| Rejection::IneligibleWinner(named.to_string()))?;

    let critiques = match object.get("critiques") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(agent, critique)| (agent.clone(), text_of(critique)))
            .collect(),
        _ => BTreeMap::new(),
    };
    let reasoning = object.get("reasoning").map(text_of).unwrap_or_default();

    Ok(Verdict {
        winner: Some(winner),
        critiques,
        reasoning,
    })
}

/// Exact name first, then a unique case-insensitive match.
fn eligible_winner(named: &str, round_one: &[Submission]) -> Option<String> {
    let eligible: Vec<&str> = round_one
        .iter()
        .filter(|s| s.success)
        .map(|s| s.agent.as_str())
        .collect();
    if let Some(exact) = eligible.iter().find(|a| **a == named) {
        return Some(exact.to_string());
    }
    let mut folded = eligible.iter().filter(|a| a.eq_ignore_ascii_case(named));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only.to_string()),
        _ => None,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whole reply (fences stripped) first, then each balanced `{...}` span in turn.
fn find_object(raw: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_fences(raw)) {
        return Some(map);
    }
    let mut offset = 0;
    while let Some(found) = raw[offset..].find('{') {
        let start = offset + found;
        // An opener that never closes must not hide a later object.
        if let Some(span) = balanced_span(&raw[start..]) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
                return Some(map);
            }
        }
        offset = start + 1;
    }
    None
}

fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The shortest prefix of `text` (which starts with `{`) whose braces balance,
/// ignoring braces inside JSON strings.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
