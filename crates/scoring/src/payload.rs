//! Schemas for everything crossing the scoring boundary: the prompt we send and the
//! selection list we read back.

use crate::error::Result;
use crate::service::ScoringRequest;
use mealrec_protocol::TagMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub const SYSTEM_PROMPT: &str = "You are a meal planning assistant. You receive a JSON object \
describing one archetype of meals the user is eligible for, plus meals they liked or disliked \
before. Pick the meals this user is most likely to enjoy, best first. Reply with JSON only, \
shaped as {\"selections\": [{\"meal_id\": \"...\", \"reason\": \"...\"}]}, choosing at most \
target_count meals and only ids present in candidates.";

/// The only per-meal data a scoring call ever sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptCandidate {
    pub meal_id: String,
    pub name: String,
    pub tags: TagMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPrompt {
    pub archetype_id: String,
    pub target_count: usize,
    #[serde(default)]
    pub liked_meal_ids: Vec<String>,
    #[serde(default)]
    pub disliked_meal_ids: Vec<String>,
    pub candidates: Vec<PromptCandidate>,
}

impl ScoringPrompt {
    pub fn to_request(&self, max_tokens: u32) -> Result<ScoringRequest> {
        Ok(ScoringRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: serde_json::to_string(self)?,
            max_tokens,
        })
    }

    pub fn from_user_prompt(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Into::into)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SelectionEntry {
    Bare(String),
    Object(SelectionObject),
}

#[derive(Debug, Clone, Deserialize)]
struct SelectionObject {
    #[serde(alias = "mealId", alias = "id")]
    meal_id: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct SelectionEnvelope {
    #[serde(default, alias = "recommendations", alias = "meals")]
    selections: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SelectionPayload {
    Envelope(SelectionEnvelope),
    List(Vec<Value>),
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn entry_id(value: Value) -> Option<String> {
    match serde_json::from_value::<SelectionEntry>(value) {
        Ok(SelectionEntry::Bare(id)) => scalar_id(&Value::String(id)),
        Ok(SelectionEntry::Object(obj)) => scalar_id(&obj.meal_id),
        Err(err) => {
            log::debug!("Skipping malformed selection entry: {err}");
            None
        }
    }
}

/// Canonical ordered id list; duplicates keep their first position.
fn normalize(entries: Vec<Value>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(entry_id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Drops leading prose or a markdown fence and anything after the outermost JSON value.
fn json_region(text: &str) -> Option<&str> {
    let start = text.find(&['{', '['][..])?;
    let end = text.rfind(&['}', ']'][..])?;
    (end >= start).then(|| &text[start..=end])
}

/// Strict parse of a complete response. `None` means the text is not a selection payload.
pub fn parse_selections(text: &str) -> Option<Vec<String>> {
    ids_from_json(json_region(text)?)
}

fn ids_from_json(raw: &str) -> Option<Vec<String>> {
    let payload: SelectionPayload = serde_json::from_str(raw).ok()?;
    let entries = match payload {
        SelectionPayload::Envelope(envelope) => envelope.selections,
        SelectionPayload::List(entries) => entries,
    };
    Some(normalize(entries))
}

#[derive(Clone, Copy)]
struct Frame {
    closer: char,
    expect_key: bool,
}

/// Closes a truncated JSON document at its last complete value.
///
/// Returns the complete document when the outermost value already closed, and `None`
/// when nothing complete has arrived yet. Partially received strings are never kept.
pub fn close_truncated_json(input: &str) -> Option<String> {
    let start = input.find(&['{', '['][..])?;
    let body = &input[start..];
    let mut frames: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut string_is_key = false;
    let mut escaped = false;
    let mut safe: Option<(usize, Vec<char>)> = None;

    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                if !string_is_key {
                    safe = Some((idx + 1, frames.iter().map(|f| f.closer).collect()));
                }
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                string_is_key = frames
                    .last()
                    .is_some_and(|f| f.closer == '}' && f.expect_key);
            }
            '{' => frames.push(Frame {
                closer: '}',
                expect_key: true,
            }),
            '[' => frames.push(Frame {
                closer: ']',
                expect_key: false,
            }),
            '}' | ']' => {
                if frames.pop().map(|f| f.closer) != Some(ch) {
                    return None;
                }
                if frames.is_empty() {
                    return Some(body[..=idx].to_string());
                }
                safe = Some((idx + 1, frames.iter().map(|f| f.closer).collect()));
            }
            ':' => {
                if let Some(frame) = frames.last_mut() {
                    frame.expect_key = false;
                }
            }
            ',' => {
                if let Some(frame) = frames.last_mut() {
                    if frame.closer == '}' {
                        frame.expect_key = true;
                    }
                }
            }
            _ => {}
        }
    }

    let (end, closers) = safe?;
    let mut out = String::with_capacity(end + closers.len());
    out.push_str(&body[..end]);
    out.extend(closers.iter().rev());
    Some(out)
}

/// Tolerant parse of a growing buffer: the raw text first, then its repaired prefix.
pub fn parse_partial_selections(buffer: &str) -> Option<Vec<String>> {
    if let Some(ids) = parse_selections(buffer) {
        return Some(ids);
    }
    ids_from_json(&close_truncated_json(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn accepts_objects_and_bare_strings() {
        let text = r#"{"selections": [{"meal_id": "a"}, "b", {"mealId": "c"}, {"id": 7}, "a"]}"#;
        assert_eq!(parse_selections(text), Some(ids(&["a", "b", "c", "7"])));
    }

    #[test]
    fn accepts_recommendations_alias_and_bare_list() {
        let text = r#"{"recommendations": [{"meal_id": "x"}]}"#;
        assert_eq!(parse_selections(text), Some(ids(&["x"])));
        assert_eq!(parse_selections(r#"["p", "q"]"#), Some(ids(&["p", "q"])));
    }

    #[test]
    fn strips_markdown_fences() {
        let text = "Here you go:\n```json\n{\"selections\": [\"a\"]}\n```";
        assert_eq!(parse_selections(text), Some(ids(&["a"])));
    }

    #[test]
    fn skips_malformed_entries() {
        let text = r#"{"selections": [{"reason": "no id"}, "ok", null, ""]}"#;
        assert_eq!(parse_selections(text), Some(ids(&["ok"])));
    }

    #[test]
    fn rejects_non_json() {
        assert_eq!(parse_selections("I cannot help with that"), None);
        assert_eq!(parse_selections(r#"{"selections": [tru"#), None);
    }

    #[test]
    fn repairs_truncated_buffers_at_last_complete_value() {
        assert_eq!(
            close_truncated_json(r#"{"selections": ["a", "b"#).as_deref(),
            Some(r#"{"selections": ["a"]}"#)
        );
        assert_eq!(
            close_truncated_json(r#"{"selections": [{"meal_id": "a", "reason": "tas"#).as_deref(),
            Some(r#"{"selections": [{"meal_id": "a"}]}"#)
        );
        assert_eq!(close_truncated_json(r#"{"selections": ["#), None);
        assert_eq!(close_truncated_json(r#"{"selec"#), None);
    }

    #[test]
    fn keys_are_not_safe_points() {
        // The only complete string is a key; nothing can be closed yet.
        assert_eq!(close_truncated_json(r#"{"selections""#), None);
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let buffer = r#"{"selections": [{"meal_id": "a", "reason": "say \"hi\""}, {"meal_id": "b"#;
        assert_eq!(parse_partial_selections(buffer), Some(ids(&["a"])));
    }

    #[test]
    fn partial_parse_never_emits_truncated_ids() {
        let full = r#"{"selections": [{"meal_id": "meal_123"}, {"meal_id": "meal_456"}]}"#;
        for cut in 0..full.len() {
            if let Some(found) = parse_partial_selections(&full[..cut]) {
                for id in &found {
                    assert!(id == "meal_123" || id == "meal_456", "cut {cut}: {id}");
                }
            }
        }
    }

    #[test]
    fn prompt_round_trips_through_request() {
        let prompt = ScoringPrompt {
            archetype_id: "comfort".to_string(),
            target_count: 2,
            liked_meal_ids: ids(&["old"]),
            disliked_meal_ids: Vec::new(),
            candidates: vec![PromptCandidate {
                meal_id: "a".to_string(),
                name: "Stew".to_string(),
                tags: TagMap::new(),
            }],
        };
        let request = prompt.to_request(500).expect("request");
        assert_eq!(request.max_tokens, 500);
        assert_eq!(ScoringPrompt::from_user_prompt(&request.user_prompt).expect("parse"), prompt);
    }
}
