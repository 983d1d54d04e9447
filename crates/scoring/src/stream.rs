//! Incremental consumption of one scoring stream.
//!
//! A [`StreamAccumulator`] moves through `Buffering -> Partial -> Final`. Every delta is
//! appended to the buffer and the buffer is re-parsed tolerantly; ids that have not been
//! seen before are reported exactly once, in the order the model produced them.

use crate::payload::{parse_partial_selections, parse_selections};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Nothing parseable has arrived yet.
    Buffering,
    /// At least one parse of the buffer succeeded.
    Partial,
    /// `finish` has been called; further deltas are ignored.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    FinalText,
    StreamFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalSelections {
    pub ids: Vec<String>,
    pub source: SelectionSource,
}

/// Frozen copy of an accumulator, safe to hand to another task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    pub phase: StreamPhase,
    pub emitted: Vec<String>,
    pub buffered_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    buffer: String,
    emitted: Vec<String>,
    seen: HashSet<String>,
    allowed: Option<HashSet<String>>,
    phase: StreamPhase,
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            emitted: Vec::new(),
            seen: HashSet::new(),
            allowed: None,
            phase: StreamPhase::Buffering,
        }
    }

    /// Restricts emission to ids in `ids`. Anything else the model names is dropped.
    pub fn with_allowed<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    fn is_allowed(&self, id: &str) -> bool {
        self.allowed.as_ref().map_or(true, |allowed| allowed.contains(id))
    }

    /// Appends `delta` and returns the ids emitted for the first time by this call.
    pub fn feed(&mut self, delta: &str) -> Vec<String> {
        if self.phase == StreamPhase::Final || delta.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(delta);

        let Some(parsed) = parse_partial_selections(&self.buffer) else {
            return Vec::new();
        };
        self.phase = StreamPhase::Partial;

        let mut fresh = Vec::new();
        for id in parsed {
            if !self.is_allowed(&id) || self.seen.contains(&id) {
                continue;
            }
            self.seen.insert(id.clone());
            self.emitted.push(id.clone());
            fresh.push(id);
        }
        if !fresh.is_empty() {
            log::debug!("Stream emitted {} new selection(s)", fresh.len());
        }
        fresh
    }

    /// Settles the stream. A parseable final text wins; otherwise the emitted ids stand.
    pub fn finish(&mut self, final_text: Option<&str>) -> FinalSelections {
        self.phase = StreamPhase::Final;

        if let Some(text) = final_text {
            match parse_selections(text) {
                Some(ids) => {
                    let ids: Vec<String> =
                        ids.into_iter().filter(|id| self.is_allowed(id)).collect();
                    for id in &ids {
                        if self.seen.insert(id.clone()) {
                            self.emitted.push(id.clone());
                        }
                    }
                    return FinalSelections {
                        ids,
                        source: SelectionSource::FinalText,
                    };
                }
                None => log::warn!(
                    "Final scoring text is not a selection payload; keeping {} streamed id(s)",
                    self.emitted.len()
                ),
            }
        }

        FinalSelections {
            ids: self.emitted.clone(),
            source: SelectionSource::StreamFallback,
        }
    }

    pub fn emitted(&self) -> &[String] {
        &self.emitted
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            phase: self.phase,
            emitted: self.emitted.clone(),
            buffered_bytes: self.buffer.len(),
        }
    }
}
