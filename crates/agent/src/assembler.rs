//! Tool-call assembler.
//!
//! Merges fragmented tool calls per index. Ids and names are taken from the
//! first fragment that carries a non-empty value; argument chunks are
//! concatenated in arrival order. Progress events are produced as fragments
//! arrive, the finished records only at [`ToolCallAssembler::finalize`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::decoder::ToolCallFragment;
use crate::stream_event::{StreamEvent, ToolArgumentError, ToolCallRecord};

/// Id used for a call whose fragments never carried one.
pub fn fallback_call_id(index: u32) -> String {
    format!("call_{index}")
}

#[derive(Debug, Default)]
struct Accumulator {
    call_id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-attempt tool-call table. Create a fresh one for every attempt.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<u32, Accumulator>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment and return the progress events it causes.
    ///
    /// The first name seen for an index yields `ToolCallStarted`; from then
    /// on every non-empty argument chunk yields `ToolCallArgumentsDelta`.
    /// If no id has arrived by the time the name does, the call's id is
    /// fixed to [`fallback_call_id`] so that every event for the call
    /// carries the same id.
    pub fn ingest(&mut self, fragment: ToolCallFragment) -> Vec<StreamEvent> {
        let index = fragment.index;
        let acc = self.pending.entry(index).or_default();
        let mut events = Vec::new();

        if let Some(id) = fragment.call_id.filter(|id| !id.is_empty()) {
            if acc.call_id.is_none() {
                acc.call_id = Some(id);
            } else if acc.call_id.as_deref() != Some(id.as_str()) {
                debug!(index, ignored = %id, "Ignoring later tool call id");
            }
        }

        if acc.name.is_none() {
            if let Some(name) = fragment.name.filter(|n| !n.is_empty()) {
                let call_id = acc
                    .call_id
                    .get_or_insert_with(|| fallback_call_id(index))
                    .clone();
                acc.name = Some(name.clone());
                events.push(StreamEvent::ToolCallStarted { call_id, name });
            }
        }

        if let Some(chunk) = fragment.arguments_chunk.filter(|c| !c.is_empty()) {
            acc.arguments.push_str(&chunk);
            if let (Some(call_id), Some(name)) = (&acc.call_id, &acc.name) {
                events.push(StreamEvent::ToolCallArgumentsDelta {
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments_chunk: chunk,
                });
            }
        }

        events
    }

    /// Whether the call at `index` has a name yet.
    pub fn is_complete(&self, index: u32) -> bool {
        self.pending
            .get(&index)
            .is_some_and(|acc| acc.name.is_some())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Produce one record per index, in ascending index order.
    ///
    /// A failure is scoped to its own record and never affects siblings.
    /// An empty argument string is an empty object.
    pub fn finalize(self) -> Vec<ToolCallRecord> {
        self.pending
            .into_iter()
            .map(|(index, acc)| {
                let arguments = match &acc.name {
                    None => Err(ToolArgumentError::MissingName { index }),
                    Some(_) if acc.arguments.trim().is_empty() => {
                        Ok(serde_json::Value::Object(serde_json::Map::new()))
                    }
                    Some(_) => serde_json::from_str(&acc.arguments).map_err(|e| {
                        ToolArgumentError::Malformed {
                            raw: acc.arguments.clone(),
                            message: e.to_string(),
                        }
                    }),
                };

                ToolCallRecord {
                    index,
                    call_id: acc.call_id.unwrap_or_else(|| fallback_call_id(index)),
                    name: acc.name.unwrap_or_default(),
                    raw_arguments: acc.arguments,
                    arguments,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(
        index: u32,
        call_id: Option<&str>,
        name: Option<&str>,
        args: Option<&str>,
    ) -> ToolCallFragment {
        ToolCallFragment {
            index,
            call_id: call_id.map(String::from),
            name: name.map(String::from),
            arguments_chunk: args.map(String::from),
        }
    }

    #[test]
    fn lookup_call_assembles_progressively() {
        let mut asm = ToolCallAssembler::new();
        let started = asm.ingest(fragment(0, Some("call_x"), Some("lookup"), Some("")));
        assert_eq!(
            started,
            vec![StreamEvent::ToolCallStarted {
                call_id: "call_x".into(),
                name: "lookup".into()
            }]
        );

        let d1 = asm.ingest(fragment(0, None, None, Some("{\"q\":")));
        let d2 = asm.ingest(fragment(0, None, None, Some("\"cats\"}")));
        assert_eq!(d1.len(), 1);
        assert_eq!(d2.len(), 1);
        assert!(matches!(
            &d2[0],
            StreamEvent::ToolCallArgumentsDelta { arguments_chunk, .. } if arguments_chunk == "\"cats\"}"
        ));

        let records = asm.finalize();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].call_id, "call_x");
        assert_eq!(records[0].arguments, Ok(json!({"q": "cats"})));
    }

    #[test]
    fn first_name_and_id_win() {
        let mut asm = ToolCallAssembler::new();
        asm.ingest(fragment(0, Some("a"), Some("first"), None));
        let events = asm.ingest(fragment(0, Some("b"), Some("second"), None));
        assert!(events.is_empty());

        let records = asm.finalize();
        assert_eq!(records[0].call_id, "a");
        assert_eq!(records[0].name, "first");
    }

    #[test]
    fn arguments_before_name_are_kept_without_delta() {
        let mut asm = ToolCallAssembler::new();
        assert!(asm.ingest(fragment(0, None, None, Some("{\"a\":"))).is_empty());
        assert!(!asm.is_complete(0));
        let events = asm.ingest(fragment(0, None, Some("calc"), Some("1}")));
        assert_eq!(events.len(), 2);
        assert!(asm.is_complete(0));

        let records = asm.finalize();
        assert_eq!(records[0].raw_arguments, "{\"a\":1}");
        assert_eq!(records[0].arguments, Ok(json!({"a": 1})));
    }

    #[test]
    fn missing_id_uses_stable_fallback() {
        let mut asm = ToolCallAssembler::new();
        let events = asm.ingest(fragment(3, None, Some("list"), None));
        assert_eq!(
            events,
            vec![StreamEvent::ToolCallStarted {
                call_id: "call_3".into(),
                name: "list".into()
            }]
        );
        // An id arriving after the name does not change the call's identity
        asm.ingest(fragment(3, Some("late"), None, None));
        assert_eq!(asm.finalize()[0].call_id, "call_3");
    }

    #[test]
    fn empty_arguments_are_an_empty_object() {
        let mut asm = ToolCallAssembler::new();
        asm.ingest(fragment(0, Some("c"), Some("list"), None));
        assert_eq!(asm.finalize()[0].arguments, Ok(json!({})));
    }

    #[test]
    fn parse_failure_is_scoped_to_its_index() {
        let mut asm = ToolCallAssembler::new();
        asm.ingest(fragment(1, Some("b"), Some("good"), Some("{\"ok\":true}")));
        asm.ingest(fragment(0, Some("a"), Some("bad"), Some("{\"q\":")));

        let records = asm.finalize();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 0);
        assert!(matches!(
            records[0].arguments,
            Err(ToolArgumentError::Malformed { .. })
        ));
        assert_eq!(records[1].index, 1);
        assert_eq!(records[1].arguments, Ok(json!({"ok": true})));
    }

    #[test]
    fn nameless_call_is_an_error_record() {
        let mut asm = ToolCallAssembler::new();
        asm.ingest(fragment(0, Some("a"), None, Some("{}")));
        let records = asm.finalize();
        assert_eq!(
            records[0].arguments,
            Err(ToolArgumentError::MissingName { index: 0 })
        );
    }

    #[test]
    fn finalize_orders_by_index() {
        let mut asm = ToolCallAssembler::new();
        for index in [2, 0, 1] {
            asm.ingest(fragment(index, None, Some("t"), None));
        }
        assert_eq!(asm.len(), 3);
        let indices: Vec<u32> = asm.finalize().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn concatenation_matches_any_chunking() {
        let full = r#"{"path":"src/main.rs","limit":40}"#;
        for split in 0..=full.len() {
            let mut asm = ToolCallAssembler::new();
            asm.ingest(fragment(0, Some("c"), Some("file_read"), Some(&full[..split])));
            asm.ingest(fragment(0, None, None, Some(&full[split..])));
            let record = asm.finalize().remove(0);
            assert_eq!(record.raw_arguments, full);
            assert_eq!(
                record.arguments,
                Ok(serde_json::from_str::<serde_json::Value>(full).unwrap())
            );
        }
    }
}
