//! Sanity checks on the tool calls assembled from a streamed turn.

use std::collections::HashSet;

use quill_core::message::ToolCallRequest;
use tracing::warn;
use uuid::Uuid;

/// Drop calls that cannot be dispatched and make ids usable.
///
/// - a call without a name is dropped
/// - a call without an id gets a generated one
/// - a repeated id keeps only its first call
///
/// Order of the surviving calls is preserved.
pub fn filter_valid(calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(calls.len());

    for (index, mut call) in calls.into_iter().enumerate() {
        if call.name.trim().is_empty() {
            warn!(index, id = %call.id, "Dropping tool call without a name");
            continue;
        }
        if call.id.trim().is_empty() {
            call.id = format!("call_{}", Uuid::new_v4().simple());
            warn!(index, tool = %call.name, id = %call.id, "Tool call had no id, generated one");
        }
        if !seen.insert(call.id.clone()) {
            warn!(index, id = %call.id, "Dropping tool call with duplicate id");
            continue;
        }
        valid.push(call);
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_valid_calls_in_order() {
        let calls = vec![
            ToolCallRequest::new("a", "read_file", "{}"),
            ToolCallRequest::new("b", "bash", "{}"),
        ];
        assert_eq!(filter_valid(calls.clone()), calls);
    }

    #[test]
    fn drops_nameless_and_duplicates() {
        let calls = vec![
            ToolCallRequest::new("a", "read_file", "{}"),
            ToolCallRequest::new("b", "", "{}"),
            ToolCallRequest::new("a", "bash", "{}"),
        ];
        let valid = filter_valid(calls);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].name, "read_file");
    }

    #[test]
    fn generates_missing_ids() {
        let valid = filter_valid(vec![
            ToolCallRequest::new("", "bash", "{}"),
            ToolCallRequest::new("", "bash", "{}"),
        ]);
        assert_eq!(valid.len(), 2);
        assert!(valid[0].id.starts_with("call_"));
        assert_ne!(valid[0].id, valid[1].id);
    }
}
