//! Message identity and merging.
//!
//! The same logical message can reach the client twice: once as an
//! optimistic local echo and once as the server's confirmation, or twice
//! from the server after a reconnect. [`merge`] folds any combination of
//! message lists into a deduplicated, time-ascending sequence where every
//! equivalence class has exactly one survivor, with the server-confirmed
//! record winning over a local echo.
//!
//! All functions here are pure; no I/O.

use etschat_shared::constants::ECHO_WINDOW_MS;
use etschat_shared::time;
use etschat_shared::types::Message;

/// Text comparison form: trimmed and lowercased.
pub fn normalized_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Dedup key for server-confirmed messages.
///
/// Guards against the server redelivering the same message with a different
/// id (e.g. after a reconnect). The timestamp is bucketed at second
/// resolution so redeliveries with sub-second skew still collide.
fn remote_dedup_key(message: &Message) -> String {
    format!(
        "{}|{}|{}|{}",
        message.conversation_id,
        message.epoch_millis() / 1000,
        normalized_text(&message.text),
        message.sender_id,
    )
}

/// Whether two message records represent the same logical message.
pub fn are_equivalent(a: &Message, b: &Message) -> bool {
    if !a.id.is_empty() && !b.id.is_empty() && a.id == b.id {
        return true;
    }
    if a.conversation_id != b.conversation_id {
        return false;
    }
    if normalized_text(&a.text) != normalized_text(&b.text) {
        return false;
    }
    match (a.is_local, b.is_local) {
        // A pending echo vs. a server frame: match within the echo window
        // unless the senders provably differ.
        (true, false) | (false, true) => {
            let (Some(ta), Some(tb)) = (
                time::parse_epoch_millis(&a.timestamp),
                time::parse_epoch_millis(&b.timestamp),
            ) else {
                return false;
            };
            if (ta - tb).abs() > ECHO_WINDOW_MS {
                return false;
            }
            !(!a.sender_id.is_empty() && !b.sender_id.is_empty() && a.sender_id != b.sender_id)
        }
        // Two local messages only collide on id, handled above.
        (true, true) => false,
        // Two server messages collide via the dedup key.
        (false, false) => remote_dedup_key(a) == remote_dedup_key(b),
    }
}

/// Fold `existing` and `incoming` into one deduplicated, time-ascending
/// list.
///
/// Idempotent: re-merging the same input produces no duplicates, and a
/// server-confirmed message always replaces an equivalent local echo.
pub fn merge(existing: &[Message], incoming: &[Message]) -> Vec<Message> {
    let mut combined: Vec<Message> = existing.iter().chain(incoming).cloned().collect();
    combined.sort_by_key(Message::epoch_millis);

    let mut out: Vec<Message> = Vec::with_capacity(combined.len());
    'candidates: for candidate in combined {
        for slot in out.iter_mut() {
            if !are_equivalent(slot, &candidate) {
                continue;
            }
            if slot.is_local && !candidate.is_local {
                // Remote wins: it carries the authoritative id/timestamp.
                *slot = candidate;
            } else if !slot.is_local
                && !candidate.is_local
                && candidate.epoch_millis() >= slot.epoch_millis()
            {
                // Remote/remote collision: the later-or-equal one survives.
                *slot = candidate;
            }
            continue 'candidates;
        }
        out.push(candidate);
    }

    // Echo replacement can nudge a slot's timestamp past its neighbour.
    out.sort_by_key(Message::epoch_millis);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str, text: &str, timestamp: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
            is_local: false,
        }
    }

    fn local(id: &str, text: &str, timestamp: &str) -> Message {
        Message {
            is_local: true,
            ..remote(id, text, timestamp)
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            remote("m1", "one", "2024-03-01T12:00:00Z"),
            remote("m2", "two", "2024-03-01T12:00:10Z"),
            local("local-1", "three", "2024-03-01T12:00:20Z"),
        ];
        let once = merge(&[], &batch);
        let twice = merge(&once, &[]);
        assert_eq!(once, twice);

        // Re-merging the same incoming set produces no duplicates.
        let self_merged = merge(&batch, &batch);
        assert_eq!(self_merged, once);
    }

    #[test]
    fn test_local_echo_reconciliation() {
        let echo = local("local-t0", "hi", "2024-03-01T12:00:00Z");
        let confirmed = remote("srv-1", "hi", "2024-03-01T12:00:02Z");
        let merged = merge(&[echo], &[confirmed.clone()]);
        assert_eq!(merged, vec![confirmed]);
    }

    #[test]
    fn test_echo_outside_window_is_kept_separate() {
        let echo = local("local-t0", "hi", "2024-03-01T12:00:00Z");
        let late = remote("srv-1", "hi", "2024-03-01T12:00:06Z");
        assert_eq!(merge(&[echo], &[late]).len(), 2);
    }

    #[test]
    fn test_echo_at_exact_window_boundary_matches() {
        // Exactly ECHO_WINDOW_MS apart: the window is inclusive.
        let echo = local("local-t0", "hi", "2024-03-01T12:00:00Z");
        let confirmed = remote("srv-1", "hi", "2024-03-01T12:00:05Z");
        let merged = merge(&[echo], &[confirmed.clone()]);
        assert_eq!(merged, vec![confirmed]);
    }

    #[test]
    fn test_echo_different_sender_is_kept_separate() {
        let echo = local("local-t0", "hi", "2024-03-01T12:00:00Z");
        let mut other = remote("srv-1", "hi", "2024-03-01T12:00:01Z");
        other.sender_id = "u2".to_string();
        assert_eq!(merge(&[echo], &[other]).len(), 2);
    }

    #[test]
    fn test_remote_remote_dedup_same_second() {
        let a = remote("srv-1", "Hi ", "2024-03-01T12:00:00.100Z");
        let b = remote("srv-2", "hi", "2024-03-01T12:00:00.900Z");
        let merged = merge(&[a], &[b.clone()]);
        // The later timestamp survives.
        assert_eq!(merged, vec![b]);
    }

    #[test]
    fn test_remote_remote_different_second_both_survive() {
        let a = remote("srv-1", "hi", "2024-03-01T12:00:00Z");
        let b = remote("srv-2", "hi", "2024-03-01T12:00:01Z");
        assert_eq!(merge(&[a], &[b]).len(), 2);
    }

    #[test]
    fn test_output_is_time_ascending_regardless_of_arrival() {
        let t2 = remote("m3", "third", "2024-03-01T12:00:20Z");
        let t0 = remote("m1", "first", "2024-03-01T12:00:00Z");
        let t1 = remote("m2", "second", "2024-03-01T12:00:10Z");
        let merged = merge(&[], &[t2, t0, t1]);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_unparsable_timestamp_sorts_first() {
        let odd = remote("m0", "odd", "not-a-date");
        let normal = remote("m1", "normal", "2024-03-01T12:00:00Z");
        let merged = merge(&[normal], &[odd]);
        assert_eq!(merged[0].id, "m0");
    }

    #[test]
    fn test_same_id_wins_over_everything() {
        // Same id, different conversation: still the same message (rule 2
        // precedes the conversation check).
        let mut a = remote("m1", "one", "2024-03-01T12:00:00Z");
        a.conversation_id = "c1".to_string();
        let mut b = remote("m1", "edited", "2024-03-01T12:00:30Z");
        b.conversation_id = "c1".to_string();
        assert_eq!(merge(&[a], &[b]).len(), 1);
    }

    #[test]
    fn test_different_conversations_never_merge() {
        let a = remote("m1", "hi", "2024-03-01T12:00:00Z");
        let mut b = remote("m2", "hi", "2024-03-01T12:00:00Z");
        b.conversation_id = "c2".to_string();
        assert_eq!(merge(&[a], &[b]).len(), 2);
    }
}
