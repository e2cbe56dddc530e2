//! History reconciliation between stored state and the LLM's view.
//!
//! The server may return a longer, equal, or truncated history; the rules
//! guarantee nothing already persisted is lost:
//!
//! - remote at least as long as local: adopt remote.
//! - remote shorter but its last entry is new: append that entry to local.
//! - otherwise: keep local.

use crate::model::QaPair;

/// Merge the stored history with the LLM-reported one.
///
/// Returns the merged list and whether a remote tail entry was appended.
pub fn merge_history(local: &[QaPair], remote: &[QaPair]) -> (Vec<QaPair>, bool) {
    if remote.len() >= local.len() {
        return (remote.to_vec(), false);
    }
    if let Some(tail) = remote.last() {
        let is_new = local.last().map(|last| last != tail).unwrap_or(true);
        if is_new {
            let mut merged = local.to_vec();
            merged.push(tail.clone());
            return (merged, true);
        }
    }
    (local.to_vec(), false)
}

/// Question count after a merge: never less than what either side knows.
pub fn next_question_count(
    remote_reported: u32,
    local_count: u32,
    appended: bool,
    merged_len: usize,
) -> u32 {
    let local_next = (local_count + u32::from(appended)).max(merged_len as u32);
    remote_reported.max(local_next)
}

#[cfg(test)]
mod tests {
    use super::{merge_history, next_question_count};
    use crate::model::QaPair;

    fn qa(q: &str, a: &str) -> QaPair {
        QaPair {
            question: q.to_string(),
            answer: a.to_string(),
        }
    }

    #[test]
    fn longer_remote_wins() {
        let local = vec![qa("q1", "a1")];
        let remote = vec![qa("q1", "a1"), qa("q2", "a2")];
        let (merged, appended) = merge_history(&local, &remote);
        assert_eq!(merged, remote);
        assert!(!appended);
    }

    #[test]
    fn shorter_remote_with_new_tail_appends() {
        let local = vec![qa("q1", "a1"), qa("q2", "a2")];
        let remote = vec![qa("q3", "a3")];
        let (merged, appended) = merge_history(&local, &remote);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2], qa("q3", "a3"));
        assert!(appended);
    }

    #[test]
    fn shorter_remote_with_known_tail_keeps_local() {
        let local = vec![qa("q1", "a1"), qa("q2", "a2")];
        let remote = vec![qa("q2", "a2")];
        let (merged, appended) = merge_history(&local, &remote);
        assert_eq!(merged, local);
        assert!(!appended);
    }

    #[test]
    fn empty_remote_keeps_local() {
        let local = vec![qa("q1", "a1")];
        let (merged, appended) = merge_history(&local, &[]);
        assert_eq!(merged, local);
        assert!(!appended);
    }

    #[test]
    fn merged_is_never_shorter_than_either_side() {
        let cases = [
            (vec![], vec![]),
            (vec![qa("q1", "a1")], vec![]),
            (vec![], vec![qa("q1", "a1")]),
            (vec![qa("q1", "a1")], vec![qa("q2", "a2")]),
            (
                vec![qa("q1", "a1"), qa("q2", "a2")],
                vec![qa("q1", "a1"), qa("q2", "a2"), qa("q3", "a3")],
            ),
        ];
        for (local, remote) in cases {
            let (merged, _) = merge_history(&local, &remote);
            assert!(merged.len() >= local.len().max(remote.len().min(local.len() + 1)));
        }
    }

    #[test]
    fn question_count_is_monotone() {
        // Remote reports ahead of the merge.
        assert_eq!(next_question_count(5, 3, true, 4), 5);
        // Local appended one; merge length dominates the stale remote.
        assert_eq!(next_question_count(1, 2, true, 3), 3);
        // Plain adoption of remote.
        assert_eq!(next_question_count(2, 1, false, 2), 2);
    }
}
