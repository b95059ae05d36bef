//! Sequence ignore tracker
//!
//! Requests issued against windows that may already be gone (freeing a
//! damage object, a picture, deselecting input) can legitimately fail. Their
//! sequence numbers are queued here; when the server reports an error for
//! one of them it is swallowed instead of logged.
//!
//! Requests, replies, errors and events share one monotonically increasing
//! sequence space, so anything older than an observed sequence number can
//! never produce an error any more and is discarded from the queue head.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct IgnoreTracker {
    pending: VecDeque<u64>,
}

impl IgnoreTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request sequence whose error must be suppressed.
    ///
    /// Sequences arrive in request order; an out-of-order value is inserted
    /// at its sorted position so the queue stays ordered.
    pub fn set_ignore(&mut self, sequence: u64) {
        match self.pending.back() {
            Some(&last) if last > sequence => {
                let pos = self.pending.partition_point(|&s| s < sequence);
                if self.pending.get(pos) != Some(&sequence) {
                    self.pending.insert(pos, sequence);
                }
            }
            Some(&last) if last == sequence => {}
            _ => self.pending.push_back(sequence),
        }
    }

    /// Drop every entry older than `sequence`
    pub fn discard_before(&mut self, sequence: u64) {
        while matches!(self.pending.front(), Some(&s) if s < sequence) {
            self.pending.pop_front();
        }
    }

    /// Decide whether an error carrying `sequence` should be swallowed.
    ///
    /// A match consumes the entry, so a second error with the same sequence
    /// is reported.
    pub fn should_ignore(&mut self, sequence: u64) -> bool {
        self.discard_before(sequence);
        if self.pending.front() == Some(&sequence) {
            self.pending.pop_front();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_error_is_consumed_once() {
        let mut ignore = IgnoreTracker::new();
        ignore.set_ignore(10);
        assert!(ignore.should_ignore(10));
        assert!(!ignore.should_ignore(10));
        assert!(ignore.is_empty());
    }

    #[test]
    fn unmatched_error_is_reported() {
        let mut ignore = IgnoreTracker::new();
        ignore.set_ignore(12);
        assert!(!ignore.should_ignore(11));
        // 12 is still outstanding
        assert_eq!(ignore.len(), 1);
        assert!(ignore.should_ignore(12));
    }

    #[test]
    fn newer_sequence_retires_older_entries() {
        let mut ignore = IgnoreTracker::new();
        ignore.set_ignore(3);
        ignore.set_ignore(5);
        ignore.set_ignore(8);
        ignore.discard_before(6);
        assert_eq!(ignore.len(), 1);
        assert!(!ignore.should_ignore(5));
        assert!(ignore.should_ignore(8));
    }

    #[test]
    fn out_of_order_insert_stays_sorted() {
        let mut ignore = IgnoreTracker::new();
        ignore.set_ignore(7);
        ignore.set_ignore(4);
        ignore.set_ignore(7);
        assert_eq!(ignore.len(), 2);
        assert!(ignore.should_ignore(4));
        assert!(ignore.should_ignore(7));
    }
}
