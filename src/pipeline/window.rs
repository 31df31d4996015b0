//! Bounded command history and majority vote

use std::collections::VecDeque;

/// Labels eligible to win a vote, in tie-break precedence order
pub const TARGET_VOCABULARY: [&str; 5] = ["drop", "right", "left", "lift", "neutral"];

/// Samples kept in the history window
pub const WINDOW_CAPACITY: usize = 40;

/// Result of a majority vote at gate time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub label: &'static str,
    pub count: usize,
}

/// Fixed-capacity FIFO of the most recent command labels
///
/// Appending at capacity evicts the oldest entry; there is no separate
/// eviction step. Out-of-vocabulary labels occupy slots but are never
/// vote candidates.
#[derive(Debug)]
pub struct CommandWindow {
    entries: VecDeque<String>,
    capacity: usize,
}

impl CommandWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a label, evicting the oldest entry once at capacity.
    pub fn push(&mut self, label: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(label);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Occurrences of one label in the current window.
    pub fn count(&self, label: &str) -> usize {
        self.entries.iter().filter(|e| e.as_str() == label).count()
    }

    /// Majority vote over the target vocabulary.
    ///
    /// Ties resolve deterministically to the earliest label in
    /// `TARGET_VOCABULARY`: the scan keeps the first label reaching the
    /// maximum count.
    pub fn majority(&self) -> Vote {
        let mut winner = TARGET_VOCABULARY[0];
        let mut max = self.count(winner);

        for &label in &TARGET_VOCABULARY[1..] {
            let n = self.count(label);
            if n > max {
                winner = label;
                max = n;
            }
        }

        Vote {
            label: winner,
            count: max,
        }
    }
}

impl Default for CommandWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}
