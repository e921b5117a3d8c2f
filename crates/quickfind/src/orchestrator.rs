//! Query orchestration: turns sparse query results into a display list.
//!
//! The result pane has one slot per possible distance value, with the
//! distance used directly as the list index. Closer matches therefore sort
//! first without any explicit sort, unused distances stay blank, and two
//! matches at the same distance collapse to whichever arrives last.

use fuzzy_index::{IndexManager, Match, MAX_DISTANCE};

/// Distance cutoff for interactive queries. Entries scoring 50 share at
/// most a single character with the query, so anything at or past the
/// midpoint is noise.
pub const QUERY_THRESHOLD: u32 = 45;

/// Buckets matches into one display slot per distance value.
pub fn ordered_results(matches: &[Match]) -> Vec<String> {
    let mut slots = vec![String::new(); (MAX_DISTANCE + 1) as usize];
    for m in matches {
        slots[m.distance as usize] = m.node.data().to_string();
    }
    slots
}

/// Renders the non-blank slots, best matches first.
pub fn render(slots: &[String]) -> String {
    slots
        .iter()
        .filter(|slot| !slot.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

/// Polled on a fixed interval; re-queries only when the input text changes.
#[derive(Debug, Default)]
pub struct QueryOrchestrator {
    prev_query: String,
}

impl QueryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the new input, returning false when it is unchanged and no
    /// re-query is needed.
    pub fn input_changed(&mut self, input: &str) -> bool {
        if input == self.prev_query {
            return false;
        }
        self.prev_query = input.to_string();
        true
    }

    /// One poll tick: `Some(rendered pane)` when the input changed,
    /// `None` otherwise.
    pub fn poll(&mut self, input: &str, manager: &IndexManager) -> Option<String> {
        if !self.input_changed(input) {
            return None;
        }
        if input.is_empty() {
            return Some(String::new());
        }
        let matches = manager.query(input, QUERY_THRESHOLD);
        Some(render(&ordered_results(&matches)))
    }
}
