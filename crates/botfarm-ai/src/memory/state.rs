//! Per-agent memory: the automatic activity log, durable thoughts and the
//! rolling short-term summary.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::protocol::Vector2;

/// A system-generated note of something the agent observed or did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomaticShortTermMemory {
    pub time: f64,
    pub summary: String,
    /// Always list under previous activity, even when newer than the last
    /// prompt (the agent's own actions need no reaction).
    #[serde(default)]
    pub force_previous_activity: bool,
    /// Shortens the prompt cadence while unseen.
    #[serde(default)]
    pub is_high_priority: bool,
    /// Only the newest entry of a category survives.
    #[serde(default)]
    pub de_duplication_category: Option<String>,
}

impl AutomaticShortTermMemory {
    pub fn new(time: f64, summary: impl Into<String>) -> Self {
        Self {
            time,
            summary: summary.into(),
            force_previous_activity: false,
            is_high_priority: false,
            de_duplication_category: None,
        }
    }

    pub fn previous_activity(mut self) -> Self {
        self.force_previous_activity = true;
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.is_high_priority = true;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.de_duplication_category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermMemory {
    pub id: u64,
    pub content: String,
    pub created_time: f64,
    pub created_at_location: Vector2,
    pub importance: i32,
}

/// What to do when the long-term list grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "limit")]
pub enum LongTermRetention {
    #[default]
    Unbounded,
    /// Drop the oldest memories beyond the limit.
    KeepNewest(usize),
    /// Drop the least important memories beyond the limit, oldest first
    /// among equals.
    KeepMostImportant(usize),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryState {
    short_term_summary: String,
    long_term: Vec<LongTermMemory>,
    automatic: Vec<AutomaticShortTermMemory>,
    next_long_term_id: u64,
    retention: LongTermRetention,
}

impl MemoryState {
    pub fn new(retention: LongTermRetention) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    pub fn short_term_summary(&self) -> &str {
        &self.short_term_summary
    }

    pub fn long_term(&self) -> &[LongTermMemory] {
        &self.long_term
    }

    /// The automatic log, sorted by time.
    pub fn automatic(&self) -> &[AutomaticShortTermMemory] {
        &self.automatic
    }

    /// Merge new entries into the log, keep it time-ordered and collapse
    /// each de-duplication category to its newest entry.
    pub fn add_automatic(&mut self, entries: impl IntoIterator<Item = AutomaticShortTermMemory>) {
        self.automatic.extend(entries);
        self.automatic.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut seen = HashSet::new();
        let mut keep = vec![true; self.automatic.len()];
        for (index, entry) in self.automatic.iter().enumerate().rev() {
            if let Some(category) = &entry.de_duplication_category
                && !seen.insert(category.clone())
            {
                keep[index] = false;
            }
        }
        let mut keep = keep.into_iter();
        self.automatic.retain(|_| keep.next().unwrap_or(true));
    }

    /// Store a thought durably and note it in the activity log.
    pub fn record_thought(
        &mut self,
        thought: &str,
        time: f64,
        location: Vector2,
        importance: i32,
    ) -> u64 {
        self.next_long_term_id += 1;
        let id = self.next_long_term_id;
        self.long_term.push(LongTermMemory {
            id,
            content: thought.to_string(),
            created_time: time,
            created_at_location: location,
            importance,
        });
        self.apply_retention();

        self.add_automatic([AutomaticShortTermMemory::new(
            time,
            format!("I had the thought: \"{thought}\""),
        )
        .previous_activity()]);
        id
    }

    /// Entries the agent has already had a chance to react to, and entries
    /// that arrived since the last prompt was sent.
    pub fn split_activity(
        &self,
        previous_prompt_send_time: f64,
    ) -> (Vec<&AutomaticShortTermMemory>, Vec<&AutomaticShortTermMemory>) {
        self.automatic.iter().partition(|entry| {
            entry.time <= previous_prompt_send_time || entry.force_previous_activity
        })
    }

    pub fn has_high_priority_since(&self, time: f64) -> bool {
        self.automatic
            .iter()
            .any(|entry| entry.is_high_priority && entry.time > time)
    }

    /// Swap in the result of a successful compaction.
    pub(crate) fn replace_after_compaction(
        &mut self,
        kept: Vec<AutomaticShortTermMemory>,
        summary: String,
    ) {
        self.automatic = kept;
        self.short_term_summary = summary;
    }

    fn apply_retention(&mut self) {
        match self.retention {
            LongTermRetention::Unbounded => {}
            LongTermRetention::KeepNewest(limit) => {
                let excess = self.long_term.len().saturating_sub(limit);
                if excess > 0 {
                    self.long_term.drain(..excess);
                }
            }
            LongTermRetention::KeepMostImportant(limit) => {
                while self.long_term.len() > limit {
                    let Some(victim) = self
                        .long_term
                        .iter()
                        .enumerate()
                        .min_by_key(|(index, memory)| (memory.importance, *index))
                        .map(|(index, _)| index)
                    else {
                        break;
                    };
                    self.long_term.remove(victim);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: f64, summary: &str) -> AutomaticShortTermMemory {
        AutomaticShortTermMemory::new(time, summary)
    }

    #[test]
    fn test_log_stays_sorted() {
        let mut state = MemoryState::default();
        state.add_automatic([entry(5.0, "b"), entry(1.0, "a")]);
        state.add_automatic([entry(3.0, "mid"), entry(9.0, "late")]);
        let times: Vec<f64> = state.automatic().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 3.0, 5.0, 9.0]);
    }

    #[test]
    fn test_category_keeps_newest_across_steps() {
        let mut state = MemoryState::default();
        state.add_automatic([entry(1.0, "walk to A").with_category("walkTo"), entry(2.0, "x")]);
        state.add_automatic([entry(4.0, "walk to B").with_category("walkTo")]);

        let summaries: Vec<&str> = state.automatic().iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["x", "walk to B"]);
    }

    #[test]
    fn test_category_tie_keeps_last_added() {
        let mut state = MemoryState::default();
        state.add_automatic([entry(4.0, "first").with_category("walkTo")]);
        state.add_automatic([entry(4.0, "second").with_category("walkTo")]);
        assert_eq!(state.automatic().len(), 1);
        assert_eq!(state.automatic()[0].summary, "second");
    }

    #[test]
    fn test_record_thought() {
        let mut state = MemoryState::default();
        let first = state.record_thought("trees grow back", 10.0, Vector2::new(1.0, 2.0), 0);
        let second = state.record_thought("Bob is kind", 11.0, Vector2::default(), 100);
        assert_eq!((first, second), (1, 2));
        assert_eq!(state.long_term().len(), 2);
        assert_eq!(
            state.automatic()[0].summary,
            "I had the thought: \"trees grow back\""
        );
        assert!(state.automatic()[0].force_previous_activity);
    }

    #[test]
    fn test_split_activity() {
        let mut state = MemoryState::default();
        state.add_automatic([
            entry(1.0, "old"),
            entry(6.0, "new"),
            entry(7.0, "mine").previous_activity(),
        ]);
        let (previous, new) = state.split_activity(5.0);
        assert_eq!(previous.len(), 2);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].summary, "new");
    }

    #[test]
    fn test_high_priority_since() {
        let mut state = MemoryState::default();
        state.add_automatic([entry(3.0, "heard").high_priority()]);
        assert!(state.has_high_priority_since(2.0));
        assert!(!state.has_high_priority_since(3.0));
    }

    #[test]
    fn test_retention_keep_newest() {
        let mut state = MemoryState::new(LongTermRetention::KeepNewest(2));
        for i in 0..4 {
            state.record_thought(&format!("t{i}"), i as f64, Vector2::default(), 0);
        }
        let ids: Vec<u64> = state.long_term().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_retention_keep_most_important() {
        let mut state = MemoryState::new(LongTermRetention::KeepMostImportant(2));
        state.record_thought("seed", 0.0, Vector2::default(), 100);
        state.record_thought("a", 1.0, Vector2::default(), 0);
        state.record_thought("b", 2.0, Vector2::default(), 0);
        let contents: Vec<&str> = state.long_term().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["seed", "b"]);
    }

    #[test]
    fn test_retention_serde_shape() {
        let policy: LongTermRetention =
            serde_json::from_value(serde_json::json!({"policy": "keep_newest", "limit": 50}))
                .unwrap();
        assert_eq!(policy, LongTermRetention::KeepNewest(50));
    }
}
