//! Turning a step's observations into automatic memory entries.

use crate::memory::{AutomaticShortTermMemory, MemoryState};
use crate::protocol::{EntityId, Observations, StepInput};

/// Importance given to memories the simulation seeds an agent with.
pub const INITIAL_MEMORY_IMPORTANCE: i32 = 100;

const WALK_TO_CATEGORY: &str = "walkTo";

fn reason_suffix(reason: Option<&str>) -> String {
    reason
        .map(|reason| format!(" (because {reason})"))
        .unwrap_or_default()
}

/// Render `observations` as automatic entries, in time order.
pub fn automatic_memories_for(
    observations: &Observations,
    self_entity_id: &EntityId,
) -> Vec<AutomaticShortTermMemory> {
    let mut entries = Vec::new();

    for entry in &observations.activity_stream_entries {
        if entry.source_entity_id.as_ref() == Some(self_entity_id) {
            continue;
        }
        let summary = match &entry.message {
            Some(message) => format!("{}\n{}", entry.title, message),
            None => entry.title.clone(),
        };
        entries.push(AutomaticShortTermMemory::new(entry.time, summary));
    }

    for spoken in &observations.self_spoken_messages {
        entries.push(
            AutomaticShortTermMemory::new(
                spoken.time,
                format!(
                    "I said \"{}\" (while standing at {})",
                    spoken.message,
                    spoken.location.as_rounded_array()
                ),
            )
            .previous_activity(),
        );
    }

    for heard in &observations.spoken_messages {
        entries.push(
            AutomaticShortTermMemory::new(
                heard.time,
                format!(
                    "I heard {} say \"{}\" (they were at {})",
                    heard.character_name,
                    heard.message,
                    heard.speaker_location.as_rounded_array()
                ),
            )
            .high_priority(),
        );
    }

    for movement in &observations.movement_records {
        entries.push(
            AutomaticShortTermMemory::new(
                movement.started_at_time,
                format!(
                    "I started walking from {} to {}{}",
                    movement.start_point.as_rounded_array(),
                    movement.end_point.as_rounded_array(),
                    reason_suffix(movement.reason.as_deref())
                ),
            )
            .with_category(WALK_TO_CATEGORY)
            .previous_activity(),
        );
    }

    for record in &observations.action_on_entity_records {
        entries.push(
            AutomaticShortTermMemory::new(
                record.started_at_time,
                format!(
                    "I took the action '{}' on entity '{}'{}",
                    record.action_id,
                    record.target_entity_id,
                    reason_suffix(record.reason.as_deref())
                ),
            )
            .previous_activity(),
        );
    }

    for record in &observations.action_on_inventory_item_records {
        entries.push(
            AutomaticShortTermMemory::new(
                record.started_at_time,
                format!(
                    "I performed action '{}' on the item '{}' from my inventory{}",
                    record.action_id,
                    record.item_config_key,
                    reason_suffix(record.reason.as_deref())
                ),
            )
            .previous_activity(),
        );
    }

    for record in &observations.craft_item_action_records {
        entries.push(
            AutomaticShortTermMemory::new(
                record.started_at_time,
                format!(
                    "I crafted an '{}' item{}",
                    record.item_config_key,
                    reason_suffix(record.reason.as_deref())
                ),
            )
            .previous_activity(),
        );
    }

    entries.sort_by(|a, b| a.time.total_cmp(&b.time));
    entries
}

/// Fold one input's observations into the agent's memory.
pub fn ingest_observations(state: &mut MemoryState, input: &StepInput) {
    let entries = automatic_memories_for(
        &input.new_observations,
        &input.self_info.entity_info.entity_id,
    );
    if !entries.is_empty() {
        tracing::trace!(
            agent_id = %input.agent_id,
            count = entries.len(),
            "Adding automatic memories"
        );
    }
    state.add_automatic(entries);
}

/// Seed long-term memory from the agent's initial memories.
pub fn ingest_initial_memories(state: &mut MemoryState, input: &StepInput) {
    for memory in &input.self_info.initial_memories {
        state.record_thought(
            memory,
            input.simulation_time,
            input.self_info.location(),
            INITIAL_MEMORY_IMPORTANCE,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ActivityStreamEntry, MovementRecord, ObservedSpokenMessage, SelfSpokenMessage, Vector2,
    };

    fn me() -> EntityId {
        EntityId::from("me")
    }

    #[test]
    fn test_heard_message_is_high_priority() {
        let observations = Observations {
            spoken_messages: vec![ObservedSpokenMessage {
                entity_id: "bob".into(),
                character_name: "Bob".to_string(),
                message: "Hello!".to_string(),
                time: 3.0,
                speaker_location: Vector2::new(10.2, 20.7),
                my_location: Vector2::default(),
            }],
            ..Observations::default()
        };
        let entries = automatic_memories_for(&observations, &me());
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].summary,
            "I heard Bob say \"Hello!\" (they were at [10, 21])"
        );
        assert!(entries[0].is_high_priority);
        assert!(!entries[0].force_previous_activity);
    }

    #[test]
    fn test_own_actions_are_previous_activity() {
        let observations = Observations {
            self_spoken_messages: vec![SelfSpokenMessage {
                message: "hi".to_string(),
                location: Vector2::new(1.0, 1.0),
                time: 8.0,
                reason: None,
            }],
            movement_records: vec![MovementRecord {
                started_at_time: 5.0,
                start_point: Vector2::new(0.0, 0.0),
                end_point: Vector2::new(100.0, 50.0),
                reason: Some("to chop trees".to_string()),
            }],
            ..Observations::default()
        };
        let entries = automatic_memories_for(&observations, &me());
        assert_eq!(
            entries[0].summary,
            "I started walking from [0, 0] to [100, 50] (because to chop trees)"
        );
        assert_eq!(entries[0].de_duplication_category.as_deref(), Some("walkTo"));
        assert_eq!(entries[1].summary, "I said \"hi\" (while standing at [1, 1])");
        assert!(entries.iter().all(|e| e.force_previous_activity));
    }

    #[test]
    fn test_own_activity_stream_entries_skipped() {
        let entry = |source: &str, time: f64| ActivityStreamEntry {
            time,
            title: format!("{source} did something"),
            message: Some("details".to_string()),
            action_type: None,
            source_location: None,
            source_entity_id: Some(source.into()),
            target_entity_id: None,
        };
        let observations = Observations {
            activity_stream_entries: vec![entry("me", 1.0), entry("bob", 2.0)],
            ..Observations::default()
        };
        let entries = automatic_memories_for(&observations, &me());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "bob did something\ndetails");
    }
}
