use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::output::ActionResult;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Vector2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// `[x, y]` rounded to whole units, the form locations take in prompts.
    pub fn as_rounded_array(&self) -> String {
        format!("[{}, {}]", self.x.round() as i64, self.y.round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCollectionEntry {
    pub item_config_key: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub entries: Vec<ItemCollectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedSpokenMessage {
    pub entity_id: EntityId,
    pub character_name: String,
    pub message: String,
    pub time: f64,
    pub speaker_location: Vector2,
    pub my_location: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfSpokenMessage {
    pub message: String,
    pub location: Vector2,
    pub time: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfThought {
    pub thought: String,
    pub location: Vector2,
    pub time: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRecord {
    pub started_at_time: f64,
    pub start_point: Vector2,
    pub end_point: Vector2,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOnEntityRecord {
    pub started_at_time: f64,
    pub action_id: String,
    pub target_entity_id: EntityId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOnInventoryItemRecord {
    pub started_at_time: f64,
    pub item_config_key: String,
    pub action_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftItemActionRecord {
    pub started_at_time: f64,
    pub item_config_key: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStreamEntry {
    pub time: f64,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub source_location: Option<Vector2>,
    #[serde(default)]
    pub source_entity_id: Option<EntityId>,
    #[serde(default)]
    pub target_entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInfo {
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub equipped_item_config_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEntityInfo {
    pub item_config_key: String,
    pub item_name: String,
    #[serde(default)]
    pub description: String,
    pub can_be_picked_up: bool,
    #[serde(default = "one")]
    pub amount: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageableEntityInfo {
    #[serde(default)]
    pub damageable_by_equipped_tool_item_config_key: Option<String>,
    pub hp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    pub observed_at_simulation_time: f64,
    pub entity_id: EntityId,
    pub location: Vector2,
    #[serde(default)]
    pub item_info: Option<ItemEntityInfo>,
    #[serde(default)]
    pub damageable_info: Option<DamageableEntityInfo>,
    #[serde(default)]
    pub character_info: Option<CharacterInfo>,
    /// Action ids the simulation accepts against this entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_action_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStackInfo {
    pub amount: i64,
    pub item_config_key: String,
    pub item_name: String,
    #[serde(default)]
    pub item_description: String,
    #[serde(default)]
    pub can_be_equipped: bool,
    #[serde(default)]
    pub can_be_dropped: bool,
    #[serde(default)]
    pub is_equipped: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryInfo {
    #[serde(default)]
    pub item_stacks: Vec<ItemStackInfo>,
}

impl InventoryInfo {
    pub fn total_amount(&self, item_config_key: &str) -> i64 {
        self.item_stacks
            .iter()
            .filter(|stack| stack.item_config_key == item_config_key)
            .map(|stack| stack.amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfInfo {
    pub entity_info: EntityInfo,
    #[serde(default)]
    pub core_personality: String,
    #[serde(default)]
    pub initial_memories: Vec<String>,
    pub observation_distance: f64,
    #[serde(default)]
    pub inventory_info: InventoryInfo,
    #[serde(default)]
    pub equipped_item_config_key: Option<String>,
}

impl SelfInfo {
    pub fn location(&self) -> Vector2 {
        self.entity_info.location
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftingRecipe {
    pub item_config_key: String,
    pub item_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost: ItemCollection,
    #[serde(default = "one")]
    pub amount: i64,
    #[serde(default)]
    pub can_currently_afford: bool,
}

/// Everything the simulation observed for one agent since its last step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Observations {
    pub spoken_messages: Vec<ObservedSpokenMessage>,
    pub self_spoken_messages: Vec<SelfSpokenMessage>,
    pub entities_by_id: BTreeMap<EntityId, EntityInfo>,
    pub movement_records: Vec<MovementRecord>,
    pub action_on_entity_records: Vec<ActionOnEntityRecord>,
    pub action_on_inventory_item_records: Vec<ActionOnInventoryItemRecord>,
    pub craft_item_action_records: Vec<CraftItemActionRecord>,
    pub activity_stream_entries: Vec<ActivityStreamEntry>,
    pub action_results: Vec<ActionResult>,
    pub started_action_unique_ids: Vec<String>,
    pub self_thoughts: Vec<SelfThought>,
}

/// One step's worth of world state for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub agent_type: String,
    pub step_id: String,
    pub agent_id: String,
    pub simulation_id: String,
    pub simulation_time: f64,
    pub self_info: SelfInfo,
    #[serde(default)]
    pub new_observations: Observations,
    #[serde(default)]
    pub world_constants: serde_json::Value,
    #[serde(default)]
    pub crafting_recipes: Vec<CraftingRecipe>,
}

impl StepInput {
    /// Key identifying the worker that owns this agent.
    pub fn agent_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.simulation_id, self.agent_id, self.agent_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_array_format() {
        assert_eq!(Vector2::new(10.4, -3.6).as_rounded_array(), "[10, -4]");
    }

    #[test]
    fn test_step_input_minimal_json() {
        let json = serde_json::json!({
            "agentType": "default",
            "stepId": "s1",
            "agentId": "a1",
            "simulationId": "sim",
            "simulationTime": 12.5,
            "selfInfo": {
                "entityInfo": {
                    "observedAtSimulationTime": 12.5,
                    "entityId": "e1",
                    "location": {"x": 1.0, "y": 2.0}
                },
                "observationDistance": 300.0
            },
            "newObservations": {
                "startedActionUniqueIds": ["act-1"],
                "entitiesById": {
                    "e2": {
                        "observedAtSimulationTime": 12.0,
                        "entityId": "e2",
                        "location": {"x": 4.0, "y": 6.0}
                    }
                }
            }
        });

        let input: StepInput = serde_json::from_value(json).unwrap();
        assert_eq!(input.agent_key(), "sim:a1:default");
        assert_eq!(input.new_observations.started_action_unique_ids, vec!["act-1"]);
        assert_eq!(input.new_observations.entities_by_id.len(), 1);
        assert!(input.crafting_recipes.is_empty());
    }

    #[test]
    fn test_inventory_total_amount() {
        let stack = |key: &str, amount| ItemStackInfo {
            amount,
            item_config_key: key.to_string(),
            item_name: key.to_string(),
            item_description: String::new(),
            can_be_equipped: false,
            can_be_dropped: true,
            is_equipped: false,
        };
        let inventory = InventoryInfo {
            item_stacks: vec![stack("wood", 3), stack("stone", 1), stack("wood", 4)],
        };
        assert_eq!(inventory.total_amount("wood"), 7);
        assert_eq!(inventory.total_amount("gold"), 0);
    }
}
