//! The structured response of a JSON-action prompt.

use serde::{Deserialize, Serialize};

use crate::protocol::{Action, ActionKind, EntityId, Vector2};

/// A location written either as `[x, y]` or as `{"x": .., "y": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseLocation {
    Pair([f64; 2]),
    Point(Vector2),
}

impl From<ResponseLocation> for Vector2 {
    fn from(location: ResponseLocation) -> Self {
        match location {
            ResponseLocation::Pair([x, y]) => Vector2::new(x, y),
            ResponseLocation::Point(point) => point,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkRequest {
    pub location: ResponseLocation,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityActionRequest {
    pub target_entity_id: EntityId,
    pub action_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryActionRequest {
    pub item_config_key: String,
    pub action_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CraftRequest {
    pub item_config_key: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolUseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Every key is optional; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentResponse {
    pub location_to_walk_to_and_reason: Option<WalkRequest>,
    pub action_on_entity: Option<EntityActionRequest>,
    pub action_on_inventory_item: Option<InventoryActionRequest>,
    pub craft_item: Option<CraftRequest>,
    pub use_equipped_tool_item: Option<ToolUseRequest>,
    pub i_want_to_say: Option<String>,
    pub facial_expression_emoji: Option<String>,
    pub new_thoughts: Option<Vec<String>>,
}

impl AgentResponse {
    pub fn thoughts(&self) -> impl Iterator<Item = &str> {
        self.new_thoughts
            .iter()
            .flatten()
            .map(|thought| thought.trim())
            .filter(|thought| !thought.is_empty())
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|text| !text.trim().is_empty())
}

/// One action per populated key, in a fixed order. Inventory action ids
/// other than `equipItem` and `dropItem` are reported back as errors.
pub fn response_actions(response: &AgentResponse) -> (Vec<Action>, Vec<String>) {
    let response = response.clone();
    let mut actions = Vec::new();
    let mut errors = Vec::new();

    if let Some(walk) = response.location_to_walk_to_and_reason {
        actions.push(Action::new(ActionKind::Walk {
            location: walk.location.into(),
            reason: non_empty(walk.reason),
        }));
    }

    if let Some(message) = non_empty(response.i_want_to_say) {
        actions.push(Action::new(ActionKind::Speak { message }));
    }

    if let Some(request) = response.action_on_entity {
        let reason = non_empty(request.reason);
        let kind = if request.action_id == "pickup" {
            ActionKind::PickUpEntity {
                target_entity_id: request.target_entity_id,
                reason,
            }
        } else {
            ActionKind::UseEquippedToolItemOnEntity {
                target_entity_id: request.target_entity_id,
                reason,
            }
        };
        actions.push(Action::new(kind));
    }

    if let Some(request) = response.action_on_inventory_item {
        let reason = non_empty(request.reason);
        match request.action_id.as_str() {
            "equipItem" => actions.push(Action::new(ActionKind::EquipInventoryItem {
                item_config_key: request.item_config_key,
                stack_index: None,
                reason,
            })),
            "dropItem" => actions.push(Action::new(ActionKind::DropInventoryItem {
                item_config_key: request.item_config_key,
                stack_index: None,
                amount: request.amount,
                reason,
            })),
            other => {
                tracing::warn!(action_id = %other, "Unknown inventory action id from model");
                errors.push(format!("Unknown inventory action id '{other}'"));
            }
        }
    }

    if let Some(request) = response.craft_item {
        actions.push(Action::new(ActionKind::CraftItem {
            item_config_key: request.item_config_key,
            reason: non_empty(request.reason),
        }));
    }

    if let Some(request) = response.use_equipped_tool_item {
        actions.push(Action::new(ActionKind::UseEquippedToolItem {
            reason: non_empty(request.reason),
        }));
    }

    if let Some(emoji) = non_empty(response.facial_expression_emoji) {
        actions.push(Action::new(ActionKind::FacialExpressionEmoji { emoji }));
    }

    (actions, errors)
}
