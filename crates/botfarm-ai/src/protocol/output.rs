use serde::{Deserialize, Serialize};

use super::input::{EntityId, Vector2};

/// Lifecycle status reported to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    UpdatingMemory,
    UpdateMemorySuccess,
    RunningPrompt,
    PromptFinished,
    RunningScript,
    ScriptDone,
    ScriptException,
    WaitingForAction,
    ActionDone,
}

/// A single request to affect the world.
///
/// Serialized as `{"actionUniqueId": "...", "<kind>": {...}}` with exactly
/// one kind key present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_unique_id: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            action_unique_id: uuid::Uuid::new_v4().to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionKind {
    Walk {
        location: Vector2,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Speak {
        message: String,
    },
    CraftItem {
        item_config_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PickUpEntity {
        target_entity_id: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    UseEquippedToolItemOnEntity {
        target_entity_id: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    UseEquippedToolItem {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    EquipInventoryItem {
        item_config_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack_index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    DropInventoryItem {
        item_config_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack_index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    FacialExpressionEmoji {
        emoji: String,
    },
}

impl ActionKind {
    /// Wire name of the populated variant.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Walk { .. } => "walk",
            ActionKind::Speak { .. } => "speak",
            ActionKind::CraftItem { .. } => "craftItem",
            ActionKind::PickUpEntity { .. } => "pickUpEntity",
            ActionKind::UseEquippedToolItemOnEntity { .. } => "useEquippedToolItemOnEntity",
            ActionKind::UseEquippedToolItem { .. } => "useEquippedToolItem",
            ActionKind::EquipInventoryItem { .. } => "equipInventoryItem",
            ActionKind::DropInventoryItem { .. } => "dropInventoryItem",
            ActionKind::FacialExpressionEmoji { .. } => "facialExpressionEmoji",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ActionOutcome {
    #[default]
    Success,
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_unique_id: String,
    #[serde(default)]
    pub outcome: ActionOutcome,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsagePricing {
    pub model_id: String,
    pub cost_per_1k_input: f64,
    pub cost_per_1k_output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUsageInfo {
    pub usage: PromptUsage,
    pub model_usage_pricing: ModelUsagePricing,
}

/// One message from an agent toward the simulation/UI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_status: Option<AgentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub was_rate_limited: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prompt_usages: Vec<PromptUsageInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
}

impl StepOutput {
    pub fn status(status: AgentStatus, start_time: f64) -> Self {
        Self {
            agent_status: Some(status),
            status_start_time: Some(start_time),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.status_duration = Some(seconds);
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_usages(mut self, usages: Vec<PromptUsageInfo>) -> Self {
        self.prompt_usages = usages;
        self
    }

    pub fn with_debug_info(mut self, debug_info: impl Into<String>) -> Self {
        self.debug_info = Some(debug_info.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Attach accumulated step errors as one multi-line message.
    pub fn with_errors(mut self, errors: &[String], was_rate_limited: bool) -> Self {
        if !errors.is_empty() {
            self.error = Some(errors.join("\n"));
        }
        self.was_rate_limited |= was_rate_limited;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_single_kind_key() {
        let action = Action {
            action_unique_id: "a-1".to_string(),
            kind: ActionKind::PickUpEntity {
                target_entity_id: EntityId::from("tree-3"),
                reason: None,
            },
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "actionUniqueId": "a-1",
                "pickUpEntity": {"targetEntityId": "tree-3"}
            })
        );
    }

    #[test]
    fn test_action_parses_from_wire() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "actionUniqueId": "b-2",
            "dropInventoryItem": {"itemConfigKey": "wood", "amount": 2}
        }))
        .unwrap();
        assert_eq!(
            action.kind,
            ActionKind::DropInventoryItem {
                item_config_key: "wood".to_string(),
                stack_index: None,
                amount: Some(2),
                reason: None,
            }
        );
        assert_eq!(action.kind.name(), "dropInventoryItem");
    }

    #[test]
    fn test_action_result_defaults_to_success() {
        let result: ActionResult =
            serde_json::from_value(serde_json::json!({"actionUniqueId": "x"})).unwrap();
        assert!(result.succeeded());
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let output = StepOutput::status(AgentStatus::WaitingForAction, 1.0);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["agentStatus"], "waiting-for-action");
        assert_eq!(value["wasRateLimited"], false);
    }

    #[test]
    fn test_errors_joined_with_newlines() {
        let output = StepOutput::default().with_errors(
            &["first".to_string(), "second".to_string()],
            true,
        );
        assert_eq!(output.error.as_deref(), Some("first\nsecond"));
        assert!(output.was_rate_limited);
    }
}
