//! Wire types exchanged with the simulation once per agent step.

mod input;
mod output;

pub use input::{
    ActionOnEntityRecord, ActionOnInventoryItemRecord, ActivityStreamEntry, CharacterInfo,
    CraftItemActionRecord, CraftingRecipe, DamageableEntityInfo, EntityId, EntityInfo,
    InventoryInfo, ItemCollection, ItemCollectionEntry, ItemEntityInfo, ItemStackInfo,
    MovementRecord, ObservedSpokenMessage, Observations, SelfInfo, SelfSpokenMessage,
    SelfThought, StepInput, Vector2,
};
pub use output::{
    Action, ActionKind, ActionOutcome, ActionResult, AgentStatus, ModelUsagePricing,
    PromptUsage, PromptUsageInfo, StepOutput,
};

/// Current wall-clock time as fractional unix seconds.
pub fn unix_time_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Short opaque identifier used to correlate logged failures with the
/// error text sent to the simulation.
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
