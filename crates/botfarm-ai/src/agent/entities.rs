//! Ordering and rendering of observed entities for prompts.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::protocol::{EntityInfo, StepInput};

/// Observed entities other than the agent itself, characters first and
/// nearest first within each kind.
pub fn sorted_observed_entities(input: &StepInput) -> Vec<&EntityInfo> {
    let self_id = &input.self_info.entity_info.entity_id;
    let location = input.self_info.location();
    let mut entities: Vec<&EntityInfo> = input
        .new_observations
        .entities_by_id
        .values()
        .filter(|entity| &entity.entity_id != self_id)
        .collect();
    entities.sort_by(|a, b| {
        b.character_info
            .is_some()
            .cmp(&a.character_info.is_some())
            .then_with(|| {
                a.location
                    .distance(&location)
                    .total_cmp(&b.location.distance(&location))
            })
    });
    entities
}

/// Entities split by how much each one tells the model.
#[derive(Debug, Default)]
pub struct GroupedEntities<'a> {
    /// Every character plus the nearest entity of each item kind.
    pub unique: Vec<&'a EntityInfo>,
    /// Further entities of kinds already listed.
    pub non_unique: Vec<&'a EntityInfo>,
}

impl GroupedEntities<'_> {
    pub fn len(&self) -> usize {
        self.unique.len() + self.non_unique.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn grouped_observed_entities(input: &StepInput) -> GroupedEntities<'_> {
    let mut grouped = GroupedEntities::default();
    let mut seen_item_kinds = HashSet::new();
    for entity in sorted_observed_entities(input) {
        let unique = match (&entity.character_info, &entity.item_info) {
            (Some(_), _) => true,
            (None, Some(item)) => seen_item_kinds.insert(item.item_config_key.as_str()),
            (None, None) => false,
        };
        if unique {
            grouped.unique.push(entity);
        } else {
            grouped.non_unique.push(entity);
        }
    }
    grouped
}

/// Compact JSON description of an entity with its location as `[x, y]`.
pub fn entity_state_json(entity: &EntityInfo) -> Value {
    let mut state = Map::new();
    state.insert("entityId".into(), json!(entity.entity_id));

    if let Some(character) = &entity.character_info {
        state.insert("description".into(), json!(character.description));
        state.insert("name".into(), json!(character.name));
        state.insert("age".into(), json!(character.age));
        state.insert("gender".into(), json!(character.gender));
    }

    if let Some(item) = &entity.item_info {
        state.insert("itemName".into(), json!(item.item_name));
        state.insert("description".into(), json!(item.description));
    }

    if let Some(action_ids) = &entity.available_action_ids {
        state.insert("availableActionIds".into(), json!(action_ids));
    }

    let rounded = [
        entity.location.x.round() as i64,
        entity.location.y.round() as i64,
    ];
    state.insert("location".into(), json!(rounded));
    Value::Object(state)
}

/// Script variable name for the `index`th listed entity, e.g.
/// `character_entity_0` or `wood_log_entity_3`.
pub fn entity_variable_name(entity: &EntityInfo, index: usize) -> String {
    match (&entity.character_info, &entity.item_info) {
        (Some(_), _) => format!("character_entity_{index}"),
        (None, Some(item)) => format!("{}_entity_{index}", identifier(&item.item_config_key)),
        (None, None) => format!("entity_{index}"),
    }
}

/// `key` with every character that cannot appear in an identifier replaced.
pub fn identifier(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::protocol::{
        CharacterInfo, EntityId, EntityInfo, ItemEntityInfo, Observations, SelfInfo, StepInput,
        Vector2,
    };

    pub fn entity(id: &str, x: f64) -> EntityInfo {
        EntityInfo {
            observed_at_simulation_time: 0.0,
            entity_id: EntityId::from(id),
            location: Vector2::new(x, 0.0),
            item_info: None,
            damageable_info: None,
            character_info: None,
            available_action_ids: None,
        }
    }

    pub fn item(id: &str, key: &str, x: f64) -> EntityInfo {
        EntityInfo {
            item_info: Some(ItemEntityInfo {
                item_config_key: key.to_string(),
                item_name: key.to_string(),
                description: format!("A {key}"),
                can_be_picked_up: true,
                amount: 1,
            }),
            available_action_ids: Some(vec!["pickup".to_string()]),
            ..entity(id, x)
        }
    }

    pub fn character(id: &str, name: &str, x: f64) -> EntityInfo {
        EntityInfo {
            character_info: Some(CharacterInfo {
                name: name.to_string(),
                gender: "female".to_string(),
                age: 30,
                description: "A farmer".to_string(),
                equipped_item_config_key: None,
            }),
            ..entity(id, x)
        }
    }

    pub fn input(agent_type: &str, time: f64, entities: Vec<EntityInfo>) -> StepInput {
        StepInput {
            agent_type: agent_type.to_string(),
            step_id: format!("step-{time}"),
            agent_id: "agent-1".to_string(),
            simulation_id: "sim-1".to_string(),
            simulation_time: time,
            self_info: SelfInfo {
                entity_info: character("me", "Ada", 0.0),
                core_personality: "Curious and kind.".to_string(),
                initial_memories: Vec::new(),
                observation_distance: 500.0,
                inventory_info: Default::default(),
                equipped_item_config_key: None,
            },
            new_observations: Observations {
                entities_by_id: entities
                    .into_iter()
                    .map(|entity| (entity.entity_id.clone(), entity))
                    .collect(),
                ..Observations::default()
            },
            world_constants: serde_json::json!({"distanceUnit": "centimeters"}),
            crafting_recipes: Vec::new(),
        }
    }
}
