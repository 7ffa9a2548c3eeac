//! The fixed set of host functions a script can call.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rhai::{Array, Dynamic, Engine, EvalAltResult, INT, Map, Position};

use crate::bridge::{ActionBridge, BridgeError};
use crate::protocol::{
    ActionKind, CraftingRecipe, EntityInfo, InventoryInfo, SelfInfo, StepInput, Vector2,
};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// The latest world snapshot, as scripts see it.
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    pub self_info: Option<SelfInfo>,
    /// Observed entities, nearest first.
    pub nearby_entities: Vec<EntityInfo>,
    pub crafting_recipes: Vec<CraftingRecipe>,
}

impl WorldView {
    pub fn update(&mut self, input: &StepInput) {
        let location = input.self_info.location();
        let mut entities: Vec<EntityInfo> = input
            .new_observations
            .entities_by_id
            .values()
            .filter(|entity| entity.entity_id != input.self_info.entity_info.entity_id)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            a.location
                .distance(&location)
                .total_cmp(&b.location.distance(&location))
        });

        self.self_info = Some(input.self_info.clone());
        self.nearby_entities = entities;
        self.crafting_recipes = input.crafting_recipes.clone();
    }

    fn inventory(&self) -> InventoryInfo {
        self.self_info
            .as_ref()
            .map(|info| info.inventory_info.clone())
            .unwrap_or_default()
    }
}

pub type SharedWorldView = Arc<RwLock<WorldView>>;

fn bridge_error(error: BridgeError) -> Box<EvalAltResult> {
    match error {
        BridgeError::Unwound | BridgeError::Closed => {
            EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE).into()
        }
        other => EvalAltResult::ErrorRuntime(other.to_string().into(), Position::NONE).into(),
    }
}

fn number(value: &Dynamic) -> ScriptResult<f64> {
    value
        .as_float()
        .or_else(|_| value.as_int().map(|i| i as f64))
        .map_err(|type_name| {
            EvalAltResult::ErrorRuntime(
                format!("expected a number, got {type_name}").into(),
                Position::NONE,
            )
            .into()
        })
}

fn vector_from_map(map: &Map) -> ScriptResult<Vector2> {
    let coordinate = |key: &str| {
        map.get(key).map(number).unwrap_or_else(|| {
            Err(EvalAltResult::ErrorRuntime(
                format!("location is missing '{key}'").into(),
                Position::NONE,
            )
            .into())
        })
    };
    Ok(Vector2::new(coordinate("x")?, coordinate("y")?))
}

fn vector_to_map(vector: Vector2) -> Map {
    let mut map = Map::new();
    map.insert("x".into(), Dynamic::from_float(vector.x));
    map.insert("y".into(), Dynamic::from_float(vector.y));
    map
}

fn to_array<T: serde::Serialize>(items: &[T]) -> ScriptResult<Array> {
    items.iter().map(rhai::serde::to_dynamic).collect()
}

/// Capabilities bound to one agent, exposed to one script run.
#[derive(Clone)]
pub struct ScriptApi {
    bridge: ActionBridge,
    world: SharedWorldView,
}

impl ScriptApi {
    pub fn new(bridge: ActionBridge, world: SharedWorldView) -> Self {
        Self { bridge, world }
    }

    pub fn bridge(&self) -> &ActionBridge {
        &self.bridge
    }

    fn act(&self, kind: ActionKind) -> ScriptResult<bool> {
        self.bridge
            .perform(kind)
            .map(|result| result.succeeded())
            .map_err(bridge_error)
    }

    fn speak(&self, message: &str) -> ScriptResult<bool> {
        let succeeded = self.act(ActionKind::Speak {
            message: message.to_string(),
        })?;
        self.bridge
            .sleep(self.bridge.config().speak_pause())
            .map_err(bridge_error)?;
        Ok(succeeded)
    }

    fn walk_to(&self, location: &Map, reason: Option<String>) -> ScriptResult<bool> {
        self.act(ActionKind::Walk {
            location: vector_from_map(location)?,
            reason,
        })
    }

    fn pick_up_entity(&self, entity_id: &str, reason: Option<String>) -> ScriptResult<bool> {
        self.act(ActionKind::PickUpEntity {
            target_entity_id: entity_id.into(),
            reason,
        })
    }

    fn use_tool_on_entity(&self, entity_id: &str, reason: Option<String>) -> ScriptResult<bool> {
        self.act(ActionKind::UseEquippedToolItemOnEntity {
            target_entity_id: entity_id.into(),
            reason,
        })
    }

    fn equip_item(&self, item_config_key: &str, reason: Option<String>) -> ScriptResult<bool> {
        self.act(ActionKind::EquipInventoryItem {
            item_config_key: item_config_key.to_string(),
            stack_index: None,
            reason,
        })
    }

    fn drop_item(
        &self,
        item_config_key: &str,
        amount: INT,
        reason: Option<String>,
    ) -> ScriptResult<bool> {
        self.act(ActionKind::DropInventoryItem {
            item_config_key: item_config_key.to_string(),
            stack_index: None,
            amount: Some(amount),
            reason,
        })
    }

    fn craft_item(&self, item_config_key: &str, reason: Option<String>) -> ScriptResult<bool> {
        self.act(ActionKind::CraftItem {
            item_config_key: item_config_key.to_string(),
            reason,
        })
    }

    fn nearby_entities(&self) -> ScriptResult<Array> {
        self.bridge.check().map_err(bridge_error)?;
        to_array(&self.world.read().nearby_entities)
    }

    fn inventory_item_stacks(&self) -> ScriptResult<Array> {
        self.bridge.check().map_err(bridge_error)?;
        let inventory = self.world.read().inventory();
        inventory
            .item_stacks
            .iter()
            .enumerate()
            .map(|(index, stack)| {
                let mut value = rhai::serde::to_dynamic(stack)?;
                if let Some(mut map) = value.write_lock::<Map>() {
                    map.insert("stackIndex".into(), Dynamic::from_int(index as INT));
                }
                Ok(value)
            })
            .collect()
    }

    fn crafting_recipes(&self) -> ScriptResult<Array> {
        self.bridge.check().map_err(bridge_error)?;
        let world = self.world.read();
        let inventory = world.inventory();
        let recipes: Vec<CraftingRecipe> = world
            .crafting_recipes
            .iter()
            .map(|recipe| {
                let mut recipe = recipe.clone();
                recipe.can_currently_afford = recipe
                    .cost
                    .entries
                    .iter()
                    .all(|entry| inventory.total_amount(&entry.item_config_key) >= entry.amount);
                recipe
            })
            .collect();
        to_array(&recipes)
    }

    fn inventory_amount(&self, item_config_key: &str) -> ScriptResult<INT> {
        self.bridge.check().map_err(bridge_error)?;
        Ok(self.world.read().inventory().total_amount(item_config_key))
    }

    /// Bind every host function into `engine`.
    pub fn register(&self, engine: &mut Engine) {
        let api = self.clone();
        engine.register_fn("speak", move |message: &str| api.speak(message));

        let api = self.clone();
        engine.register_fn("walk_to", move |location: Map| api.walk_to(&location, None));
        let api = self.clone();
        engine.register_fn("walk_to", move |location: Map, reason: &str| {
            api.walk_to(&location, Some(reason.to_string()))
        });

        let api = self.clone();
        engine.register_fn("pick_up_entity", move |id: &str| api.pick_up_entity(id, None));
        let api = self.clone();
        engine.register_fn("pick_up_entity", move |id: &str, reason: &str| {
            api.pick_up_entity(id, Some(reason.to_string()))
        });

        let api = self.clone();
        engine.register_fn("use_equipped_tool_item_on_entity", move |id: &str| {
            api.use_tool_on_entity(id, None)
        });
        let api = self.clone();
        engine.register_fn(
            "use_equipped_tool_item_on_entity",
            move |id: &str, reason: &str| api.use_tool_on_entity(id, Some(reason.to_string())),
        );

        let api = self.clone();
        engine.register_fn("use_equipped_tool_item", move || {
            api.act(ActionKind::UseEquippedToolItem { reason: None })
        });
        let api = self.clone();
        engine.register_fn("use_equipped_tool_item", move |reason: &str| {
            api.act(ActionKind::UseEquippedToolItem {
                reason: Some(reason.to_string()),
            })
        });

        let api = self.clone();
        engine.register_fn("equip_item", move |key: &str| api.equip_item(key, None));
        let api = self.clone();
        engine.register_fn("equip_item", move |key: &str, reason: &str| {
            api.equip_item(key, Some(reason.to_string()))
        });

        let api = self.clone();
        engine.register_fn("drop_item", move |key: &str, amount: INT| {
            api.drop_item(key, amount, None)
        });
        let api = self.clone();
        engine.register_fn("drop_item", move |key: &str, amount: INT, reason: &str| {
            api.drop_item(key, amount, Some(reason.to_string()))
        });

        let api = self.clone();
        engine.register_fn("craft_item", move |key: &str| api.craft_item(key, None));
        let api = self.clone();
        engine.register_fn("craft_item", move |key: &str, reason: &str| {
            api.craft_item(key, Some(reason.to_string()))
        });

        let api = self.clone();
        engine.register_fn("set_facial_expression_emoji", move |emoji: &str| {
            api.act(ActionKind::FacialExpressionEmoji {
                emoji: emoji.to_string(),
            })
        });

        let api = self.clone();
        engine.register_fn("record_thought", move |thought: &str| -> ScriptResult<()> {
            api.bridge.check().map_err(bridge_error)?;
            api.bridge.mailbox().record_thought(thought);
            Ok(())
        });

        let api = self.clone();
        engine.register_fn("sleep", move |millis: INT| -> ScriptResult<()> {
            let millis = u64::try_from(millis).unwrap_or(0);
            api.bridge
                .sleep(Duration::from_millis(millis))
                .map_err(bridge_error)
        });

        let api = self.clone();
        engine.register_fn("nearby_entities", move || api.nearby_entities());
        let api = self.clone();
        engine.register_fn("inventory_item_stacks", move || api.inventory_item_stacks());
        let api = self.clone();
        engine.register_fn("crafting_recipes", move || api.crafting_recipes());
        let api = self.clone();
        engine.register_fn("inventory_amount", move |key: &str| api.inventory_amount(key));

        engine.register_fn("vector2", |x: Dynamic, y: Dynamic| -> ScriptResult<Map> {
            Ok(vector_to_map(Vector2::new(number(&x)?, number(&y)?)))
        });
    }
}
