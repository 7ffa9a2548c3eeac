//! Embedded scripting host for agents that act through programs.
//!
//! Scripts run on a blocking thread. Only the functions [`ScriptApi`]
//! registers are reachable, and cancellation is checked at every host
//! call plus periodically by the engine's progress hook.

mod api;
mod literal;

use rhai::{Dynamic, Engine, EvalAltResult};

pub use api::{ScriptApi, SharedWorldView, WorldView};
pub use literal::to_literal;

/// How a script run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Completed,
    /// Stopped by cancellation; not an error.
    Unwound,
    Failed(String),
}

fn is_unwind(error: &EvalAltResult) -> bool {
    match error {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => is_unwind(inner),
        _ => false,
    }
}

/// Engine with the host functions of `api` and nothing else of the host.
pub fn build_engine(api: &ScriptApi) -> Engine {
    let mut engine = Engine::new();
    engine.disable_symbol("eval");

    let bridge = api.bridge().clone();
    engine.on_progress(move |_operations| {
        bridge.check().is_err().then_some(Dynamic::UNIT)
    });
    engine.on_print(|text| tracing::info!(target: "botfarm_ai::script", "{text}"));
    engine.on_debug(|text, _source, position| {
        tracing::debug!(target: "botfarm_ai::script", %position, "{text}")
    });

    api.register(&mut engine);
    engine
}

/// Run `source` to completion on the current thread.
pub fn run_script(api: &ScriptApi, source: &str) -> ScriptOutcome {
    let engine = build_engine(api);
    match engine.run(source) {
        Ok(()) => ScriptOutcome::Completed,
        Err(error) if is_unwind(&error) => {
            tracing::debug!("Script unwound");
            ScriptOutcome::Unwound
        }
        Err(error) => ScriptOutcome::Failed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::RwLock;

    use super::*;
    use crate::bridge::{ActionBridge, AgentMailbox, BridgeConfig, CancelToken};
    use crate::protocol::{
        ActionKind, ActionOutcome, ActionResult, EntityId, EntityInfo, InventoryInfo,
        ItemStackInfo, Observations, SelfInfo, Vector2,
    };

    fn config() -> BridgeConfig {
        BridgeConfig {
            poll_interval_ms: 5,
            started_timeout_ms: 2_000,
            result_timeout_ms: Some(2_000),
            speak_pause_ms: 0,
        }
    }

    fn world() -> SharedWorldView {
        let entity = |id: &str, x: f64| EntityInfo {
            observed_at_simulation_time: 0.0,
            entity_id: EntityId::from(id),
            location: Vector2::new(x, 0.0),
            item_info: None,
            damageable_info: None,
            character_info: None,
            available_action_ids: None,
        };
        Arc::new(RwLock::new(WorldView {
            self_info: Some(SelfInfo {
                entity_info: entity("me", 0.0),
                core_personality: String::new(),
                initial_memories: Vec::new(),
                observation_distance: 100.0,
                inventory_info: InventoryInfo {
                    item_stacks: vec![ItemStackInfo {
                        amount: 3,
                        item_config_key: "wood".to_string(),
                        item_name: "Wood".to_string(),
                        item_description: String::new(),
                        can_be_equipped: false,
                        can_be_dropped: true,
                        is_equipped: false,
                    }],
                },
                equipped_item_config_key: None,
            }),
            nearby_entities: vec![entity("tree-1", 5.0), entity("tree-2", 9.0)],
            crafting_recipes: Vec::new(),
        }))
    }

    fn api(mailbox: Arc<AgentMailbox>, cancel: CancelToken) -> ScriptApi {
        ScriptApi::new(ActionBridge::new(mailbox, cancel, config()), world())
    }

    /// Answers each queued action and returns their kinds in order.
    fn simulate(mailbox: Arc<AgentMailbox>, count: usize) -> thread::JoinHandle<Vec<ActionKind>> {
        thread::spawn(move || {
            let mut kinds = Vec::new();
            while kinds.len() < count {
                for action in mailbox.drain_outputs().into_iter().flat_map(|o| o.actions) {
                    mailbox.receive(&Observations {
                        started_action_unique_ids: vec![action.action_unique_id.clone()],
                        action_results: vec![ActionResult {
                            action_unique_id: action.action_unique_id.clone(),
                            outcome: ActionOutcome::Success,
                        }],
                        ..Observations::default()
                    });
                    kinds.push(action.kind);
                }
                thread::sleep(Duration::from_millis(1));
            }
            kinds
        })
    }

    #[test]
    fn test_script_drives_actions_in_order() {
        let mailbox = Arc::new(AgentMailbox::new());
        let simulation = simulate(mailbox.clone(), 3);
        let api = api(mailbox.clone(), CancelToken::new());

        let source = r#"
            let trees = nearby_entities();
            walk_to(trees[0].location, "closest tree");
            if inventory_amount("wood") >= 3 {
                craft_item("fence");
            }
            speak("done");
            record_thought("fences need wood");
        "#;
        assert_eq!(run_script(&api, source), ScriptOutcome::Completed);

        let kinds = simulation.join().unwrap();
        assert_eq!(
            kinds[0],
            ActionKind::Walk {
                location: Vector2::new(5.0, 0.0),
                reason: Some("closest tree".to_string()),
            }
        );
        assert_eq!(kinds[1].name(), "craftItem");
        assert_eq!(kinds[2].name(), "speak");
        assert_eq!(mailbox.take_thoughts(), vec!["fences need wood".to_string()]);
    }

    #[test]
    fn test_cancelled_script_unwinds_without_further_actions() {
        let mailbox = Arc::new(AgentMailbox::new());
        let cancel = CancelToken::new();
        let api = api(mailbox.clone(), cancel.clone());

        let program = thread::spawn(move || run_script(&api, "sleep(60000); speak(\"never\");"));
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        assert_eq!(program.join().unwrap(), ScriptOutcome::Unwound);
        assert_eq!(mailbox.pending_output_count(), 0);
    }

    #[test]
    fn test_busy_loop_is_cancelled_by_progress_hook() {
        let mailbox = Arc::new(AgentMailbox::new());
        let cancel = CancelToken::new();
        let api = api(mailbox, cancel.clone());

        let program = thread::spawn(move || run_script(&api, "let x = 0; loop { x += 1; }"));
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        assert_eq!(program.join().unwrap(), ScriptOutcome::Unwound);
    }

    #[test]
    fn test_unwind_inside_script_function() {
        let mailbox = Arc::new(AgentMailbox::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let api = api(mailbox, cancel);

        let source = "fn greet() { speak(\"hi\"); } greet();";
        assert_eq!(run_script(&api, source), ScriptOutcome::Unwound);
    }

    #[test]
    fn test_script_errors_are_failures() {
        let api = api(Arc::new(AgentMailbox::new()), CancelToken::new());
        assert!(matches!(
            run_script(&api, "let x = ;"),
            ScriptOutcome::Failed(_)
        ));
        assert!(matches!(
            run_script(&api, "open_file(\"/etc/passwd\");"),
            ScriptOutcome::Failed(_)
        ));
    }
}
