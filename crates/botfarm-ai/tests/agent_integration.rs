//! Integration tests driving agents through the container, the way a
//! simulation host does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use botfarm_ai::protocol::{ActionOutcome, ActionResult, AgentStatus, Observations};
use botfarm_ai::{
    AgentConfig, AgentContainer, AgentContext, BridgeConfig, HeuristicCounter, MockLlmClient,
    MockStep, ModelInfo, RunnerConfig, StepInput, StepOutput,
};
use serde_json::json;

fn wire_input(agent_type: &str, time: f64, observations: serde_json::Value) -> StepInput {
    serde_json::from_value(json!({
        "agentType": agent_type,
        "stepId": format!("step-{time}"),
        "agentId": "farmer-1",
        "simulationId": "sim-42",
        "simulationTime": time,
        "selfInfo": {
            "entityInfo": {
                "observedAtSimulationTime": time,
                "entityId": "farmer-1",
                "location": {"x": 100.0, "y": 100.0},
                "characterInfo": {"name": "Ada", "gender": "female", "age": 31}
            },
            "corePersonality": "Hard-working and friendly.",
            "initialMemories": ["I planted the orchard last spring"],
            "observationDistance": 800.0,
            "inventoryInfo": {"itemStacks": [
                {"amount": 2, "itemConfigKey": "axe", "itemName": "Axe", "canBeEquipped": true}
            ]}
        },
        "newObservations": observations,
        "worldConstants": {"distanceUnit": "centimeters", "worldWidth": 4000, "worldHeight": 4000},
        "craftingRecipes": [{
            "itemConfigKey": "fence",
            "itemName": "Fence",
            "cost": {"entries": [{"itemConfigKey": "wood", "amount": 4}]}
        }]
    }))
    .unwrap()
}

fn greeting_observations() -> serde_json::Value {
    json!({
        "entitiesById": {
            "bob": {
                "observedAtSimulationTime": 10.0,
                "entityId": "bob",
                "location": {"x": 150.0, "y": 100.0},
                "characterInfo": {"name": "Bob"}
            },
            "log-7": {
                "observedAtSimulationTime": 10.0,
                "entityId": "log-7",
                "location": {"x": 300.0, "y": 120.0},
                "itemInfo": {"itemConfigKey": "wood", "itemName": "Wood", "canBePickedUp": true},
                "availableActionIds": ["pickup"]
            }
        },
        "spokenMessages": [{
            "entityId": "bob",
            "characterName": "Bob",
            "message": "Can you help me build a fence?",
            "time": 9.5,
            "speakerLocation": {"x": 150.0, "y": 100.0},
            "myLocation": {"x": 100.0, "y": 100.0}
        }]
    })
}

fn container(client: &MockLlmClient) -> AgentContainer {
    let context = AgentContext::new(
        Arc::new(client.clone()),
        ModelInfo::lookup("gpt-4"),
        Arc::new(HeuristicCounter),
    )
    .with_config(AgentConfig {
        bridge: BridgeConfig {
            poll_interval_ms: 5,
            started_timeout_ms: 2_000,
            result_timeout_ms: Some(2_000),
            speak_pause_ms: 0,
        },
        ..AgentConfig::default()
    });
    AgentContainer::new(context, RunnerConfig { step_delay_ms: 10 })
}

/// Poll the container until an output with `status` arrives, feeding each
/// action back as started and succeeded.
async fn outputs_until(
    container: &AgentContainer,
    agent_type: &str,
    status: AgentStatus,
) -> Vec<StepOutput> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut collected = Vec::new();
    loop {
        for output in container.consume_pending_outputs("sim-42", "farmer-1", agent_type) {
            let done = output.agent_status == Some(status);
            let answered = !output.actions.is_empty();
            if answered {
                let mut input = wire_input(agent_type, 20.0, json!({}));
                input.new_observations = Observations {
                    started_action_unique_ids: output
                        .actions
                        .iter()
                        .map(|a| a.action_unique_id.clone())
                        .collect(),
                    action_results: output
                        .actions
                        .iter()
                        .map(|a| ActionResult {
                            action_unique_id: a.action_unique_id.clone(),
                            outcome: ActionOutcome::Success,
                        })
                        .collect(),
                    ..Observations::default()
                };
                container.add_pending_input(input).unwrap();
            }
            collected.push(output);
            if done {
                return collected;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for {status:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_agent_answers_over_the_wire() {
    let client = MockLlmClient::from_steps(
        "gpt-4",
        vec![MockStep::text(
            r#"Bob asked for help.
{"iWantToSay": "Sure, I'll grab some wood.",
 "actionOnEntity": {"targetEntityId": "log-7", "actionId": "pickup", "reason": "fence wood"},
 "newThoughts": ["Bob is building a fence"]}"#,
        )],
    );
    let container = container(&client);
    container
        .add_pending_input(wire_input("default", 10.0, greeting_observations()))
        .unwrap();

    let outputs = outputs_until(&container, "default", AgentStatus::PromptFinished).await;
    let finished = outputs.last().unwrap();
    let wire = serde_json::to_value(finished).unwrap();
    assert_eq!(wire["agentStatus"], "prompt-finished");
    assert_eq!(wire["actions"][0]["speak"]["message"], "Sure, I'll grab some wood.");
    assert_eq!(wire["actions"][1]["pickUpEntity"]["targetEntityId"], "log-7");
    assert_eq!(wire["promptUsages"][0]["modelUsagePricing"]["modelId"], "gpt-4");

    let requests = client.recorded_requests().await;
    let prompt = &requests[0].system_prompt;
    assert!(prompt.contains("Hard-working and friendly."));
    assert!(prompt.contains("Can you help me build a fence?"));
    assert!(prompt.contains(r#""availableActionIds":["pickup"]"#));

    assert_eq!(container.terminate_simulation("sim-42").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scripted_agent_runs_program_through_bridge() {
    let client = MockLlmClient::from_steps(
        "gpt-4",
        vec![MockStep::text(
            "Here is my plan.\n```rhai\nif inventory_amount(\"axe\") > 0 {\n    equip_item(\"axe\");\n}\nwalk_to(wood_entity_1.location, \"get wood\");\nspeak(\"On my way, \" + character_entity_0.characterInfo.name);\n```",
        )],
    );
    let container = container(&client);
    container
        .add_pending_input(wire_input("scripted", 10.0, greeting_observations()))
        .unwrap();

    let outputs = outputs_until(&container, "scripted", AgentStatus::ScriptDone).await;
    let names: Vec<&str> = outputs
        .iter()
        .flat_map(|o| o.actions.iter().map(|a| a.kind.name()))
        .collect();
    assert_eq!(names, vec!["equipInventoryItem", "walk", "speak"]);

    let script = outputs
        .iter()
        .find_map(|o| o.script.as_deref())
        .unwrap();
    assert!(script.starts_with("if inventory_amount"));
    assert!(
        outputs
            .iter()
            .any(|o| o.agent_status == Some(AgentStatus::RunningScript))
    );

    assert_eq!(container.terminate_simulation("sim-42").await, 1);
    assert_eq!(container.agent_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rate_limit_surfaces_to_host() {
    let client = MockLlmClient::from_steps("gpt-4", vec![MockStep::rate_limit()]);
    let container = container(&client);
    container
        .add_pending_input(wire_input("default", 10.0, json!({})))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let failed = loop {
        let outputs = container.consume_pending_outputs("sim-42", "farmer-1", "default");
        if let Some(output) = outputs.into_iter().find(|o| o.error.is_some()) {
            break output;
        }
        assert!(Instant::now() < deadline, "no error output");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert!(failed.was_rate_limited);
    assert!(failed.actions.is_empty());
}
