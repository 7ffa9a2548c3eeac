use std::sync::Arc;

use anyhow::Result;
use botfarm_ai::agent::AgentKind;
use botfarm_ai::{
    AgentContext, AgentMailbox, BuiltPrompt, DefaultAgent, MockLlmClient, ModelInfo,
    ScriptedAgent, counter_for_model,
};
use serde_json::json;

use crate::cli::{BudgetArgs, OutputFormat};
use crate::commands::{load_inputs, override_agent_type};
use crate::config::BotfarmConfig;
use crate::output::print_json;

pub fn run(config: &BotfarmConfig, args: BudgetArgs, format: OutputFormat) -> Result<()> {
    let mut inputs = load_inputs(&args.inputs)?;
    override_agent_type(&mut inputs, args.agent_type.as_deref());
    let input = &inputs[0];
    let kind: AgentKind = input.agent_type.parse()?;

    let model = ModelInfo::lookup(&config.model.id);
    let agent_config = config.agent_config();
    let completion_max_tokens = agent_config.completion_max_tokens;
    // The preview never reaches the model.
    let context = AgentContext::new(
        Arc::new(MockLlmClient::new(&config.model.id)),
        model.clone(),
        counter_for_model(&model.model_id),
    )
    .with_config(agent_config);
    let mailbox = Arc::new(AgentMailbox::new());

    let prompt: BuiltPrompt = match kind {
        AgentKind::Default => DefaultAgent::new(context, mailbox).preview_prompt(input)?,
        AgentKind::Scripted => ScriptedAgent::new(context, mailbox).preview_prompt(input)?,
    };

    if format.is_json() {
        return print_json(&json!({
            "model": model.model_id,
            "agentKind": kind.to_string(),
            "maxTokenCount": model.max_token_count,
            "completionMaxTokens": completion_max_tokens,
            "totalTokens": prompt.total_tokens,
            "inputCostUsd": model.input_cost(prompt.total_tokens),
            "sections": prompt.usage.lines().map(str::trim).collect::<Vec<_>>(),
            "prompt": args.show_prompt.then_some(&prompt.text),
        }));
    }

    println!(
        "Model: {} ({} tokens, {} reserved for the completion)",
        model.model_id, model.max_token_count, completion_max_tokens
    );
    println!("Agent: {kind}");
    println!("Sections:");
    println!("{}", prompt.usage);
    if args.show_prompt {
        println!();
        println!("{}", prompt.text);
    }
    Ok(())
}
