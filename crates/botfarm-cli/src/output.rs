use anyhow::Result;
use botfarm_ai::StepOutput;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}

pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// One-line human summary of an agent output.
pub fn describe_output(agent_key: &str, output: &StepOutput) -> String {
    let mut parts = vec![format!("[{agent_key}]")];
    if let Some(status) = output.agent_status {
        parts.push(serde_json::to_value(status).map_or_else(
            |_| format!("{status:?}"),
            |value| value.as_str().unwrap_or_default().to_string(),
        ));
    }
    for action in &output.actions {
        parts.push(format!("action={}", action.kind.name()));
    }
    if !output.prompt_usages.is_empty() {
        let tokens: u32 = output
            .prompt_usages
            .iter()
            .map(|info| info.usage.total_tokens)
            .sum();
        parts.push(format!("tokens={tokens}"));
    }
    if output.was_rate_limited {
        parts.push("rate-limited".to_string());
    }
    if let Some(error) = &output.error {
        parts.push(format!("error={}", error.replace('\n', " | ")));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use botfarm_ai::protocol::{Action, ActionKind, AgentStatus};

    use super::*;

    #[test]
    fn test_describe_output() {
        let output = StepOutput::status(AgentStatus::PromptFinished, 1.0)
            .with_actions(vec![Action::new(ActionKind::Speak {
                message: "hi".to_string(),
            })])
            .with_errors(&["first".to_string(), "second".to_string()], false);
        assert_eq!(
            describe_output("sim:a:default", &output),
            "[sim:a:default] prompt-finished action=speak error=first | second"
        );
    }
}
