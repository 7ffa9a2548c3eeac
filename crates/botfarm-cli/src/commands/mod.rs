pub mod budget;
pub mod models;
pub mod replay;

use std::path::Path;

use anyhow::{Context, Result, bail};
use botfarm_ai::StepInput;

/// Read recorded inputs: a JSON array, one JSON object, or one object per
/// line.
pub fn load_inputs(path: &Path) -> Result<Vec<StepInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inputs file {}", path.display()))?;
    let trimmed = content.trim_start();

    let inputs = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)
            .with_context(|| format!("Failed to parse inputs array in {}", path.display()))?
    } else {
        let mut inputs = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let input = serde_json::from_str(line).with_context(|| {
                format!("Failed to parse input on line {} of {}", number + 1, path.display())
            });
            match input {
                Ok(input) => inputs.push(input),
                // A pretty-printed single object spans several lines.
                Err(_) if number == 0 => {
                    inputs.push(serde_json::from_str(trimmed).with_context(|| {
                        format!("Failed to parse input in {}", path.display())
                    })?);
                    break;
                }
                Err(error) => return Err(error),
            }
        }
        inputs
    };

    if inputs.is_empty() {
        bail!("No inputs found in {}", path.display());
    }
    Ok(inputs)
}

/// Apply an `--agent-type` override.
pub fn override_agent_type(inputs: &mut [StepInput], agent_type: Option<&str>) {
    if let Some(agent_type) = agent_type {
        for input in inputs {
            input.agent_type = agent_type.to_string();
        }
    }
}
