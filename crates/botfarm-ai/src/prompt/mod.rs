//! Token-budgeted prompt assembly.

mod builder;

pub use builder::{AddResult, BuiltPrompt, LineKind, PromptBuilder, PromptError, SectionId};

use crate::protocol::StepInput;

const GENERAL_INFO_TEMPLATE: &str = include_str!("templates/general_info.md");

/// Distance unit the simulation reports in its world constants.
pub fn distance_unit(input: &StepInput) -> &str {
    input
        .world_constants
        .get("distanceUnit")
        .and_then(|value| value.as_str())
        .unwrap_or("units")
}

/// Opening section shared by every agent prompt.
pub fn add_general_info(
    builder: &mut PromptBuilder,
    section: SectionId,
    input: &StepInput,
) -> Result<(), PromptError> {
    let text = GENERAL_INFO_TEMPLATE
        .replace("{distance_unit}", distance_unit(input))
        .replace(
            "{observation_distance}",
            &input.self_info.observation_distance.round().to_string(),
        );
    builder.add_line(section, "## CORE INFO")?;
    builder.add_text(section, &text, LineKind::Required)?;
    builder.add_value(
        section,
        "Current date and time as Unix timestamp",
        input.simulation_time.round() as i64,
    )?;
    builder.add_line(section, "")?;
    Ok(())
}
