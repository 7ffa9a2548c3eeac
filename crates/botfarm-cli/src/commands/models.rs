use anyhow::Result;
use botfarm_ai::ModelInfo;
use comfy_table::{Cell, Table};

use crate::cli::OutputFormat;
use crate::output::print_json;

pub fn run(format: OutputFormat) -> Result<()> {
    let models = ModelInfo::known();
    if format.is_json() {
        return print_json(&models);
    }

    let mut table = Table::new();
    table.set_header(vec!["Model", "Context", "Input $/1K", "Output $/1K"]);
    for model in &models {
        table.add_row(vec![
            Cell::new(&model.model_id),
            Cell::new(model.max_token_count),
            Cell::new(format!("{:.4}", model.cost_per_1k_input)),
            Cell::new(format!("{:.4}", model.cost_per_1k_output)),
        ]);
    }
    println!("{table}");
    Ok(())
}
