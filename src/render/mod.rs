//! Plan rendering for the CLI.

mod text;

pub use text::{render_fleet_text, render_plan_text};

use crate::plan::Plan;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render one plan in `format`.
pub fn render_plan(plan: &Plan, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => render_plan_text(plan),
        OutputFormat::Json => serde_json::to_string_pretty(plan)? + "\n",
    })
}

/// Render a fleet, one plan per instance, in `format`.
pub fn render_fleet(plans: &[Plan], format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Text => render_fleet_text(plans),
        OutputFormat::Json => serde_json::to_string_pretty(plans)? + "\n",
    })
}
