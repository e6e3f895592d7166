//! Table output formatting for CLI commands
//!
//! Renders sessions, prompt parameters and populations with comfy-table.
//! Colors are disabled for `NO_COLOR` and dumb terminals.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::{format_fitness, truncate};
use crate::domain::models::{Generation, OptimizationSession, PromptParameter, SessionStatus};
use crate::services::PopulationView;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    pub const fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    pub fn format_sessions(&self, sessions: &[OptimizationSession]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["ID", "Module", "User", "Status", "Gen", "Best", "Budget", "Created"]));

        for session in sessions {
            let best = session.best_genome.as_ref().map(|b| b.fitness).or_else(|| {
                session
                    .generations
                    .iter()
                    .map(|g| g.best_fitness)
                    .reduce(f64::max)
            });

            table.add_row(vec![
                Cell::new(short_id(&session.id.to_string())),
                Cell::new(truncate(&session.module_id, 24)),
                Cell::new(truncate(&session.user_id, 16)),
                self.status_cell(session.status),
                Cell::new(format!(
                    "{}/{}",
                    session.generations.len(),
                    session.config.effective_generations() + 1
                )),
                Cell::new(format_fitness(best)),
                Cell::new(format!("{:.1}/{:.1}", session.consumed_budget, session.config.budget)),
                Cell::new(session.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        table.to_string()
    }

    pub fn format_parameters(&self, parameters: &[PromptParameter]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["ID", "Module", "Name", "Initial prompt", "Optimized"]));

        for parameter in parameters {
            let optimized = if parameter.final_prompt.is_some() { "yes" } else { "no" };
            let optimized_cell = if self.use_colors && parameter.final_prompt.is_some() {
                Cell::new(optimized).fg(Color::Green)
            } else {
                Cell::new(optimized)
            };

            table.add_row(vec![
                Cell::new(parameter.id.to_string()),
                Cell::new(truncate(&parameter.module_id, 24)),
                Cell::new(truncate(&parameter.name, 24)),
                Cell::new(truncate(&parameter.initial_prompt, 48)),
                optimized_cell,
            ]);
        }

        table.to_string()
    }

    pub fn format_generations(&self, generations: &[Generation]) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["Generation", "Size", "Evaluations", "Best", "Mean"]));

        for generation in generations {
            table.add_row(vec![
                Cell::new(generation.index),
                Cell::new(generation.size()),
                Cell::new(generation.evaluations),
                Cell::new(format_fitness(Some(generation.best_fitness))),
                Cell::new(format_fitness(Some(generation.mean_fitness))),
            ]);
        }

        table.to_string()
    }

    pub fn format_population(&self, view: &PopulationView) -> String {
        let mut table = create_base_table();
        table.set_header(header(&["Rank", "Fitness", "Outcome", "Prompts"]));

        for individual in &view.individuals {
            let prompts = individual
                .genome
                .iter()
                .map(|(_, text)| truncate(text, 60))
                .collect::<Vec<_>>()
                .join("\n");

            table.add_row(vec![
                Cell::new(individual.rank),
                Cell::new(format_fitness(Some(individual.fitness))),
                Cell::new(individual.outcome.to_string()),
                Cell::new(prompts),
            ]);
        }

        table.to_string()
    }

    fn status_cell(&self, status: SessionStatus) -> Cell {
        if self.use_colors {
            Cell::new(status.to_string()).fg(status_color(status))
        } else {
            Cell::new(status.to_string())
        }
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn create_base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|title| Cell::new(title).add_attribute(Attribute::Bold))
        .collect()
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

const fn status_color(status: SessionStatus) -> Color {
    match status {
        SessionStatus::Created => Color::Blue,
        SessionStatus::Running => Color::Yellow,
        SessionStatus::Completed => Color::Green,
        SessionStatus::Failed => Color::Red,
        SessionStatus::Cancelled => Color::DarkGrey,
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}
