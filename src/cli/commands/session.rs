//! Optimization session CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::time::Duration;
use uuid::Uuid;

use crate::cli::context::AppContext;
use crate::cli::output::progress::create_spinner;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{format_fitness, output, CommandOutput};
use crate::domain::errors::OptimizationError;
use crate::domain::models::{OptimizationConfig, OptimizationSession, SessionStatus};
use crate::domain::ports::SessionFilter;
use crate::services::{OptimizationProgress, OptimizationService, OptimizationStats, PopulationView};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

/// Overrides applied on top of `optimization_defaults`
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Genomes per generation
    #[arg(long)]
    pub population_size: Option<usize>,
    /// Generations after the initial one
    #[arg(long)]
    pub generations: Option<usize>,
    /// Per-parameter mutation probability
    #[arg(long)]
    pub mutation_rate: Option<f64>,
    /// Parent pair recombination probability
    #[arg(long)]
    pub crossover_rate: Option<f64>,
    /// Individuals sampled per tournament
    #[arg(long)]
    pub tournament_size: Option<usize>,
    /// Genomes carried over unchanged
    #[arg(long)]
    pub elitism_count: Option<usize>,
    /// Reflection capability used for mutation
    #[arg(long)]
    pub reflection_model: Option<String>,
    /// Maximum prompt length in characters
    #[arg(long)]
    pub max_prompt_length: Option<usize>,
    /// Evaluation cost budget
    #[arg(long)]
    pub budget: Option<f64>,
    /// Minimum fractional improvement that counts as progress
    #[arg(long)]
    pub convergence_threshold: Option<f64>,
    /// Absolute generation cap
    #[arg(long)]
    pub max_iterations: Option<usize>,
    /// Stale generations tolerated before convergence
    #[arg(long)]
    pub convergence_patience: Option<usize>,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: OptimizationConfig) -> OptimizationConfig {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        set!(
            population_size,
            generations,
            mutation_rate,
            crossover_rate,
            tournament_size,
            elitism_count,
            reflection_model,
            max_prompt_length,
            budget,
            convergence_threshold,
            max_iterations,
            convergence_patience
        );
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Create a session over prompt parameters of one module
    Create {
        /// Module under optimization
        #[arg(short, long)]
        module: String,
        /// Prompt parameter IDs (comma-separated)
        #[arg(short, long = "param", value_delimiter = ',', required = true)]
        params: Vec<Uuid>,
        /// Owner of the session
        #[arg(short, long, env = "GEPA_USER_ID", default_value = "local")]
        user: String,
        /// Run the session in the foreground right away
        #[arg(long)]
        run: bool,
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    /// Run a created session in the foreground
    Run {
        /// Session ID
        id: Uuid,
    },
    /// Show a session and its generations
    Show {
        /// Session ID
        id: Uuid,
    },
    /// List sessions
    List {
        /// Only this user's sessions, paginated
        #[arg(short, long)]
        user: Option<String>,
        /// 1-based page (with --user)
        #[arg(long, default_value = "1")]
        page: usize,
        /// Page size, 1-100 (with --user)
        #[arg(long, default_value = "20")]
        page_size: usize,
        /// Filter by status (created, running, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by module
        #[arg(short, long)]
        module: Option<String>,
    },
    /// Cancel a session
    Cancel {
        /// Session ID
        id: Uuid,
    },
    /// Delete a session and its generations
    Delete {
        /// Session ID
        id: Uuid,
    },
    /// Show run progress
    Progress {
        /// Session ID
        id: Uuid,
    },
    /// Show the latest generation ranked by fitness
    Population {
        /// Session ID
        id: Uuid,
    },
    /// Aggregate statistics over all sessions
    Stats,
    /// Mark sessions left running by a terminated process as failed
    Recover,
    /// Delete finished sessions older than the given age
    Cleanup {
        /// Maximum age in hours
        #[arg(long, default_value = "168")]
        max_age_hours: i64,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SessionOutput {
    pub session: OptimizationSession,
}

impl CommandOutput for SessionOutput {
    fn to_human(&self) -> String {
        let s = &self.session;
        let mut lines = vec![
            format!("Session: {}", s.id),
            format!("Module: {}", s.module_id),
            format!("User: {}", s.user_id),
            format!("Status: {}", s.status),
            format!(
                "Config: population {} | generations {} (cap {}) | elitism {} | tournament {} | reflection '{}'",
                s.config.population_size,
                s.config.generations,
                s.config.max_iterations,
                s.config.elitism_count,
                s.config.tournament_size,
                s.config.reflection_model
            ),
            format!("Budget: {:.2} of {:.2}", s.consumed_budget, s.config.budget),
        ];

        if let Some(reason) = s.stop_reason {
            lines.push(format!("Stop reason: {reason}"));
        }
        if let Some(error) = &s.error {
            lines.push(format!("Error: {error}"));
        }
        if let Some(best) = &s.best_genome {
            lines.push(format!("\nBest fitness: {}", format_fitness(Some(best.fitness))));
            for (id, text) in best.genome.iter() {
                lines.push(format!("  [{id}]\n  {text}"));
            }
        }
        if !s.generations.is_empty() {
            lines.push(String::new());
            lines.push(TableFormatter::new().format_generations(&s.generations));
        }

        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct SessionListOutput {
    pub sessions: Vec<OptimizationSession>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

impl CommandOutput for SessionListOutput {
    fn to_human(&self) -> String {
        if self.sessions.is_empty() {
            return "No sessions found.".to_string();
        }
        let footer = match self.page {
            Some(page) => format!("Page {page}: {} of {} session(s)", self.sessions.len(), self.total),
            None => format!("Showing {} session(s)", self.total),
        };
        format!("{}\n\n{footer}", TableFormatter::new().format_sessions(&self.sessions))
    }

    fn to_json(&self) -> serde_json::Value {
        // Generations are omitted from listings; `session show` has them
        let sessions: Vec<serde_json::Value> = self
            .sessions
            .iter()
            .map(|s| {
                let mut value = serde_json::to_value(s).unwrap_or_default();
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("generations");
                    obj.remove("seed_population");
                }
                value
            })
            .collect();
        serde_json::json!({ "sessions": sessions, "total": self.total, "page": self.page })
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProgressOutput {
    #[serde(flatten)]
    pub progress: OptimizationProgress,
}

impl CommandOutput for ProgressOutput {
    fn to_human(&self) -> String {
        let p = &self.progress;
        let generation = p
            .current_generation
            .map_or_else(|| "-".to_string(), |g| g.to_string());
        let mut lines = vec![
            format!("Session: {}", p.session_id),
            format!("Status: {}", p.status),
            format!("Generation: {generation} of {}", p.total_generations),
            format!("Progress: {:.0}%", p.progress * 100.0),
            format!("Best fitness: {}", format_fitness(p.best_fitness)),
            format!("Budget: {:.2} of {:.2}", p.consumed_budget, p.budget),
        ];
        if let Some(eta) = p.estimated_remaining_seconds {
            lines.push(format!("Estimated remaining: {eta:.0}s"));
        }
        if let Some(error) = &p.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct PopulationOutput {
    #[serde(flatten)]
    pub view: PopulationView,
}

impl CommandOutput for PopulationOutput {
    fn to_human(&self) -> String {
        let v = &self.view;
        let Some(generation) = v.generation else {
            return format!("Session {} has no evaluated generations yet.", v.session_id);
        };
        format!(
            "Generation {generation} ({} individuals)\nBest: {} | Worst: {} | Average: {}\n\n{}",
            v.population_size,
            format_fitness(v.best_fitness),
            format_fitness(v.worst_fitness),
            format_fitness(v.average_fitness),
            TableFormatter::new().format_population(v)
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StatsOutput {
    #[serde(flatten)]
    pub stats: OptimizationStats,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let s = &self.stats;
        let mut lines = vec![
            format!("Total sessions: {}", s.total_sessions),
            format!("Completed: {}", s.completed_sessions),
            format!("Running: {}", s.running_sessions),
            format!("Success rate: {:.1}%", s.success_rate * 100.0),
            format!("Average best fitness: {}", format_fitness(s.average_best_fitness)),
        ];
        if !s.by_status.is_empty() {
            lines.push("\nBy status:".to_string());
            lines.extend(s.by_status.iter().map(|(k, v)| format!("  {k}: {v}")));
        }
        if !s.by_module.is_empty() {
            lines.push("\nBy module:".to_string());
            lines.extend(s.by_module.iter().map(|(k, v)| format!("  {k}: {v}")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: SessionArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let service = &ctx.service;

    match args.command {
        SessionCommands::Create {
            module,
            params,
            user,
            run,
            overrides,
        } => {
            let config = overrides.apply(ctx.config.optimization_defaults.clone());
            let session = service
                .create_session(&user, &module, config, params)
                .await
                .context("Failed to create session")?;

            if run {
                let finished = run_foreground(service, session.id, json_mode).await?;
                output(&SessionOutput { session: finished }, json_mode);
            } else {
                output(&SessionOutput { session }, json_mode);
            }
        }

        SessionCommands::Run { id } => {
            let finished = run_foreground(service, id, json_mode).await?;
            output(&SessionOutput { session: finished }, json_mode);
        }

        SessionCommands::Show { id } => {
            let session = service
                .get_session(id)
                .await?
                .ok_or(OptimizationError::SessionNotFound(id))?;
            output(&SessionOutput { session }, json_mode);
        }

        SessionCommands::List {
            user,
            page,
            page_size,
            status,
            module,
        } => {
            let out = match user {
                Some(user) => {
                    let page = service
                        .user_sessions(&user, page, page_size)
                        .await
                        .context("Failed to list sessions")?;
                    SessionListOutput {
                        total: page.total,
                        page: Some(page.page),
                        sessions: page.items,
                    }
                }
                None => {
                    let filter = SessionFilter {
                        status: status
                            .as_deref()
                            .map(str::parse::<SessionStatus>)
                            .transpose()
                            .context("Invalid status filter")?,
                        module_id: module,
                    };
                    let sessions = service.list_sessions(filter).await.context("Failed to list sessions")?;
                    SessionListOutput {
                        total: sessions.len(),
                        page: None,
                        sessions,
                    }
                }
            };
            output(&out, json_mode);
        }

        SessionCommands::Cancel { id } => {
            let session = service.cancel(id).await.context("Failed to cancel session")?;
            let out = ActionOutput {
                success: true,
                message: format!("Session {} is {}", session.id, session.status),
            };
            output(&out, json_mode);
        }

        SessionCommands::Delete { id } => {
            let deleted = service.delete(id).await.context("Failed to delete session")?;
            let out = ActionOutput {
                success: deleted,
                message: if deleted {
                    format!("Session deleted: {id}")
                } else {
                    format!("Session not found: {id}")
                },
            };
            output(&out, json_mode);
        }

        SessionCommands::Progress { id } => {
            let progress = service.progress(id).await?;
            output(&ProgressOutput { progress }, json_mode);
        }

        SessionCommands::Population { id } => {
            let view = service.population(id).await?;
            output(&PopulationOutput { view }, json_mode);
        }

        SessionCommands::Stats => {
            let stats = service.stats().await?;
            output(&StatsOutput { stats }, json_mode);
        }

        SessionCommands::Recover => {
            let recovered = service
                .recover_interrupted()
                .await
                .context("Failed to recover interrupted sessions")?;
            let out = ActionOutput {
                success: true,
                message: format!("Marked {recovered} interrupted session(s) as failed"),
            };
            output(&out, json_mode);
        }

        SessionCommands::Cleanup { max_age_hours } => {
            let removed = service
                .cleanup(max_age_hours)
                .await
                .context("Failed to clean up sessions")?;
            let out = ActionOutput {
                success: true,
                message: format!("Removed {removed} session(s) older than {max_age_hours}h"),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

/// Execute a session and wait for it, cancelling on Ctrl-C.
async fn run_foreground(
    service: &OptimizationService,
    id: Uuid,
    json_mode: bool,
) -> Result<OptimizationSession> {
    let Some(mut handle) = service.execute(id).await else {
        let session = service
            .get_session(id)
            .await?
            .ok_or(OptimizationError::SessionNotFound(id))?;
        anyhow::bail!("Session {id} cannot be run (status: {})", session.status);
    };

    let spinner = create_spinner(json_mode);
    spinner.set_message("evaluating initial population");
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut cancelled = false;

    loop {
        tokio::select! {
            joined = &mut handle => {
                joined.context("Optimization task failed to complete")?;
                break;
            }
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                cancelled = true;
                spinner.set_message("cancelling");
                service.cancel(id).await.context("Failed to cancel session")?;
            }
            _ = ticker.tick() => {
                if let Ok(progress) = service.progress(id).await {
                    spinner.set_message(progress_message(&progress));
                }
            }
        }
    }

    let session = service
        .get_session(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Session disappeared while running: {id}"))?;
    spinner.finish_and_clear();
    Ok(session)
}

fn progress_message(progress: &OptimizationProgress) -> String {
    let generation = progress
        .current_generation
        .map_or_else(|| "-".to_string(), |g| g.to_string());
    format!(
        "generation {generation}/{} | best {} | budget {:.1}/{:.1}",
        progress.total_generations,
        format_fitness(progress.best_fitness),
        progress.consumed_budget,
        progress.budget
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_only_given_fields() {
        let overrides = ConfigOverrides {
            population_size: Some(4),
            budget: Some(1000.0),
            reflection_model: Some("claude-3-5-haiku-latest".into()),
            ..Default::default()
        };

        let config = overrides.apply(OptimizationConfig::default());
        assert_eq!(config.population_size, 4);
        assert!((config.budget - 1000.0).abs() < f64::EPSILON);
        assert_eq!(config.reflection_model, "claude-3-5-haiku-latest");
        assert_eq!(config.generations, OptimizationConfig::default().generations);
    }
}
