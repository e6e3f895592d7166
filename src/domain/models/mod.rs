pub mod config;
pub mod optimization;
pub mod prompt_parameter;

pub use config::{Config, DatabaseConfig, ExecutionConfig, LoggingConfig, ReflectionConfig};
pub use optimization::{
    truncate_prompt, EvaluationOutcome, Generation, Genome, OptimizationConfig,
    OptimizationSession, RunToken, ScoredGenome, SessionPage, SessionStatus, StopReason,
    WORST_FITNESS,
};
pub use prompt_parameter::PromptParameter;
