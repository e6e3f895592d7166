pub mod convergence_tracker;
pub mod fitness_evaluator;
pub mod genetic_operators;
pub mod module_registry;
pub mod optimization_orchestrator;
pub mod optimization_service;
pub mod session_manager;

pub use convergence_tracker::ConvergenceTracker;
pub use fitness_evaluator::{BudgetLedger, EvaluationBatch, FitnessEvaluator};
pub use genetic_operators::{GeneticOperators, Population};
pub use module_registry::ModuleRegistry;
pub use optimization_orchestrator::OptimizationOrchestrator;
pub use optimization_service::{
    OptimizationProgress, OptimizationService, OptimizationStats, PopulationView, RankedIndividual,
};
pub use session_manager::SessionManager;
