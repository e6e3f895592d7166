//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - Evaluator / Reflector / PromptModule: capabilities of the module under optimization
//! - SessionRepository: persistence of optimization sessions and generations
//! - PromptParameterRepository: the typed registry of prompt parameters
//!
//! These traits define the contracts that allow the domain to be independent
//! of specific infrastructure implementations.

pub mod prompt_module;
pub mod prompt_parameter_repository;
pub mod session_repository;

pub use prompt_module::{ComposedModule, Evaluation, Evaluator, PromptModule, Reflector};
pub use prompt_parameter_repository::PromptParameterRepository;
pub use session_repository::{SessionFilter, SessionRepository};
