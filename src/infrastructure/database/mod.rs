pub mod connection;
pub mod errors;
pub mod prompt_parameter_repo;
pub mod session_repo;
pub mod utils;

pub use connection::DatabaseConnection;
pub use errors::DatabaseError;
pub use prompt_parameter_repo::SqlitePromptParameterRepository;
pub use session_repo::SqliteSessionRepository;
