//! Command-line interface

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use crate::domain::errors::OptimizationError;

/// Print a command failure and exit with a non-zero status.
///
/// Input errors exit with 2, everything else with 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = exit_code(&err);

    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }

    std::process::exit(code)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let is_input_error = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<OptimizationError>(),
            Some(
                OptimizationError::InvalidConfig(_)
                    | OptimizationError::InvalidPagination(_)
                    | OptimizationError::SessionNotFound(_)
                    | OptimizationError::ParameterNotFound(_)
            )
        )
    });
    if is_input_error {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_for_input_errors() {
        let err: anyhow::Result<()> =
            Err(OptimizationError::InvalidConfig("population_size".into())).context("create failed");
        assert_eq!(exit_code(&err.unwrap_err()), 2);

        let other = anyhow::anyhow!("database locked");
        assert_eq!(exit_code(&other), 1);
    }
}
