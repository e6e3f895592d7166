use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

use gepa::cli::commands::config::ConfigCommands;
use gepa::cli::commands::param::ParamCommands;
use gepa::cli::commands::session::SessionCommands;
use gepa::cli::{Cli, Commands};

#[test]
fn test_parse_init_with_force() {
    let cli = Cli::try_parse_from(["gepa", "init", "--force"]).unwrap();
    match cli.command {
        Commands::Init(args) => assert!(args.force),
        _ => panic!("Wrong top-level command"),
    }
    assert!(!cli.json);
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "gepa",
        "config",
        "show",
        "--json",
        "--config",
        "custom.yaml",
    ])
    .unwrap();

    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
    match cli.command {
        Commands::Config(args) => assert!(matches!(args.command, ConfigCommands::Show)),
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_param_add() {
    let cli = Cli::try_parse_from([
        "gepa",
        "param",
        "add",
        "--module",
        "qa",
        "--name",
        "system",
        "--prompt",
        "Answer the question.",
    ])
    .unwrap();

    match cli.command {
        Commands::Param(args) => match args.command {
            ParamCommands::Add {
                module,
                name,
                prompt,
                prompt_file,
            } => {
                assert_eq!(module, "qa");
                assert_eq!(name, "system");
                assert_eq!(prompt.as_deref(), Some("Answer the question."));
                assert!(prompt_file.is_none());
            }
            _ => panic!("Wrong param command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_param_add_requires_prompt_source() {
    let result = Cli::try_parse_from(["gepa", "param", "add", "-m", "qa", "-n", "system"]);
    assert!(result.is_err());

    let result = Cli::try_parse_from([
        "gepa",
        "param",
        "add",
        "-m",
        "qa",
        "-n",
        "system",
        "--prompt",
        "x",
        "--prompt-file",
        "p.txt",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_parse_session_create_with_overrides() {
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let params = format!("{first},{second}");

    temp_env::with_var_unset("GEPA_USER_ID", || {
        let cli = Cli::try_parse_from([
            "gepa",
            "session",
            "create",
            "--module",
            "qa",
            "--param",
            params.as_str(),
            "--population-size",
            "8",
            "--budget",
            "250.5",
            "--run",
        ])
        .unwrap();

        match cli.command {
            Commands::Session(args) => match args.command {
                SessionCommands::Create {
                    module,
                    params,
                    user,
                    run,
                    overrides,
                } => {
                    assert_eq!(module, "qa");
                    assert_eq!(params, vec![first, second]);
                    assert_eq!(user, "local");
                    assert!(run);
                    assert_eq!(overrides.population_size, Some(8));
                    assert_eq!(overrides.budget, Some(250.5));
                    assert!(overrides.generations.is_none());
                }
                _ => panic!("Wrong session command"),
            },
            _ => panic!("Wrong top-level command"),
        }
    });
}

#[test]
fn test_session_create_user_from_env() {
    let id = Uuid::new_v4().to_string();
    temp_env::with_var("GEPA_USER_ID", Some("alice"), || {
        let cli = Cli::try_parse_from(["gepa", "session", "create", "-m", "qa", "-p", id.as_str()]).unwrap();
        match cli.command {
            Commands::Session(args) => match args.command {
                SessionCommands::Create { user, run, .. } => {
                    assert_eq!(user, "alice");
                    assert!(!run);
                }
                _ => panic!("Wrong session command"),
            },
            _ => panic!("Wrong top-level command"),
        }
    });
}

#[test]
fn test_session_create_requires_params() {
    let result = Cli::try_parse_from(["gepa", "session", "create", "--module", "qa"]);
    assert!(result.is_err());
}

#[test]
fn test_parse_session_list_defaults() {
    let cli = Cli::try_parse_from(["gepa", "session", "list", "--user", "alice"]).unwrap();
    match cli.command {
        Commands::Session(args) => match args.command {
            SessionCommands::List {
                user,
                page,
                page_size,
                status,
                module,
            } => {
                assert_eq!(user.as_deref(), Some("alice"));
                assert_eq!(page, 1);
                assert_eq!(page_size, 20);
                assert!(status.is_none());
                assert!(module.is_none());
            }
            _ => panic!("Wrong session command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_session_id_commands() {
    let id = Uuid::new_v4();
    let id_str = id.to_string();

    for name in ["run", "show", "cancel", "delete", "progress", "population"] {
        let cli = Cli::try_parse_from(["gepa", "session", name, id_str.as_str()]).unwrap();
        let Commands::Session(args) = cli.command else {
            panic!("Wrong top-level command");
        };
        let parsed = match args.command {
            SessionCommands::Run { id }
            | SessionCommands::Show { id }
            | SessionCommands::Cancel { id }
            | SessionCommands::Delete { id }
            | SessionCommands::Progress { id }
            | SessionCommands::Population { id } => id,
            other => panic!("Unexpected command {other:?}"),
        };
        assert_eq!(parsed, id);
    }
}

#[test]
fn test_invalid_session_id_is_rejected() {
    let result = Cli::try_parse_from(["gepa", "session", "show", "not-a-uuid"]);
    assert!(result.is_err());
}

#[test]
fn test_parse_cleanup_default_age() {
    let cli = Cli::try_parse_from(["gepa", "session", "cleanup"]).unwrap();
    match cli.command {
        Commands::Session(args) => match args.command {
            SessionCommands::Cleanup { max_age_hours } => assert_eq!(max_age_hours, 168),
            _ => panic!("Wrong session command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}
