#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use squril::cli::app::{Cli, Command};
use squril::cli::commands;
use squril::cli::runtime::build_backend;
use squril::SqurilError;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    env_logger::init();
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    let command_name = command_name(&cli.command);
    println!("squril: starting `{command_name}`");

    match execute(cli) {
        Ok(()) => {
            println!("squril: completed `{command_name}` (exit_code={EXIT_SUCCESS})");
            EXIT_SUCCESS
        }
        Err(error) => {
            let exit_code = classify_runtime_error(&error);
            eprintln!("squril: failed `{command_name}` (exit_code={exit_code})");
            eprintln!("{error:#}");
            exit_code
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let backend = build_backend(&cli.backend)?;
    match cli.command {
        Command::Insert(args) => commands::insert::run(&args, backend.as_ref()),
        Command::Select(args) => commands::select::run(&args, backend.as_ref()),
        Command::Update(args) => commands::update::run(&args, backend.as_ref()),
        Command::Delete(args) => commands::delete::run(&args, backend.as_ref()),
        Command::Alter(args) => commands::alter::run(&args, backend.as_ref()),
        Command::Restore(args) => commands::restore::run(&args, backend.as_ref()),
    }
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<SqurilError>() {
        Some(SqurilError::Parse { .. } | SqurilError::DataIntegrity { .. }) => EXIT_VALIDATION_FAILURE,
        _ => EXIT_RUNTIME_FAILURE,
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Insert(_) => "insert",
        Command::Select(_) => "select",
        Command::Update(_) => "update",
        Command::Delete(_) => "delete",
        Command::Alter(_) => "alter",
        Command::Restore(_) => "restore",
    }
}
