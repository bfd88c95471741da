pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mudey",
    about = "Mudey operator CLI",
    long_about = "Operate the mudey lead pipeline: migrations, config inspection, readiness checks, and manual dispatch sweeps.",
    after_help = "Examples:\n  mudey doctor --json\n  mudey config\n  mudey dispatch"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo companies and campaigns")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with secret redaction"
    )]
    Config,
    #[command(about = "Validate config, delivery readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one fan-out dispatch sweep over deliverable campaign links")]
    Dispatch,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Dispatch => commands::dispatch::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
