pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "helpdesk",
    about = "Helpdesk operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and manage feedback data offline.",
    after_help = "Examples:\n  helpdesk doctor --json\n  helpdesk allow 123456789012345678 2\n  helpdesk feedback --limit 10"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, data store readability, and static directory presence")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Set a user's feedback allowance directly in the data store")]
    Allow {
        #[arg(help = "Numeric user id")]
        user_id: String,
        #[arg(help = "Number of submissions to allow (overwrites the current value)")]
        amount: String,
    },
    #[command(about = "Print stored feedback newest first as JSON")]
    Feedback {
        #[arg(long, help = "Only print the most recent N records")]
        limit: Option<usize>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Allow { user_id, amount } => commands::allow::run(&user_id, &amount),
        Command::Feedback { limit } => commands::feedback::run(limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
