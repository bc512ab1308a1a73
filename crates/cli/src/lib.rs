pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "maildesk",
    about = "Maildesk operator CLI",
    long_about = "Operate maildesk: migrations, readiness checks, config inspection, demo data, and offline conversation simulation.",
    after_help = "Examples:\n  maildesk doctor --json\n  maildesk migrate\n  maildesk simulate --customer bob@example.com --text \"Where is my order?\" --text \"It is #1001\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, data files, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values")]
    Config,
    #[command(about = "Write the demo intent schema, knowledge base, and data source files")]
    Seed,
    #[command(
        about = "Run messages through an offline engine (in-memory store, embedded templates)"
    )]
    Simulate {
        #[arg(long, help = "Customer identifier, e.g. an email address")]
        customer: String,
        #[arg(long, required = true, help = "Message text; repeat for a multi-turn conversation")]
        text: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Seed => commands::seed::run(),
        Command::Simulate { customer, text } => commands::simulate::run(&customer, &text),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
