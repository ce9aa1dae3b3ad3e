//! FlowForge CLI entry point.

use clap::Parser;
use ff::cli::commands;
use ff::cli::commands::sync::Mode;
use ff::cli::{Cli, Commands};
use ff::config::Context;
use ff::error::Error;
use ff::sync::SyncOptions;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    // Commands that need no namespace context
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        _ => {}
    }

    let ctx = Context::resolve(&cli.overrides())?;

    match &cli.command {
        // Sync cycle
        Commands::Sync { force, message } => {
            let options = SyncOptions {
                force: *force,
                message: message.clone(),
            };
            commands::sync::execute(&ctx, Mode::Sync, &options, json)
        }
        Commands::Pull { force } => {
            let options = SyncOptions {
                force: *force,
                message: None,
            };
            commands::sync::execute(&ctx, Mode::Pull, &options, json)
        }
        Commands::Push { message } => {
            let options = SyncOptions {
                force: false,
                message: message.clone(),
            };
            commands::sync::execute(&ctx, Mode::Push, &options, json)
        }
        Commands::Status => commands::status::execute(&ctx, json),
        Commands::Migrate => commands::sync::migrate(&ctx, json),

        // Sessions
        Commands::Session { command } => commands::session::execute(command, &ctx, json),

        // Team
        Commands::Task { command } => commands::task::execute(command, &ctx, json),
        Commands::Blocker { command } => commands::blocker::execute(command, &ctx, json),

        // Quarantine
        Commands::Quarantine { command } => commands::quarantine::execute(command, &ctx, json),

        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
