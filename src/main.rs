//! j2g CLI - Migrate Jira XML exports into GitHub issues.

use std::io::Read;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use jira2gh::cli::{Cli, Commands, ConfigCommands};
use jira2gh::commands::{self, MigrateOptions, Output};
use jira2gh::config;
use jira2gh::logging;

/// Set by the Ctrl-C handler; the importer stops before the next issue.
static CANCELLED: AtomicBool = AtomicBool::new(false);

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Warning: {}", e);
    }

    if let Err(e) = run(cli) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), jira2gh::Error> {
    let human = cli.human_readable;
    let overrides = cli.command.overrides();
    let settings = config::resolve_settings(&overrides, cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { .. } => output(&commands::analyze(&settings)?, human),
        Commands::Labels { .. } => output(&commands::labels(&settings)?, human),
        Commands::Fetch { out, page_size, .. } => {
            output(&commands::fetch(&settings, &out, page_size)?, human)
        }
        Commands::Migrate {
            start_from,
            dry_run,
            no_relink,
            skip_labels,
            secured_only,
            ..
        } => {
            if !dry_run {
                install_interrupt_handler();
            }
            let options = MigrateOptions {
                start_from,
                dry_run,
                no_relink,
                skip_labels,
                secured_only,
            };
            output(&commands::migrate(&settings, options, &CANCELLED)?, human)
        }
        Commands::Relink { .. } => output(&commands::relink(&settings)?, human),
        Commands::CheckToken => output(&commands::check_token(&settings)?, human),
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(&settings), human),
            ConfigCommands::SetToken => {
                let mut token = String::new();
                std::io::stdin().read_to_string(&mut token)?;
                output(&commands::config_set_token(&settings, &token)?, human)
            }
        },
    }
    Ok(())
}

fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if CANCELLED.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        eprintln!("Interrupt received, stopping after the current issue (Ctrl-C again to abort)");
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
    }
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
