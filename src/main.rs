use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::*;
use serde_json::Value;
use std::io;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use managed_commands::admin::{self, ExecutionFilter};
use managed_commands::{
    should_run, CommandExecutor, Config, I18n, Invocation, Ledger, ManagedCommand, NoTransaction,
    Outcome, RunError, ScaffoldRequest, Scaffolder, StoreManager,
};

#[derive(Parser)]
#[command(name = "mcmd", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a shell command as a managed command and record the execution
    Exec {
        /// Name recorded in the ledger
        name: String,
        /// Skip when a successful run is already recorded
        #[arg(long)]
        run_once: bool,
        /// Run without recording anything
        #[arg(long)]
        dry_run: bool,
        /// Extra parameter stored with the record (value parsed as JSON when possible)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
        /// Command to execute (after `--`)
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Generate a managed command and its test in a registered crate
    Create {
        namespace: String,
        identifier: String,
        /// Generate a run-once command
        #[arg(long)]
        run_once: bool,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Show recent executions of one command
    History {
        name: String,
        /// Number of records to show [default: display.max_history_shown]
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List recorded executions, newest first
    List {
        /// Exact command name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "failed")]
        success: bool,
        #[arg(long)]
        failed: bool,
        /// Only run-once commands
        #[arg(long, conflicts_with = "repeatable")]
        run_once: bool,
        /// Only commands that may run repeatedly
        #[arg(long)]
        repeatable: bool,
        /// YYYY, YYYY-MM, YYYY-MM-DD, MM-DD or a month name (local time)
        #[arg(long)]
        date: Option<String>,
        /// Text searched in name, output and error message
        #[arg(long)]
        search: Option<String>,
        /// Use fuzzy matching for --search
        #[arg(long, requires = "search")]
        fuzzy: bool,
    },
    /// Show every field of one record
    Show { id: u64 },
    /// Tell whether a run-once command would run now
    ShouldRun { name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = Config::new()?;
    let i18n = I18n::new(&config.get_effective_language());

    let matches = Cli::command().about(i18n.t("help_about")).get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    let store = StoreManager::new_with_config(&config).context(i18n.t("error_create_home_dir"))?;

    match cli.command {
        Commands::Exec {
            name,
            run_once,
            dry_run,
            options,
            command,
        } => {
            let command_str = command.join(" ");
            let mut invocation = Invocation::new()
                .option("command", command_str.as_str())
                .dry_run(dry_run);
            for raw in &options {
                let (key, value) = parse_option(raw, &i18n)?;
                invocation = invocation.option(key, value);
            }

            let managed = ManagedCommand::new(&store, &i18n, module_path!())
                .with_name(name)
                .run_once(run_once);
            let result = managed.handle(
                &mut io::stdout(),
                &mut NoTransaction,
                &invocation,
                |_tx, _invocation| CommandExecutor::run(&command_str, true, &i18n),
            );

            match result {
                Ok(Outcome::Skipped) | Ok(Outcome::Completed { .. }) => {}
                Err(RunError::Command(_)) | Err(RunError::Transaction(_)) => {
                    std::process::exit(1);
                }
                Err(RunError::Ledger(err)) => {
                    return Err(err).context(i18n.t("error_read_ledger"));
                }
            }
        }
        Commands::Create {
            namespace,
            identifier,
            run_once,
            force,
        } => {
            let cwd = std::env::current_dir()?;
            let scaffolder = Scaffolder::from_config(&config, &cwd);
            let request = ScaffoldRequest {
                namespace,
                identifier,
                run_once,
                overwrite: force,
            };
            let files = scaffolder
                .generate(&request)
                .context(i18n.t("error_scaffold"))?;

            let command_path = files.command_path.display().to_string();
            let test_path = files.test_path.display().to_string();
            println!("{}", i18n.t("scaffold_created").green().bold());
            println!("{}", i18n.t_format("scaffold_command_path", &[&command_path]));
            println!("{}", i18n.t_format("scaffold_test_path", &[&test_path]));
            println!();
            println!("{}", i18n.t("scaffold_next_steps").yellow());
            println!("{}", i18n.t_format("scaffold_step_edit", &[&command_path]));
            println!("{}", i18n.t_format("scaffold_step_tests", &[&test_path]));
            println!("{}", i18n.t("scaffold_step_register"));
        }
        Commands::History { name, limit } => {
            let limit = limit.unwrap_or(config.display.max_history_shown);
            let records = store
                .history(&name, limit)
                .context(i18n.t("error_read_ledger"))?;
            if records.is_empty() {
                println!("{}", i18n.t("no_records").yellow());
            } else {
                println!("{}", i18n.t_format("history_records", &[&name]).bold());
                for record in &records {
                    println!("{}", admin::render_summary(record, &i18n));
                }
            }
        }
        Commands::List {
            name,
            success,
            failed,
            run_once,
            repeatable,
            date,
            search,
            fuzzy,
        } => {
            let filter = ExecutionFilter {
                command_name: name,
                success: match (success, failed) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                run_once: match (run_once, repeatable) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                date,
                search,
                fuzzy,
            };
            let records = store.all().context(i18n.t("error_read_ledger"))?;
            print!("{}", admin::render_table(&filter.apply(records), &i18n));
        }
        Commands::Show { id } => {
            match store.find(id).context(i18n.t("error_read_ledger"))? {
                Some(record) => print!("{}", admin::render_detail(&record, &i18n)),
                None => {
                    eprintln!("{}", i18n.t_format("record_not_found", &[&id.to_string()]).red());
                    std::process::exit(1);
                }
            }
        }
        Commands::ShouldRun { name } => {
            if should_run(&store, &name).context(i18n.t("error_read_ledger"))? {
                println!("{}", i18n.t_format("should_run_yes", &[&name]).green());
            } else {
                println!("{}", i18n.t_format("should_run_no", &[&name]).yellow());
            }
        }
    }

    Ok(())
}

/// Split `key=value`; the value is JSON when it parses, a string otherwise.
fn parse_option(raw: &str, i18n: &I18n) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!(i18n.t_format("error_parse_option", &[raw])))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}
