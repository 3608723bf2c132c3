#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "strata: org-unit and category hierarchy administration",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Initialize a strata project",
        long_about = "Create .strata/ with a migrated database and a default config in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    strata init\n\n    # Re-run migrations on an existing project\n    strata init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Hierarchy",
        about = "Manage org units (pôles)",
        long_about = "Create, move, list, and search the single-parent org unit hierarchy."
    )]
    Pole(cmd::pole::PoleArgs),

    #[command(
        next_help_heading = "Hierarchy",
        about = "Manage categories and their parent relationships",
        long_about = "Create categories, attach them under several parents, and choose the primary one."
    )]
    Category(cmd::category::CategoryArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    strata completions bash > /etc/bash_completion.d/strata"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("STRATA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() || verbose {
            "strata=debug,info"
        } else if quiet {
            "error"
        } else {
            "strata=info,warn"
        })
    });

    let format = env::var("STRATA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    debug!(root = %project_root.display(), ?output, "dispatching command");

    let result = match cli.command {
        Commands::Init(args) => cmd::init::run_init(&args, output, &project_root),
        Commands::Pole(args) => cmd::pole::run_pole(&args, output, &project_root),
        Commands::Category(args) => cmd::category::run_category(&args, output, &project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };

    result.map_err(|err| {
        // Domain errors were rendered where they happened.
        if err.downcast_ref::<cmd::Reported>().is_none() {
            cmd::report(output, CliError::new(format!("{err:#}")))
        } else {
            err
        }
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(reported) = err.downcast_ref::<cmd::Reported>() {
                debug!(code = %reported.code, "command failed");
            }
            ExitCode::FAILURE
        }
    }
}
