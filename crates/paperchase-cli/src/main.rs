use clap::{ArgAction, Parser, Subcommand};
use commands::{config, fetch};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "paperchase")]
#[command(about = "Paperchase - fetch generated reports from a web submission inbox")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one report from the submission inbox
    #[command(long_about = "Log into the portal (reusing the persisted browser profile when \
        possible), locate the submission by identifier or title, open its report viewer, and \
        confirm the downloaded report on disk. Exactly one of --id or --title must be given; \
        the identifier is the more reliable key.")]
    Fetch {
        /// Submission identifier to search for
        #[arg(long, value_name = "ID", conflicts_with = "title")]
        id: Option<String>,

        /// Submission title to search for (exact match)
        #[arg(long, value_name = "TITLE")]
        title: Option<String>,

        /// Write logs to the rotating log file instead of stderr
        #[arg(long, action = ArgAction::SetTrue)]
        log_to_file: bool,
    },
    /// Configure portal credentials and settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Interactively set up the portal URL and credentials
    Init,
    /// Show current configuration (masks credentials)
    Show,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let paths = report_config::PathManager::default();
    match &cli.command {
        Commands::Fetch { log_to_file: true, .. } => {
            logging::init_logging_with_file(cli.verbose, cli.quiet, Some(paths.log_file()))
        }
        _ => logging::init_logging(cli.verbose, cli.quiet),
    }
    .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let out = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Fetch { id, title, .. } => {
            let criterion = fetch::criterion_from_args(id, title)
                .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

            let outcome = fetch::run(&paths, criterion, &out)
                .await
                .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
            out.outcome(&outcome);
            if !outcome.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Init => config::init(&out),
            ConfigCommands::Show => config::show(&out),
        }
        .map_err(|e| color_eyre::eyre::eyre!("{}", e)),
    }
}
