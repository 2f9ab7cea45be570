pub mod dates;
pub mod generate;
pub mod process;
pub mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dates::DayParams;
use generate::{process_generate_command, Artifact};
use process::{kill_previous_servers, restart_server, server_executables};
use stats::process_stats_command;
use tracing::level_filters::LevelFilter;

use crate::{
    config::{LeafGrouping, Settings},
    daemon::{start_daemon, storage::activity_storage::JsonlActivityStorage, RECORDS_DIR},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        percentage::Percentage,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Typetrace", version, long_about = None)]
#[command(
    about = "Records keyboard and pointer activity, reconstructs what was typed and summarizes a day",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(long, help = "Input events source, `-` for stdin")]
        input: Option<PathBuf>,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(long, help = "Input events source, `-` for stdin")]
        input: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Reconstruct the text typed during a day")]
    Export {
        #[command(flatten)]
        day: DayParams,
        #[arg(long, help = "Clean up the text with the summarizer and name the apps")]
        refined: bool,
        #[arg(long, help = "Width of a text window in minutes")]
        window: Option<u32>,
    },
    #[command(about = "Summarize a day into a tree of concepts")]
    Tree {
        #[command(flatten)]
        day: DayParams,
        #[arg(long, help = "Width of a text window in minutes")]
        window: Option<u32>,
        #[arg(long, help = "How typed text is grouped into leaves")]
        leaves: Option<LeafGrouping>,
    },
    #[command(about = "Display keystroke and click statistics of a day")]
    Stats {
        #[command(flatten)]
        day: DayParams,
        #[arg(short = 'p', long = "percentage", help = "Filter apps to have at least specified percentage", default_value_t = Percentage::new_opt(1.).unwrap_or(Percentage::ZERO))]
        min_percentage: Percentage,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { input } => {
            restart_server(Some(&dir), input.as_deref())?;
            Ok(())
        }
        Commands::Stop {} => {
            let stopped = kill_previous_servers(&server_executables()?)?;
            println!("Stopped {stopped} servers");
            Ok(())
        }
        Commands::Serve { input } => {
            start_daemon(dir, input).await?;
            Ok(())
        }
        Commands::Export {
            day,
            refined,
            window,
        } => {
            let mut settings = Settings::load(&dir)?;
            if let Some(window) = window {
                settings.window_minutes = window;
            }
            let date = day.resolve()?;
            process_generate_command(&dir, settings, date, Artifact::Export { refined }).await
        }
        Commands::Tree {
            day,
            window,
            leaves,
        } => {
            let mut settings = Settings::load(&dir)?;
            if let Some(window) = window {
                settings.window_minutes = window;
            }
            if let Some(leaves) = leaves {
                settings.leaf_grouping = leaves;
            }
            let date = day.resolve()?;
            process_generate_command(&dir, settings, date, Artifact::Tree).await
        }
        Commands::Stats {
            day,
            min_percentage,
        } => {
            let storage = JsonlActivityStorage::open(dir.join(RECORDS_DIR)).await?;
            process_stats_command(storage, day.resolve()?, min_percentage).await
        }
    }
}
