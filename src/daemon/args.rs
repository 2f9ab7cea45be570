use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
pub struct DaemonArgs {
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Source of input events, one `key <name>` or `click [button]` per line. `-` reads stdin.
    /// Defaults to the `input` file in the application directory, which is followed like
    /// `tail -f`. Opening a FIFO waits for the first writer.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
