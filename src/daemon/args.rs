use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::rpc::protocol::DEFAULT_PORT;

#[derive(Parser)]
#[command(version, about = "Records which window has focus, minute by minute")]
pub struct DaemonArgs {
    /// Stay in the foreground instead of detaching.
    #[arg(long)]
    pub force: bool,
    /// Directory holding the day files, rules and logs.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Port of the local server.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
