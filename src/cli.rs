use clap::Parser;
use std::path::PathBuf;

/// lumid - display-power policy daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: standard lookup)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach and run as a daemon
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Log debug messages
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,
}
