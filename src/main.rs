use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::LevelFilter;
use syslog::{BasicLogger, Facility, Formatter3164};

use lumid::{application::Application, cli::Cli, config::ConfigManager};

fn init_log(verbose: bool) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "lumid".into(),
        pid: 0,
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| {
                log::set_max_level(if verbose {
                    LevelFilter::Debug
                } else {
                    LevelFilter::Info
                })
            })
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/lumid.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_log(cli.verbose)?;

    if cli.daemonize {
        into_daemon()?;
    }

    let config_manager = ConfigManager::load(cli.config)
        .await
        .context("Failed to load configuration")?;

    Application::builder()
        .with_config_manager(config_manager)
        .build()
        .await?
        .run()
        .await
}
