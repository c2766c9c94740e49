mod config;
mod html;
mod live;
mod telemetry;

use clap::Parser;

use crate::config::{LiveCliArgs, LiveConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = LiveConfig::try_from(LiveCliArgs::parse())?;
    telemetry::init_tracing(config.verbose);
    live::run(config)
}
