use clap::Parser;
use ssc_lib::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_cli(Cli::parse())?;
    ssc_lib::logger::init(&config.log_filter);
    ssc_lib::run(config).await
}
