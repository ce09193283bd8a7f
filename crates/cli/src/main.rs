mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    nl2sql_core::config::load_dotenv();
    let config = nl2sql_core::Config::from_env();
    nl2sql_core::logging::init(&config.logging_level);

    let cli = Cli::parse();
    match cli.command {
        Command::Deploy(args) => commands::deploy(&config, args).await?,
        Command::Dictionary(args) => {
            let written = commands::dictionary(&config, args).await?;
            println!("wrote {written} entities");
        }
        Command::Upload(args) => {
            commands::upload(&config, args).await?;
        }
        Command::Ask(args) => commands::ask(&config, args).await?,
    }

    Ok(())
}
