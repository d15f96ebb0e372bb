//! Widgeteer CLI - drive and test Widgeteer-enabled applications
//!
//! Connects to an application's Widgeteer WebSocket server to run declarative
//! test suites or issue one-off automation commands.

use clap::Parser;
use commands::{Commands, GlobalArgs};
use widgeteer::common::logging;
use widgeteer::{cli, commands};

#[derive(Parser)]
#[command(name = "widgeteer", about = "Remote control and test runner for Widgeteer applications")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.global.verbose);

    match cli::dispatch(cli.global, cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
