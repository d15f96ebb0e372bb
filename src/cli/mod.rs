//! CLI command handling
//!
//! Resolves connection settings, optionally launches the application,
//! waits for its server and dispatches the subcommand.

mod launch;

use std::time::Duration;

use colored::Colorize;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::client::{CommandRequest, Params, TreeOptions, WidgeteerClient};
use crate::commands::{Commands, GlobalArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::testing::{list_tests, print_summary, TestExecutor};

pub use launch::AppProcess;

/// Pause after launching before the first connection attempt
const LAUNCH_SETTLE: Duration = Duration::from_secs(1);

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when the command ran but something failed (a test,
/// a server-reported error), which maps to exit code 1.
pub async fn dispatch(args: GlobalArgs, command: Commands) -> Result<bool> {
    if let Commands::Test {
        file,
        list_tests: true,
    } = &command
    {
        println!("\nTests in {}:", file.display());
        for name in list_tests(file)? {
            println!("  - {}", name);
        }
        return Ok(true);
    }

    let config = apply_overrides(Config::load()?, &args);
    let client = WidgeteerClient::from_config(&config);

    let app = match &args.app {
        Some(path) => {
            println!("Launching application: {}", path.display());
            let app = AppProcess::spawn(path, config.server.port)?;
            tokio::time::sleep(LAUNCH_SETTLE).await;
            Some(app)
        }
        None => None,
    };

    println!(
        "Connecting to Widgeteer server at {}:{}...",
        config.server.host, config.server.port
    );
    let outcome = if wait_for_server(
        &client,
        config.timeouts.connect_wait(),
        config.timeouts.poll_interval(),
    )
    .await
    {
        println!("{}", "Connected!".green());
        run_command(&client, command, args.verbose).await
    } else {
        Err(Error::ServerUnavailable {
            url: client.url().to_string(),
            secs: config.timeouts.connect_wait_secs,
        })
    };

    if let Some(app) = app {
        println!("\nTerminating application...");
        app.shutdown(&client).await;
    }
    client.disconnect().await;

    outcome
}

/// Merge CLI flags over the configuration file
fn apply_overrides(mut config: Config, args: &GlobalArgs) -> Config {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(token) = &args.token {
        config.server.token = Some(token.clone());
    }
    if let Some(wait) = args.wait {
        config.timeouts.connect_wait_secs = wait;
    }
    config
}

/// Poll until the server answers a shallow tree request or the budget runs out
pub async fn wait_for_server(client: &WidgeteerClient, budget: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        // Each attempt gets what is left of the budget, but at least one interval
        let remaining = || deadline.saturating_duration_since(Instant::now()).max(interval);
        match tokio::time::timeout(remaining(), client.connect()).await {
            Err(_) => tracing::debug!("Server not ready: handshake timed out"),
            Ok(Err(e)) => tracing::debug!("Server not ready: {}", e),
            Ok(Ok(())) => {
                let probe =
                    CommandRequest::new("get_tree", probe_params()).with_timeout(remaining());
                let resp = client.send(probe).await;
                if resp.success {
                    return true;
                }
                tracing::debug!(
                    "Server not ready: {}",
                    resp.error.as_deref().unwrap_or("unknown error")
                );
                client.disconnect().await;
            }
        }

        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

fn probe_params() -> Params {
    let mut params = Params::new();
    params.insert("depth".to_string(), json!(0));
    params
}

async fn run_command(client: &WidgeteerClient, command: Commands, verbose: bool) -> Result<bool> {
    match command {
        Commands::Test { file, .. } => {
            let executor = TestExecutor::new(client, verbose);
            let result = executor.run_file(&file).await?;
            print_summary(&result);
            Ok(result.success())
        }

        Commands::Tree {
            depth,
            root,
            include_invisible,
        } => {
            let resp = client
                .tree(&TreeOptions {
                    root,
                    depth: Some(depth),
                    include_invisible,
                })
                .await;
            if resp.success {
                println!("\n{}", "Widget tree:".cyan());
                println!("{}", serde_json::to_string_pretty(&resp.data)?);
            } else {
                print_failure(resp.error.as_deref());
            }
            Ok(resp.success)
        }

        Commands::Exec { command, params } => {
            let params = parse_params(params.as_deref())?;
            let resp = client.command(&command, params).await;
            let output = if resp.success {
                json!({
                    "success": true,
                    "value": resp.value(),
                    "data": resp.data,
                    "duration_ms": resp.duration_ms,
                })
            } else {
                json!({
                    "success": false,
                    "error": resp.error,
                    "error_code": resp.error_code,
                })
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(resp.success)
        }

        Commands::Commands => {
            let list = client.list_commands().await;
            println!("\n{}", "Built-in commands:".cyan());
            for name in &list.builtin {
                println!("  {}", name);
            }
            println!("\n{}", "Custom commands:".cyan());
            if list.custom.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for name in &list.custom {
                println!("  {}", name);
            }
            Ok(true)
        }
    }
}

/// Parse `--params`; absent means no parameters
fn parse_params(raw: Option<&str>) -> Result<Params> {
    match raw {
        None => Ok(Params::new()),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(params) => Ok(params),
            other => Err(Error::Config(format!(
                "--params must be a JSON object, got: {}",
                other
            ))),
        },
    }
}

fn print_failure(error: Option<&str>) {
    println!(
        "{} {}",
        "Error:".red().bold(),
        error.unwrap_or("command failed")
    );
}
