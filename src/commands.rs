//! CLI command definitions
//!
//! Defines the clap arguments and subcommands for the widgeteer CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Options shared by every subcommand
///
/// Unset values fall back to the configuration file, then to built-in
/// defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Widgeteer server host
    #[arg(long, global = true, env = "WIDGETEER_HOST")]
    pub host: Option<String>,

    /// Widgeteer server port
    #[arg(long, global = true, env = "WIDGETEER_PORT")]
    pub port: Option<u16>,

    /// Auth token passed to the server
    #[arg(long, global = true, env = "WIDGETEER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Application to launch first; it receives the port as its only argument
    #[arg(long, global = true)]
    pub app: Option<PathBuf>,

    /// Seconds to wait for the server to become reachable
    #[arg(long, global = true)]
    pub wait: Option<u64>,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a JSON or YAML test suite
    Test {
        /// Suite document (.json, .yaml or .yml)
        file: PathBuf,

        /// List the tests in the file without running them
        #[arg(long)]
        list_tests: bool,
    },

    /// Print the widget tree
    Tree {
        /// Maximum depth to print
        #[arg(long, default_value_t = 2)]
        depth: u32,

        /// Selector of the subtree root
        #[arg(long)]
        root: Option<String>,

        /// Include hidden widgets
        #[arg(long)]
        include_invisible: bool,
    },

    /// Execute a single command and print the response
    Exec {
        /// Command name (e.g. click, get_property)
        command: String,

        /// Parameters as a JSON object, e.g. '{"target":"#ok"}'
        #[arg(long)]
        params: Option<String>,
    },

    /// List built-in and server-registered commands
    Commands,
}
