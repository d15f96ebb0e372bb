//! Application launching
//!
//! Starts the application under test with the server port as its argument
//! and shuts it down again once the run is over.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::client::WidgeteerClient;
use crate::common::{Error, Result};

/// How long the application gets to exit after `quit`
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// A launched application under test
#[derive(Debug)]
pub struct AppProcess {
    child: Child,
    program: PathBuf,
}

impl AppProcess {
    /// Launch `program`, passing `port` as its only argument
    ///
    /// Bare names are looked up on `PATH`.
    pub fn spawn(program: &Path, port: u16) -> Result<Self> {
        let program = resolve_program(program)?;
        tracing::debug!("Launching {} on port {}", program.display(), port);

        let child = Command::new(&program)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Internal(format!("Failed to launch {}: {}", program.display(), e))
            })?;

        Ok(Self { child, program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Ask the application to quit, killing it if it does not exit in time
    ///
    /// The graceful path lets the application flush state (coverage data,
    /// settings) before exiting.
    pub async fn shutdown(mut self, client: &WidgeteerClient) {
        if client.is_connected() {
            let resp = client.quit().await;
            if !resp.success {
                tracing::debug!(
                    "quit command failed: {}",
                    resp.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        match tokio::time::timeout(QUIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("{} exited with {}", self.program.display(), status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for {}: {}", self.program.display(), e);
                self.kill().await;
            }
            Err(_) => {
                tracing::warn!(
                    "{} did not exit within {}s; killing it",
                    self.program.display(),
                    QUIT_GRACE.as_secs()
                );
                self.kill().await;
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill {}: {}", self.program.display(), e);
        }
    }
}

fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 || program.exists() {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|e| {
        Error::Internal(format!(
            "Application '{}' not found on PATH: {}",
            program.display(),
            e
        ))
    })
}
