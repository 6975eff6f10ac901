use std::process::Command;

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("update check failed: {0}")]
    Update(String),
    #[error("restart failed: {0}")]
    Restart(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    Available { version: String },
}

pub trait Updater: Send + Sync {
    fn check(&self) -> Result<UpdateStatus, HostError>;
}

pub struct DisabledUpdater;

impl Updater for DisabledUpdater {
    fn check(&self) -> Result<UpdateStatus, HostError> {
        Ok(UpdateStatus::UpToDate)
    }
}

/// Replaces the running process. A successful `restart` does not return.
pub trait Restarter: Send + Sync {
    fn restart(&self) -> Result<(), HostError>;
}

pub struct ProcessRestarter {
    args: Vec<String>,
}

impl ProcessRestarter {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

impl Restarter for ProcessRestarter {
    fn restart(&self) -> Result<(), HostError> {
        let executable =
            std::env::current_exe().map_err(|e| HostError::Restart(e.to_string()))?;
        Command::new(&executable)
            .args(&self.args)
            .spawn()
            .map_err(|e| HostError::Restart(format!("{}: {e}", executable.display())))?;
        info!(executable = %executable.display(), "restarting");
        std::process::exit(0);
    }
}
