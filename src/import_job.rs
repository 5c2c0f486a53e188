//! Fire-and-forget launch of the external Import Job.
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// What happened when the job was handed off. The job's own completion is
/// never reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started { pid: Option<u32> },
    Failed(String),
}

pub trait ImportLauncher: Send + Sync {
    fn launch(&self, batch_id: i64) -> LaunchOutcome;
}

/// Runs `{program} {args..} {root} {site_url} {batch_id}` as a detached child.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub program: String,
    pub args: Vec<String>,
    pub root: PathBuf,
    pub site_url: String,
}

impl ProcessLauncher {
    fn command(&self, batch_id: i64) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(self.root.as_os_str())
            .arg(&self.site_url)
            .arg(batch_id.to_string());
        cmd
    }
}

impl ImportLauncher for ProcessLauncher {
    /// Must be called from within a tokio runtime.
    fn launch(&self, batch_id: i64) -> LaunchOutcome {
        match self.command(batch_id).spawn() {
            Ok(mut child) => {
                let pid = child.id();
                // Reap in the background so the child never lingers as a zombie.
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => debug!(batch_id, ?pid, %status, "import job exited"),
                        Err(err) => warn!(batch_id, ?pid, ?err, "failed to wait on import job"),
                    }
                });
                LaunchOutcome::Started { pid }
            }
            Err(err) => LaunchOutcome::Failed(format!(
                "failed to spawn {}: {}",
                self.program, err
            )),
        }
    }
}
