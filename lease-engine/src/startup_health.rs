//! A short stabilization-window check run once at startup: if a spawned
//! background task has already exited (or panicked) before the window
//! closes, that's treated as a startup failure rather than silently
//! running degraded.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

const STARTUP_STABILIZATION_WINDOW: Duration = Duration::from_millis(300);

pub async fn verify_background_task_running(name: &str, task: &mut JoinHandle<()>) -> Result<()> {
    match tokio::time::timeout(STARTUP_STABILIZATION_WINDOW, task).await {
        Err(_) => Ok(()),
        Ok(join_res) => match join_res {
            Ok(()) => Err(anyhow!("{name} exited during startup stabilization window")),
            Err(err) => Err(anyhow!("{name} panicked during startup: {err}")),
        },
    }
}
