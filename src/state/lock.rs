//! Cross-process lock around state commits.
//!
//! One lock file per instance lives at `{state_dir}/.locks/{instance}.lock`.
//! The file is created on first use and never deleted: every process must lock
//! the same inode, and unlinking it while a waiter holds an open handle would
//! let that waiter and a newcomer each lock a different file.
//!
//! Blocking file calls run in `spawn_blocking` so waiting for a lock never
//! blocks a runtime worker thread.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, default_lock_timeout};
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;

/// Held while one process reads, merges and commits an instance's state.
///
/// The lock is released when the value is dropped and the file handle closes.
///
/// ```rust,no_run
/// use stackweave_cli::state::lock::StateLock;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let _lock = StateLock::acquire(Path::new(".stackweave/state"), "prod").await?;
/// // Write prod.toml...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StateLock {
    _file: File,
    instance: String,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        tracing::debug!(instance = %self.instance, "State lock released");
    }
}

/// Path of the lock file guarding `instance`.
pub fn lock_path(state_dir: &Path, instance: &str) -> PathBuf {
    state_dir.join(".locks").join(format!("{instance}.lock"))
}

impl StateLock {
    /// Acquire the lock for `instance` with the default timeout.
    pub async fn acquire(state_dir: &Path, instance: &str) -> Result<Self> {
        Self::acquire_with_timeout(state_dir, instance, default_lock_timeout()).await
    }

    /// Acquire the lock, backing off from 10ms up to 500ms between attempts until `timeout`.
    pub async fn acquire_with_timeout(
        state_dir: &Path,
        instance: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let path = lock_path(state_dir, instance);
        let mut file = open_lock_file(path.clone()).await?;
        tracing::debug!(instance = %instance, "Waiting for state lock");

        let started = Instant::now();
        let mut delays = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        loop {
            let (returned, locked) = tokio::task::spawn_blocking(move || {
                let locked = file.try_lock_exclusive();
                (file, locked)
            })
            .await
            .context("State lock task panicked")?;
            file = returned;

            match locked {
                Ok(true) => {
                    tracing::debug!(
                        instance = %instance,
                        wait_ms = started.elapsed().as_millis(),
                        "State lock acquired"
                    );
                    return Ok(Self {
                        _file: file,
                        instance: instance.to_string(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(instance = %instance, error = %e, "State lock attempt failed");
                }
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            let Some(delay) = delays.next().filter(|_| !remaining.is_zero()) else {
                anyhow::bail!(
                    "Timeout acquiring state lock for '{instance}' after {timeout:?} ({})",
                    path.display()
                );
            };
            tokio::time::sleep(delay.min(remaining)).await;
        }
    }
}

async fn open_lock_file(path: PathBuf) -> Result<File> {
    tokio::task::spawn_blocking(move || {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state locks directory: {}", dir.display())
            })?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))
    })
    .await
    .context("State lock task panicked")?
}
