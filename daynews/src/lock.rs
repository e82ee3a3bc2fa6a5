//! Filesystem run lock.
//!
//! The lock is a JSON file created with `create_new`, so two processes can
//! never both create it. It is advisory: a holder that crashed leaves the
//! file behind, and the next run decides whether it is stale.
//!
//! A lock is stale when any of these hold:
//! - the recorded pid is not alive on this host
//! - it is older than the configured maximum age (guards against pid reuse)
//! - its contents cannot be read and the file is older than a short grace
//!   period (a fresh unreadable file may still be mid-write)
//!
//! [`RunLock`] removes the file on drop, but only while the file still
//! carries this run's id.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{DayNewsError, Result};

const UNREADABLE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub max_age: Duration,
}

/// Held for the whole run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    run_id: String,
    released: bool,
}

impl RunLock {
    pub fn acquire(path: &Path, run_id: Uuid, policy: LockPolicy) -> Result<Self> {
        let record = LockRecord {
            pid: std::process::id(),
            run_id: run_id.to_string(),
            started_at: Utc::now(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Second attempt only after clearing a stale lock
        for attempt in 0..2 {
            match create_lock_file(path, &record) {
                Ok(()) => {
                    info!("Acquired run lock {} (pid {})", path.display(), record.pid);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        run_id: record.run_id,
                        released: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let holder = read_lock_record(path);
                    match stale_reason(path, holder.as_ref(), policy) {
                        Some(reason) if attempt == 0 => {
                            warn!("Removing stale run lock {}: {}", path.display(), reason);
                            match std::fs::remove_file(path) {
                                Ok(()) => continue,
                                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                                Err(e) => return Err(DayNewsError::Io(e)),
                            }
                        }
                        _ => {
                            return Err(DayNewsError::LockContended {
                                path: path.to_path_buf(),
                                holder_pid: holder.as_ref().map(|h| h.pid),
                                holder_run: holder.map(|h| h.run_id),
                            });
                        }
                    }
                }
                Err(e) => return Err(DayNewsError::Io(e)),
            }
        }

        Err(DayNewsError::LockContended {
            path: path.to_path_buf(),
            holder_pid: None,
            holder_run: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release explicitly, surfacing any error instead of logging it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_if_owned(&self.path, &self.run_id)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_if_owned(&self.path, &self.run_id) {
            warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

fn create_lock_file(path: &Path, record: &LockRecord) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let json = serde_json::to_vec(record)?;
    file.write_all(&json)?;
    file.sync_all()?;
    Ok(())
}

pub fn read_lock_record(path: &Path) -> Option<LockRecord> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice::<LockRecord>(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Unreadable run lock at {}: {}", path.display(), e);
            None
        }
    }
}

fn remove_if_owned(path: &Path, run_id: &str) -> Result<()> {
    match read_lock_record(path) {
        Some(record) if record.run_id == run_id => {
            std::fs::remove_file(path)?;
            info!("Released run lock {}", path.display());
            Ok(())
        }
        Some(record) => {
            warn!(
                "Run lock {} now belongs to run {}; leaving it in place",
                path.display(),
                record.run_id
            );
            Ok(())
        }
        None => {
            debug!("Run lock {} already gone", path.display());
            Ok(())
        }
    }
}

fn stale_reason(path: &Path, holder: Option<&LockRecord>, policy: LockPolicy) -> Option<String> {
    match holder {
        Some(record) => {
            if pid_alive(record.pid) == Some(false) {
                return Some(format!("holder pid {} is not running", record.pid));
            }
            let age = Utc::now().signed_duration_since(record.started_at);
            let age = age.to_std().unwrap_or_default();
            if age > policy.max_age {
                return Some(format!(
                    "held by pid {} for {}s, longer than the {}s limit",
                    record.pid,
                    age.as_secs(),
                    policy.max_age.as_secs()
                ));
            }
            None
        }
        None => {
            let age = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())?;
            if age > UNREADABLE_GRACE {
                Some(format!("unreadable lock file is {}s old", age.as_secs()))
            } else {
                None
            }
        }
    }
}

/// `Some(false)` when the process definitely does not exist on this host.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> Option<bool> {
    if pid == 0 || pid > i32::MAX as u32 {
        return Some(false);
    }
    // Signal 0 only checks for existence and permission
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return Some(true);
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Some(false),
        // EPERM: exists but belongs to someone else
        Some(libc::EPERM) => Some(true),
        _ => None,
    }
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> Option<bool> {
    None
}
