// Copyright 2024 Oxide Computer Company

//! Host wide exclusive allocation of small integers. Each switch instance
//! needs its own control port and device id, and several drivers may run at
//! once, so numbers are claimed by atomically creating a lock directory.

use crate::error::SwitchError;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rand::Rng;
use slog::{debug, info, warn, Logger};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PID_FILE: &str = "pid";

/// Allocates numbers in `0..=max` under a shared lock directory.
pub struct LeaseAllocator {
    root: PathBuf,
    max: u32,
    attempts: usize,
    log: Logger,
}

/// A claimed number. The claim is released when the lease is dropped.
#[derive(Debug)]
pub struct Lease {
    pub number: u32,
    dir: PathBuf,
    log: Logger,
}

impl LeaseAllocator {
    pub fn new(root: &Path, max: u32, log: Logger) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.into(),
            max,
            attempts: 10,
            log,
        })
    }

    fn lock_dir(&self, n: u32) -> PathBuf {
        self.root.join(format!("lease-{}", n))
    }

    /// Claim a free number. Candidates are picked at random; a collision
    /// backs off briefly before the next attempt.
    pub fn acquire(&self) -> Result<Lease, SwitchError> {
        let mut rng = rand::rng();
        for attempt in 0..self.attempts {
            let n = rng.random_range(0..=self.max);
            let dir = self.lock_dir(n);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    let lease = Lease {
                        number: n,
                        dir,
                        log: self.log.clone(),
                    };
                    fs::write(
                        lease.dir.join(PID_FILE),
                        std::process::id().to_string(),
                    )?;
                    debug!(self.log, "lease acquired"; "number" => n);
                    return Ok(lease);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(self.log, "lease collision";
                        "number" => n,
                        "attempt" => attempt,
                    );
                    let backoff = rng.random_range(1..=10) * (attempt as u64 + 1);
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SwitchError::NoLease(self.root.clone()))
    }

    /// Remove locks whose owning process no longer exists. Returns the
    /// number of locks removed.
    pub fn reap_stale(&self) -> io::Result<usize> {
        let mut reaped = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with("lease-") {
                continue;
            }
            let dir = entry.path();
            // a lock without a pid file may be mid creation
            let Ok(text) = fs::read_to_string(dir.join(PID_FILE)) else {
                continue;
            };
            if owner_alive(text.trim()) {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(self.log, "removed stale lease";
                        "lock" => dir.display().to_string(),
                        "owner" => text.trim(),
                    );
                    reaped += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reaped)
    }
}

fn owner_alive(pid: &str) -> bool {
    let Ok(pid) = pid.parse::<i32>() else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // signal 0 only checks for existence; EPERM means it exists but belongs
    // to someone else
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

impl Lease {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(self.log, "lease released"; "number" => self.number),
            Err(e) => warn!(self.log, "failed to release lease";
                "number" => self.number,
                "error" => e.to_string(),
            ),
        }
    }
}
