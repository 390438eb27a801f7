//! Process liveness monitoring
//!
//! Every connected application gets a watcher task that resolves when the
//! process exits. On Linux the watcher waits on a pidfd, which becomes
//! readable the moment the process dies. Where pidfds are unavailable the
//! watcher falls back to probing with `kill(pid, 0)` at a fixed interval.
//!
//! Deaths are delivered through [`LivenessMonitor::next_death`], which the
//! shell service polls next to its socket and timer sources.

use crate::channel::ProcessId;
use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Watches application processes and reports their deaths
#[derive(Debug)]
pub struct LivenessMonitor {
    poll_interval: Duration,
    deaths_tx: mpsc::UnboundedSender<ProcessId>,
    deaths_rx: mpsc::UnboundedReceiver<ProcessId>,
    watchers: HashMap<ProcessId, JoinHandle<()>>,
}

impl LivenessMonitor {
    /// Create a monitor. Must be called inside a tokio runtime before
    /// [`watch`](Self::watch) is used.
    pub fn new(poll_interval: Duration) -> Self {
        let (deaths_tx, deaths_rx) = mpsc::unbounded_channel();
        Self {
            poll_interval,
            deaths_tx,
            deaths_rx,
            watchers: HashMap::new(),
        }
    }

    /// Start watching `pid`. Watching an already watched process is a no-op.
    pub fn watch(&mut self, pid: ProcessId) {
        if self.watchers.contains_key(&pid) {
            return;
        }

        let deaths = self.deaths_tx.clone();
        let poll_interval = self.poll_interval;
        let task = tokio::spawn(async move {
            wait_for_exit(pid, poll_interval).await;
            debug!("💀 Process {} exited", pid);
            let _ = deaths.send(pid);
        });
        self.watchers.insert(pid, task);
    }

    /// Stop watching `pid`; returns false if it was not watched
    pub fn unwatch(&mut self, pid: ProcessId) -> bool {
        match self.watchers.remove(&pid) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, pid: ProcessId) -> bool {
        self.watchers.contains_key(&pid)
    }

    pub fn watched_count(&self) -> usize {
        self.watchers.len()
    }

    /// Wait for the next death.
    ///
    /// A pid that was watched twice may be reported twice; consumers treat
    /// repeated deaths as no-ops.
    pub async fn next_death(&mut self) -> ProcessId {
        loop {
            // The monitor holds a sender, so the channel never closes
            if let Some(pid) = self.deaths_rx.recv().await {
                self.watchers.remove(&pid);
                return pid;
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        for (_, task) in self.watchers.drain() {
            task.abort();
        }
    }
}

/// Resolve once `pid` no longer runs
async fn wait_for_exit(pid: ProcessId, poll_interval: Duration) {
    #[cfg(target_os = "linux")]
    {
        match pidfd::open(pid) {
            Ok(fd) => match pidfd::wait(fd).await {
                Ok(()) => return,
                Err(e) => warn!("pidfd wait for {} failed, polling instead: {}", pid, e),
            },
            // Already gone before we could watch it
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return,
            Err(e) => debug!("pidfd_open({}) unavailable, polling instead: {}", pid, e),
        }
    }

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !is_alive(pid) {
            return;
        }
    }
}

/// Probe a process with signal 0. EPERM still means it exists.
pub fn is_alive(pid: ProcessId) -> bool {
    // SAFETY: kill with signal 0 performs only the existence and permission check
    let rc = unsafe { libc::kill(pid.as_raw(), 0) };
    if rc == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(target_os = "linux")]
mod pidfd {
    use crate::channel::ProcessId;
    use std::io;
    use std::os::fd::{FromRawFd, OwnedFd};
    use tokio::io::unix::AsyncFd;
    use tokio::io::Interest;

    pub fn open(pid: ProcessId) -> io::Result<OwnedFd> {
        // SAFETY: pidfd_open takes a pid and flags and returns a new fd or -1
        let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid.as_raw(), 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the kernel just handed us this descriptor and nothing else owns it
        Ok(unsafe { OwnedFd::from_raw_fd(fd as i32) })
    }

    /// A pidfd turns readable when its process exits
    pub async fn wait(fd: OwnedFd) -> io::Result<()> {
        let fd = AsyncFd::with_interest(fd, Interest::READABLE)?;
        let _guard = fd.readable().await?;
        Ok(())
    }
}
