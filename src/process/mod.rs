//! Subprocess monitoring
//!
//! Children are spawned with piped stdout/stderr; both pipes are switched
//! to non-blocking mode and registered as level-triggered event-loop
//! sources that drain into log lines. SIGCHLD drives [`ProcessMonitor::reap`],
//! which collects exit statuses without ever blocking the loop. A child can
//! be ceded: it keeps being reaped (no zombies) but its termination is no
//! longer reported.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::os::fd::OwnedFd;
use std::process::{Child, Command, Stdio};

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use log::{debug, info, warn};
use rustix::fs::{fcntl_setfl, OFlags};

use crate::toolkit::WindowId;

/// Errors from spawning children
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("failed to spawn: {0}")]
    Io(#[from] std::io::Error),
}

/// A reaped child's exit report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub pid: u32,
    /// Exit code, if the child exited normally
    pub status: Option<i32>,
    /// Windows that were correlated with this child
    pub windows: Vec<WindowId>,
}

#[derive(Debug)]
struct TrackedChild {
    child: Child,
    command: String,
    ceded: bool,
    windows: Vec<WindowId>,
}

/// Tracker for children the compositor launched
#[derive(Debug, Default)]
pub struct ProcessMonitor {
    children: HashMap<u32, TrackedChild>,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch a command line through the shell and wire its output into the
    /// event loop
    pub fn spawn<D: 'static>(
        &mut self,
        handle: &LoopHandle<'static, D>,
        command_line: &str,
    ) -> Result<u32, ProcessError> {
        if command_line.trim().is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id();
        info!("Spawned '{}' as pid {}", command_line, pid);

        if let Some(stdout) = child.stdout.take() {
            register_pipe(handle, File::from(OwnedFd::from(stdout)), pid, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            register_pipe(handle, File::from(OwnedFd::from(stderr)), pid, "stderr");
        }

        self.children.insert(
            pid,
            TrackedChild {
                child,
                command: command_line.to_string(),
                ceded: false,
                windows: Vec::new(),
            },
        );
        Ok(pid)
    }

    /// Release ownership of a child: it stays reaped but its termination is
    /// no longer reported
    pub fn cede(&mut self, pid: u32) {
        if let Some(tracked) = self.children.get_mut(&pid) {
            debug!("Ceding pid {} ('{}')", pid, tracked.command);
            tracked.ceded = true;
        }
    }

    /// Whether a pid belongs to a tracked, non-ceded child
    pub fn owns(&self, pid: u32) -> bool {
        self.children.get(&pid).is_some_and(|c| !c.ceded)
    }

    /// Correlate a window with the child that created it
    pub fn window_created(&mut self, pid: u32, window: WindowId) {
        if let Some(tracked) = self.children.get_mut(&pid) {
            debug!("Pid {} created window {:?}", pid, window);
            tracked.windows.push(window);
        }
    }

    /// Drop a window correlation when the window goes away first
    pub fn window_destroyed(&mut self, window: WindowId) {
        for tracked in self.children.values_mut() {
            tracked.windows.retain(|&w| w != window);
        }
    }

    /// Collect every child that has exited; called on SIGCHLD
    ///
    /// Ceded children are waited on but not reported.
    pub fn reap(&mut self) -> Vec<ProcessExit> {
        let mut exits = Vec::new();
        let mut finished = Vec::new();
        for (&pid, tracked) in &mut self.children {
            match tracked.child.try_wait() {
                Ok(Some(status)) => finished.push((pid, status.code())),
                Ok(None) => {}
                Err(err) => {
                    warn!("Waiting for pid {} failed: {}", pid, err);
                    finished.push((pid, None));
                }
            }
        }
        for (pid, status) in finished {
            let Some(tracked) = self.children.remove(&pid) else {
                continue;
            };
            info!(
                "Child {} ('{}') exited with {:?}",
                pid, tracked.command, status
            );
            if !tracked.ceded {
                exits.push(ProcessExit {
                    pid,
                    status,
                    windows: tracked.windows,
                });
            }
        }
        exits
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Register one output pipe as a draining event-loop source
fn register_pipe<D: 'static>(handle: &LoopHandle<'static, D>, pipe: File, pid: u32, label: &str) {
    if let Err(err) = fcntl_setfl(&pipe, OFlags::NONBLOCK) {
        warn!("Failed to set pid {} {} non-blocking: {}", pid, label, err);
    }
    let label = label.to_string();
    let closure_label = label.clone();
    let result = handle.insert_source(
        Generic::new(pipe, Interest::READ, Mode::Level),
        move |_, pipe, _| {
            let mut buffer = [0u8; 4096];
            loop {
                // Shared-reference reads keep NoIoDrop happy; the fd is
                // non-blocking so this never stalls the loop
                match (&**pipe).read(&mut buffer) {
                    Ok(0) => return Ok(PostAction::Remove),
                    Ok(n) => {
                        for line in String::from_utf8_lossy(&buffer[..n]).lines() {
                            debug!("[pid {} {}] {}", pid, closure_label, line);
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        return Ok(PostAction::Continue)
                    }
                    Err(err) => {
                        warn!("Reading pid {} {} failed: {}", pid, closure_label, err);
                        return Ok(PostAction::Remove);
                    }
                }
            }
        },
    );
    if let Err(err) = result {
        warn!("Failed to register pid {} {} source: {}", pid, label, err);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn wait_for_exits(monitor: &mut ProcessMonitor) -> Vec<ProcessExit> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut exits = Vec::new();
        while Instant::now() < deadline {
            exits.extend(monitor.reap());
            if monitor.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        exits
    }

    #[test]
    fn test_spawn_and_reap() {
        let event_loop = calloop::EventLoop::<()>::try_new().unwrap();
        let mut monitor = ProcessMonitor::new();
        let pid = monitor.spawn(&event_loop.handle(), "exit 7").unwrap();
        assert!(monitor.owns(pid));

        let exits = wait_for_exits(&mut monitor);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].pid, pid);
        assert_eq!(exits[0].status, Some(7));
    }

    #[test]
    fn test_ceded_child_is_not_reported() {
        let event_loop = calloop::EventLoop::<()>::try_new().unwrap();
        let mut monitor = ProcessMonitor::new();
        let pid = monitor.spawn(&event_loop.handle(), "true").unwrap();
        monitor.cede(pid);
        assert!(!monitor.owns(pid));

        let exits = wait_for_exits(&mut monitor);
        assert!(exits.iter().all(|exit| exit.pid != pid));
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_empty_command_rejected() {
        let event_loop = calloop::EventLoop::<()>::try_new().unwrap();
        let mut monitor = ProcessMonitor::new();
        assert!(matches!(
            monitor.spawn(&event_loop.handle(), "   "),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn test_window_correlation() {
        let event_loop = calloop::EventLoop::<()>::try_new().unwrap();
        let mut monitor = ProcessMonitor::new();
        let pid = monitor.spawn(&event_loop.handle(), "sleep 0.05").unwrap();
        monitor.window_created(pid, WindowId(42));
        monitor.window_created(pid, WindowId(43));
        monitor.window_destroyed(WindowId(43));

        let exits = wait_for_exits(&mut monitor);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].windows, vec![WindowId(42)]);
    }
}
