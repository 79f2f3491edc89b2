//! Process-tree introspection and signalling.
//!
//! The playback supervisor only ever owns a handle to the player itself; any
//! helpers the player forks are reached through this trait by PID.

use std::io;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub trait ProcessTree {
    /// Direct children of `pid`. Empty if `pid` is gone or has none.
    fn children(&self, pid: u32) -> Vec<u32>;

    /// Ask the process to exit (SIGTERM).
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Force the process to exit (SIGKILL).
    fn kill(&self, pid: u32) -> io::Result<()>;

    /// False once the process has exited, including when it is a zombie
    /// waiting to be reaped by its parent.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Wait up to `grace` for every PID in `pids` to exit. Returns the ones still alive.
pub fn wait_for_exit<T: ProcessTree + ?Sized>(tree: &T, pids: &[u32], grace: Duration) -> Vec<u32> {
    let deadline = Instant::now() + grace;
    loop {
        let alive: Vec<u32> = pids.iter().copied().filter(|&pid| tree.is_alive(pid)).collect();
        if alive.is_empty() || Instant::now() >= deadline {
            return alive;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// Terminate the children of `pid`, escalating to SIGKILL for any that
/// outlive the grace period. Returns the PIDs that had to be killed.
pub fn terminate_children<T: ProcessTree + ?Sized>(tree: &T, pid: u32, grace: Duration) -> Vec<u32> {
    let children = tree.children(pid);
    for &child in &children {
        if let Err(e) = tree.terminate(child) {
            log::debug!("Failed to terminate child PID {}: {}", child, e);
        }
    }

    let survivors = wait_for_exit(tree, &children, grace);
    for &child in &survivors {
        log::warn!("Child PID {} didn't terminate. Killing.", child);
        if let Err(e) = tree.kill(child) {
            log::error!("Failed to kill child PID {}: {}", child, e);
        }
    }
    survivors
}

/// The real OS process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTree;

#[cfg(unix)]
impl SystemProcessTree {
    fn signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Parse `/proc/<pid>/stat` into (state, parent pid). The command name can
/// contain spaces and parentheses, so fields are read after the last `)`.
fn parse_stat(stat: &str) -> Option<(char, u32)> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some((state, ppid))
}

fn read_stat(pid: u32) -> Option<(char, u32)> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    parse_stat(&stat)
}

#[cfg(unix)]
impl ProcessTree for SystemProcessTree {
    fn children(&self, pid: u32) -> Vec<u32> {
        let entries = match std::fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Cannot list /proc: {}", e);
                return Vec::new();
            }
        };

        let mut children: Vec<u32> = entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
            .filter(|&candidate| matches!(read_stat(candidate), Some((_, ppid)) if ppid == pid))
            .collect();
        children.sort_unstable();
        children
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        Self::signal(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        Self::signal(pid, libc::SIGKILL)
    }

    fn is_alive(&self, pid: u32) -> bool {
        match Self::signal(pid, 0) {
            Ok(()) => !matches!(read_stat(pid), Some(('Z', _))),
            Err(e) => e.raw_os_error() == Some(libc::EPERM),
        }
    }
}

#[cfg(not(unix))]
impl ProcessTree for SystemProcessTree {
    fn children(&self, _pid: u32) -> Vec<u32> {
        Vec::new()
    }

    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "signals are only supported on unix"))
    }

    fn kill(&self, _pid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "signals are only supported on unix"))
    }

    fn is_alive(&self, _pid: u32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    #[test]
    fn test_parse_stat() {
        assert_eq!(parse_stat("1234 (omxplayer.bin) S 1200 1234 1234 0 -1"), Some(('S', 1200)));
        assert_eq!(parse_stat("77 (weird) name)) Z 5 77 77"), Some(('Z', 5)));
        assert_eq!(parse_stat("garbage"), None);
    }

    /// Children that die on SIGTERM unless listed as stubborn.
    struct FakeTree {
        children: Vec<u32>,
        stubborn: HashSet<u32>,
        alive: RefCell<HashSet<u32>>,
        killed: RefCell<Vec<u32>>,
    }

    impl FakeTree {
        fn new(children: &[u32], stubborn: &[u32]) -> Self {
            Self {
                children: children.to_vec(),
                stubborn: stubborn.iter().copied().collect(),
                alive: RefCell::new(children.iter().copied().collect()),
                killed: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessTree for FakeTree {
        fn children(&self, _pid: u32) -> Vec<u32> {
            self.children.clone()
        }

        fn terminate(&self, pid: u32) -> io::Result<()> {
            if !self.stubborn.contains(&pid) {
                self.alive.borrow_mut().remove(&pid);
            }
            Ok(())
        }

        fn kill(&self, pid: u32) -> io::Result<()> {
            self.alive.borrow_mut().remove(&pid);
            self.killed.borrow_mut().push(pid);
            Ok(())
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.alive.borrow().contains(&pid)
        }
    }

    #[test]
    fn test_terminate_children_escalates_only_stubborn() {
        let tree = FakeTree::new(&[10, 11, 12], &[11]);

        let killed = terminate_children(&tree, 1, Duration::from_millis(50));

        assert_eq!(killed, vec![11]);
        assert_eq!(*tree.killed.borrow(), vec![11]);
        assert!(tree.alive.borrow().is_empty());
    }

    #[test]
    fn test_terminate_children_without_children() {
        let tree = FakeTree::new(&[], &[]);
        assert!(terminate_children(&tree, 1, Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn test_wait_for_exit_returns_early() {
        let tree = FakeTree::new(&[10], &[]);
        tree.terminate(10).unwrap();

        let start = Instant::now();
        assert!(wait_for_exit(&tree, &[10], Duration::from_secs(5)).is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_tree_sees_real_children() {
        let mut shell = std::process::Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & wait")
            .spawn()
            .unwrap();
        let pid = shell.id();

        let tree = SystemProcessTree;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut children = tree.children(pid);
        while children.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            children = tree.children(pid);
        }
        assert_eq!(children.len(), 1);
        assert!(tree.is_alive(children[0]));

        assert!(terminate_children(&tree, pid, Duration::from_secs(3)).is_empty());
        assert!(!tree.is_alive(children[0]));

        shell.wait().unwrap();
        assert!(!tree.is_alive(pid));
    }
}
