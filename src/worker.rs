// Copyright (C) 2025 The Mordor Core Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Async worker spawn (C8, §4.6): `branch(child_kind)` forks a child,
//! wiring a pipe so the parent can collect the child's output without
//! blocking the main loop. This is the one place the server steps outside
//! the pure single-threaded model — by design, to keep unknown-latency work
//! (external process, large disk walk) off the dispatcher (§4.3 step 5).

use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{fork, pipe, ForkResult, Pid};

use crate::session::SessionId;

/// What the caller intends to do with the child's eventual output
/// (§4.6 "routed to the requester according to `child_kind`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// Deliver the collected buffer to the requesting session's output.
    Print,
    /// Discard output; the caller only cares that the child ran to
    /// completion.
    Silent,
}

/// What `branch` tells each side of the fork it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Local,
    External,
}

/// One entry in the parent's watch list (§4.6: `{pid, kind, read_fd,
/// requester_session}`).
pub struct WatchEntry {
    pub pid: Pid,
    pub kind: ChildKind,
    read_fd: OwnedFd,
    pub requester_session: Option<SessionId>,
    buffer: Vec<u8>,
}

/// Result of forking: the parent gets back the write end (for the child's
/// use, already transferred across the fork) folded into the watch entry it
/// should register; the child gets told to go run its task and write to
/// `write_fd`.
pub enum BranchOutcome {
    Parent(WatchEntry),
    Child { write_fd: OwnedFd },
}

/// Fork a worker process. §4.6: "child sees EXTERNAL, parent sees LOCAL and
/// registers `{pid, kind, read_fd, requester_session}`... parent sets the
/// read end non-blocking and resumes the main loop."
///
/// # Safety
/// Forking a multi-threaded process is unsound in general; this server is
/// single-threaded by design (§5), which is the precondition that makes
/// this call safe here.
pub unsafe fn branch(kind: ChildKind, requester_session: Option<SessionId>) -> nix::Result<BranchOutcome> {
    let (read_fd, write_fd) = pipe()?;

    // SAFETY: edition 2024 requires an explicit block even inside an
    // `unsafe fn`; the actual safety precondition (single-threaded process)
    // is documented on `branch` itself.
    let fork_result = unsafe { fork() }?;
    match fork_result {
        ForkResult::Parent { child } => {
            drop(write_fd);
            set_nonblocking(&read_fd)?;
            Ok(BranchOutcome::Parent(WatchEntry {
                pid: child,
                kind,
                read_fd,
                requester_session,
                buffer: Vec::new(),
            }))
        }
        ForkResult::Child => {
            drop(read_fd);
            Ok(BranchOutcome::Child { write_fd })
        }
    }
}

fn set_nonblocking(fd: &OwnedFd) -> nix::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// What a poll of the watch list produced for one finished child: its
/// collected output, kind, and requester, ready for the caller to route
/// (§4.6 "EOF ... output is routed to the requester").
pub struct FinishedChild {
    pub kind: ChildKind,
    pub requester_session: Option<SessionId>,
    pub output: Vec<u8>,
}

/// The parent-side registry of in-flight children (§4.6 "watch list").
#[derive(Default)]
pub struct WorkerRegistry {
    watching: Vec<WatchEntry>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: WatchEntry) {
        self.watching.push(entry);
    }

    pub fn len(&self) -> usize {
        self.watching.len()
    }

    /// Poll every watched read fd once. A child whose fd returns EOF is
    /// removed from the list, waited on (reaping its pid), and returned as
    /// a `FinishedChild`. A child permitted to exit without writing (§4.6)
    /// still shows up here with an empty `output`, once its fd is closed.
    pub fn poll(&mut self) -> Vec<FinishedChild> {
        let mut finished = Vec::new();
        let mut still_watching = Vec::new();

        for mut entry in self.watching.drain(..) {
            let mut chunk = [0u8; 4096];
            let mut hit_eof = false;
            loop {
                match nix::unistd::read(entry.read_fd.as_raw_fd(), &mut chunk) {
                    Ok(0) => {
                        hit_eof = true;
                        break;
                    }
                    Ok(n) => entry.buffer.extend_from_slice(&chunk[..n]),
                    Err(nix::errno::Errno::EAGAIN) => break,
                    Err(_) => {
                        hit_eof = true;
                        break;
                    }
                }
            }

            if hit_eof {
                let _ = waitpid(entry.pid, Some(WaitPidFlag::empty()));
                finished.push(FinishedChild {
                    kind: entry.kind,
                    requester_session: entry.requester_session,
                    output: entry.buffer,
                });
            } else {
                still_watching.push(entry);
            }
        }

        self.watching = still_watching;
        finished
    }
}

/// Child-side helper: write a complete buffer to the pipe and exit. Kept
/// separate from `branch` so the child's own control flow (which builtin it
/// runs, how it decides to exit) stays with the caller.
pub fn child_write_all(write_fd: OwnedFd, data: &[u8]) {
    use std::io::Write;
    let mut file = std::fs::File::from(write_fd);
    let _ = file.write_all(data);
}

/// Test-only helper exercising a read of a pipe end directly, used to keep
/// the EOF-detection logic in `poll` honest without actually forking.
#[cfg(test)]
fn read_all_nonblocking(fd: &OwnedFd) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut f = unsafe { std::fs::File::from_raw_fd(fd.as_raw_fd()) };
    let _ = f.read_to_end(&mut buf);
    std::mem::forget(f);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_reaps_a_child_that_writes_then_exits() {
        let kind = ChildKind::Print;
        let session = Some(SessionId::new());

        // SAFETY: test runs single-threaded under the test harness.
        let outcome = unsafe { branch(kind, session) }.expect("fork should succeed");
        match outcome {
            BranchOutcome::Parent(entry) => {
                let mut registry = WorkerRegistry::new();
                registry.register(entry);

                // Give the child a moment to write and exit.
                std::thread::sleep(std::time::Duration::from_millis(50));
                let finished = registry.poll();
                assert_eq!(finished.len(), 1);
                assert_eq!(finished[0].output, b"hello from child");
                assert_eq!(finished[0].kind, ChildKind::Print);
            }
            BranchOutcome::Child { write_fd } => {
                child_write_all(write_fd, b"hello from child");
                std::process::exit(0);
            }
        }
    }

    #[test]
    fn a_child_may_exit_without_writing() {
        let outcome = unsafe { branch(ChildKind::Silent, None) }.expect("fork should succeed");
        match outcome {
            BranchOutcome::Parent(entry) => {
                let mut registry = WorkerRegistry::new();
                registry.register(entry);
                std::thread::sleep(std::time::Duration::from_millis(50));
                let finished = registry.poll();
                assert_eq!(finished.len(), 1);
                assert!(finished[0].output.is_empty());
            }
            BranchOutcome::Child { write_fd } => {
                drop(write_fd);
                std::process::exit(0);
            }
        }
    }

    #[test]
    fn read_all_nonblocking_drains_until_eof() {
        let (read_fd, write_fd) = pipe().unwrap();
        let mut f = std::fs::File::from(write_fd);
        use std::io::Write;
        f.write_all(b"abc").unwrap();
        drop(f);
        assert_eq!(read_all_nonblocking(&read_fd), b"abc");
    }
}
