//! Process / PTY supervisor (spec §4.B).
//!
//! Mirrors the master/slave-pair dance from `karlb-termstack`'s
//! `terminal::pty` but adapted to the operations named in §4.B:
//! best-effort `cwd()`/`name()` via `/proc`, non-blocking reads driven
//! by the reactor rather than a polling loop, and `PYMUX=<socket>,<id>`
//! exported into the child so nested pymux invocations can address
//! their own pane.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use rustix::termios::{tcsetwinsize, Winsize};

use crate::error::ProcessError;

fn winsize(cols: u16, rows: u16) -> Winsize {
    Winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 }
}

pub struct Process {
    master: File,
    child: Child,
    size: (u16, u16), // (cols, rows)
    terminated: bool,
    exit_status: Option<i32>,
}

impl Process {
    /// Open a PTY pair and exec `argv[0]` with `argv[1..]` as arguments.
    /// `socket_path` and `pane_id` are exported as `PYMUX=<socket>,<id>`
    /// so a nested pymux invocation inside the pane can address it.
    pub fn spawn(
        argv: &[String],
        env: &HashMap<String, String>,
        cwd: &std::path::Path,
        cols: u16,
        rows: u16,
        socket_path: &str,
        pane_id: usize,
    ) -> Result<Self, ProcessError> {
        if argv.is_empty() {
            return Err(ProcessError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argv",
            )));
        }
        let ws = winsize(cols, rows);

        let master_fd = rustix::pty::openpt(rustix::pty::OpenptFlags::RDWR | rustix::pty::OpenptFlags::NOCTTY)
            .map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        rustix::pty::grantpt(&master_fd)
            .map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        rustix::pty::unlockpt(&master_fd)
            .map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;

        let name_buf = [0u8; 256];
        let slave_name = rustix::pty::ptsname(&master_fd, name_buf)
            .map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        let slave_path = slave_name
            .to_str()
            .map_err(|_| ProcessError::OpenPty(std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid pty slave name")))?
            .to_owned();

        tcsetwinsize(&master_fd, ws).map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;

        let slave = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&slave_path)
            .map_err(ProcessError::OpenPty)?;
        let slave_fd = slave.into_raw_fd();
        let slave_fd_out = unsafe { libc::dup(slave_fd) };
        let slave_fd_err = unsafe { libc::dup(slave_fd) };
        if slave_fd_out < 0 || slave_fd_err < 0 {
            unsafe {
                libc::close(slave_fd);
                if slave_fd_out >= 0 {
                    libc::close(slave_fd_out);
                }
            }
            return Err(ProcessError::OpenPty(std::io::Error::last_os_error()));
        }

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .current_dir(cwd)
            .env("TERM", "xterm-256color")
            .env("PYMUX", format!("{},{}", socket_path, pane_id));
        for (k, v) in env {
            command.env(k, v);
        }

        let child = unsafe {
            command
                .stdin(Stdio::from_raw_fd(slave_fd))
                .stdout(Stdio::from_raw_fd(slave_fd_out))
                .stderr(Stdio::from_raw_fd(slave_fd_err))
                .pre_exec(move || {
                    libc::setsid();
                    libc::ioctl(slave_fd, libc::TIOCSCTTY, 0);
                    libc::signal(libc::SIGWINCH, libc::SIG_DFL);
                    Ok(())
                })
                .spawn()
                .map_err(ProcessError::Spawn)?
        };

        let master = unsafe { File::from_raw_fd(master_fd.as_raw_fd()) };
        std::mem::forget(master_fd);
        set_nonblocking(&master)?;

        Ok(Process {
            master,
            child,
            size: (cols, rows),
            terminated: false,
            exit_status: None,
        })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking read. `Ok(0)` means EAGAIN (normal); a genuine EOF
    /// or error marks the process terminated and is reported via `None`
    /// so the caller removes the reactor source and fires the
    /// done-callback.
    pub fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.terminated {
            return None;
        }
        match self.master.read(buf) {
            Ok(0) => {
                self.mark_terminated();
                None
            }
            Ok(n) => Some(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::EAGAIN) => Some(0),
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                self.mark_terminated();
                None
            }
            Err(_) => {
                self.mark_terminated();
                None
            }
        }
    }

    /// Blocking write, retrying on EINTR (SIGWINCH can interrupt it).
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        let mut offset = 0;
        while offset < bytes.len() {
            match self.master.write(&bytes[offset..]) {
                Ok(n) => offset += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(ProcessError::Write(e)),
            }
        }
        Ok(())
    }

    /// TIOCSWINSZ on the master. The caller is responsible for resizing
    /// the matching `Screen` so the two stay in lockstep.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), ProcessError> {
        let ws = winsize(cols, rows);
        tcsetwinsize(self.master.as_fd(), ws).map_err(|e| ProcessError::Resize(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
        self.size = (cols, rows);
        Ok(())
    }

    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    pub fn send_signal(&self, signum: i32) {
        if self.terminated {
            return;
        }
        unsafe {
            libc::kill(self.child.id() as i32, signum);
        }
    }

    /// Reap the child without blocking; called after SIGCHLD wakes (G).
    /// Returns true if this call observed the transition to terminated.
    pub fn try_reap(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = status.code();
                self.terminated = true;
                true
            }
            _ => false,
        }
    }

    fn mark_terminated(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let _ = self.child.try_wait();
    }

    /// Best-effort: readlink `/proc/<pid>/cwd` on Linux, `None` elsewhere
    /// or on failure (permission, process already gone).
    #[cfg(target_os = "linux")]
    pub fn cwd(&self) -> Option<PathBuf> {
        std::fs::read_link(format!("/proc/{}/cwd", self.child.id())).ok()
    }

    #[cfg(not(target_os = "linux"))]
    pub fn cwd(&self) -> Option<PathBuf> {
        None
    }

    /// Best-effort: the basename of the foreground process group's
    /// command line, read via `tcgetpgrp` + `/proc/<pgrp>/cmdline`.
    #[cfg(target_os = "linux")]
    pub fn name(&self) -> Option<String> {
        let pgrp = unsafe { libc::tcgetpgrp(self.master.as_raw_fd()) };
        if pgrp <= 0 {
            return None;
        }
        let cmdline = std::fs::read(format!("/proc/{}/cmdline", pgrp)).ok()?;
        let first = cmdline.split(|&b| b == 0).next()?;
        if first.is_empty() {
            return None;
        }
        let s = String::from_utf8_lossy(first).into_owned();
        std::path::Path::new(&s)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn name(&self) -> Option<String> {
        None
    }
}

fn set_nonblocking(file: &File) -> Result<(), ProcessError> {
    let flags = rustix::fs::fcntl_getfl(file).map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
    rustix::fs::fcntl_setfl(file, flags | rustix::fs::OFlags::NONBLOCK)
        .map_err(|e| ProcessError::OpenPty(std::io::Error::from_raw_os_error(e.raw_os_error())))?;
    Ok(())
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        unsafe {
            libc::kill(self.child.id() as i32, libc::SIGHUP);
        }
        let start = std::time::Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {
                    if start.elapsed() > std::time::Duration::from_millis(300) {
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Resolve `argv[0]` against `PATH` the way a shell's exec builtin
/// would, for callers that want to pre-validate before spawning.
pub fn resolve_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(program);
        if let Ok(c) = CString::new(candidate.as_os_str().as_encoded_bytes().to_vec()) {
            if unsafe { libc::access(c.as_ptr(), libc::X_OK) } == 0 {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn spawn_and_read_echo() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "echo hi".to_string()];
        let env = HashMap::new();
        let mut p = Process::spawn(&argv, &env, std::path::Path::new("/tmp"), 80, 24, "/tmp/pymux.sock.0", 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(150));
        let mut buf = [0u8; 256];
        let mut out = Vec::new();
        for _ in 0..20 {
            if let Some(n) = p.read(&mut buf) {
                if n > 0 {
                    out.extend_from_slice(&buf[..n]);
                }
            }
            if out.windows(2).any(|w| w == b"hi") {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(String::from_utf8_lossy(&out).contains("hi"));
    }

    #[test]
    fn resolve_in_path_finds_sh() {
        assert_eq!(resolve_in_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(resolve_in_path("sh").is_some());
        assert!(resolve_in_path("definitely-not-a-real-binary-xyz").is_none());
    }

    #[test]
    fn empty_argv_is_rejected() {
        let env = HashMap::new();
        let result = Process::spawn(&[], &env, std::path::Path::new("/tmp"), 80, 24, "/tmp/pymux.sock.0", 1);
        assert!(result.is_err());
    }
}
