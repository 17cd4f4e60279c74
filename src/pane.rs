//! Pane: one Process + one Screen, identified by a stable `PaneId`
//! (spec §3 "Pane").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cell::CellStyle;
use crate::error::ProcessError;
use crate::ids::PaneId;
use crate::process::Process;
use crate::screen::Screen;

/// Derive a display name from a command string the way the teacher's
/// `default_shell_name` picks a window label: basename of the first
/// whitespace-separated token.
fn basename_of_command(cmd: &str) -> String {
    let first = cmd.split_whitespace().next().unwrap_or(cmd);
    Path::new(first)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(first)
        .to_string()
}

pub struct Pane {
    pub id: PaneId,
    process: Option<Process>,
    pub screen: Screen,
    /// User-assigned name (`rename-pane`); falls back to the running
    /// command's basename when unset.
    pub name: Option<String>,
    pub copy_mode: bool,
    pub clock_mode: bool,
    pub remain_on_exit: bool,
    argv0_basename: String,
    read_buf: [u8; 65536],
}

impl Pane {
    pub fn spawn(
        id: PaneId,
        argv: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
        cols: u16,
        rows: u16,
        history_limit: usize,
        socket_path: &str,
        remain_on_exit: bool,
    ) -> Result<Self, ProcessError> {
        let argv0_basename = basename_of_command(&argv.join(" "));
        let process = Process::spawn(argv, env, cwd, cols, rows, socket_path, id.get())?;
        Ok(Pane {
            id,
            process: Some(process),
            screen: Screen::new(cols, rows, history_limit),
            name: None,
            copy_mode: false,
            clock_mode: false,
            remain_on_exit,
            argv0_basename,
            read_buf: [0u8; 65536],
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.process.as_ref().map(|p| p.is_terminated()).unwrap_or(true)
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.process.as_ref().and_then(|p| p.exit_status())
    }

    pub fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        self.process.as_ref().map(|p| p.as_raw_fd())
    }

    /// Drain available PTY output into the screen. Returns true if the
    /// process was observed to terminate during this call.
    pub fn pump(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else { return false };
        loop {
            match process.read(&mut self.read_buf) {
                Some(0) => return false,
                Some(n) => {
                    self.screen.feed(&self.read_buf[..n]);
                }
                None => {
                    if !self.remain_on_exit {
                        self.process = None;
                    }
                    return true;
                }
            }
        }
    }

    pub fn try_reap(&mut self) -> bool {
        self.process.as_mut().map(|p| p.try_reap()).unwrap_or(false)
    }

    pub fn write_input(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        match self.process.as_mut() {
            Some(p) => p.write(bytes),
            None => Ok(()),
        }
    }

    /// Drain any DSR/DA reply bytes the screen queued and write them
    /// back to the child's stdin (the same path user keystrokes take).
    pub fn flush_replies(&mut self) -> Result<(), ProcessError> {
        if self.screen.reply.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.screen.reply);
        self.write_input(&bytes)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), ProcessError> {
        self.screen.resize(cols, rows);
        if let Some(p) = self.process.as_mut() {
            p.resize(cols, rows)?;
        }
        Ok(())
    }

    pub fn send_signal(&self, signum: i32) {
        if let Some(p) = self.process.as_ref() {
            p.send_signal(signum);
        }
    }

    pub fn cwd(&self) -> Option<PathBuf> {
        self.process.as_ref().and_then(|p| p.cwd())
    }

    /// Effective display name: explicit rename, else the live foreground
    /// process's basename, else the spawn-time command basename.
    pub fn display_name(&self) -> String {
        if let Some(n) = &self.name {
            return n.clone();
        }
        if let Some(p) = self.process.as_ref() {
            if let Some(n) = p.name() {
                return n;
            }
        }
        self.argv0_basename.clone()
    }

    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.screen.bell)
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.screen.dirty)
    }

    pub fn default_cell_style() -> CellStyle {
        CellStyle::default()
    }
}
