//! Session engine: wires the arrangement (C), panes (A+B), per-client
//! state and the renderer (D) together behind the operations the
//! out-of-scope command dispatcher mutates the engine through
//! (spec.md §1, §4). Everything in here runs on the single reactor
//! thread (§5); there are no locks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::arrangement::{Arrangement, Direction, LayoutTag, Orientation, Rect, Window};
use crate::error::{DispatchError, ProcessError};
use crate::ids::{ClientId, IdSource, PaneId, WindowId};
use crate::input::{self, ClientInputState, Mode as InputMode, RouteOutcome};
use crate::pane::Pane;

/// Engine-wide, command-parser-independent options (spec.md §3/§6).
/// Carried here instead of a `source-file` config loader, which is an
/// explicit non-goal collaborator (spec.md §1).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub prefix: Vec<u8>,
    pub base_index: u32,
    pub history_limit: usize,
    pub remain_on_exit: bool,
    pub bell_action: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            prefix: input::DEFAULT_PREFIX.to_vec(),
            base_index: 0,
            history_limit: 2000,
            remain_on_exit: false,
            bell_action: true,
        }
    }
}

/// Per-client session state (spec.md §3 "Client session").
#[derive(Debug, Default)]
pub struct ClientSession {
    pub size: (u16, u16), // (rows, cols)
    pub input: ClientInputState,
    pub message: Option<String>,
    /// Last rectangle the renderer assigned each pane for this client,
    /// used by `focus_direction`'s geometric lookup (spec.md §4.C).
    pub last_rects: HashMap<PaneId, Rect>,
}

pub struct Engine {
    pub ids: IdSource,
    pub arrangement: Arrangement,
    pub panes: HashMap<PaneId, Pane>,
    pub clients: HashMap<ClientId, ClientSession>,
    pub options: EngineOptions,
    pub socket_path: String,
    default_argv: Vec<String>,
    default_env: HashMap<String, String>,
    /// Clients the reactor must send a `suspend`/`detach` control
    /// packet to and, for detach, then drop (spec.md §4.F). Queued
    /// here rather than acted on directly because sending the packet
    /// and tearing down the connection is the reactor's job, not the
    /// engine's.
    pending_suspend: Vec<ClientId>,
    pending_detach: Vec<ClientId>,
}

impl Engine {
    pub fn new(options: EngineOptions, socket_path: String, default_argv: Vec<String>) -> Self {
        Engine {
            ids: IdSource::new(),
            arrangement: Arrangement::new(options.base_index),
            panes: HashMap::new(),
            clients: HashMap::new(),
            options,
            socket_path,
            default_argv,
            default_env: HashMap::new(),
            pending_suspend: Vec::new(),
            pending_detach: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arrangement.windows.is_empty()
    }

    fn spawn_pane(&mut self, argv: &[String], cwd: &Path, cols: u16, rows: u16) -> Result<PaneId, ProcessError> {
        let id = self.ids.next_pane();
        let pane = Pane::spawn(
            id,
            argv,
            &self.default_env,
            cwd,
            cols,
            rows,
            self.options.history_limit,
            &self.socket_path,
            self.options.remain_on_exit,
        )?;
        self.panes.insert(id, pane);
        Ok(id)
    }

    /// Create a brand-new window with one pane running `argv` (falls
    /// back to the engine's configured default shell command), and
    /// return its id. Used at startup and by `new-window`.
    pub fn new_window(&mut self, argv: Option<&[String]>, cwd: &Path, cols: u16, rows: u16) -> Result<WindowId, ProcessError> {
        let argv = argv.unwrap_or(&self.default_argv).to_vec();
        let pane_id = self.spawn_pane(&argv, cwd, cols, rows)?;
        let window_id = self.ids.next_window();
        self.arrangement.add_window(Window::new(window_id, pane_id));
        info!(window = window_id.get(), pane = pane_id.get(), "window created");
        Ok(window_id)
    }

    pub fn attach_client(&mut self, rows: u16, cols: u16) -> ClientId {
        let id = self.ids.next_client();
        self.clients.insert(id, ClientSession { size: (rows, cols), ..Default::default() });
        if let Some(first) = self.arrangement.windows.first() {
            self.arrangement.set_active_window(id, first.id);
        }
        info!(client = id.get(), "client attached");
        id
    }

    pub fn detach_client(&mut self, id: ClientId) {
        self.clients.remove(&id);
        self.arrangement.remove_client(id);
        info!(client = id.get(), "client detached");
    }

    /// Request that `id` be sent `suspend` (SIGTSTP itself) at the next
    /// reactor tick.
    pub fn queue_suspend(&mut self, id: ClientId) {
        if !self.pending_suspend.contains(&id) {
            self.pending_suspend.push(id);
        }
    }

    /// Request that `id` be sent `detach` and dropped at the next
    /// reactor tick.
    pub fn queue_detach(&mut self, id: ClientId) {
        if !self.pending_detach.contains(&id) {
            self.pending_detach.push(id);
        }
    }

    /// Every other client currently attached, for `start-gui`'s
    /// `detach_others` flag (spec.md §4.F).
    pub fn other_clients(&self, exclude: ClientId) -> Vec<ClientId> {
        self.clients.keys().copied().filter(|&id| id != exclude).collect()
    }

    pub fn drain_suspend_requests(&mut self) -> Vec<ClientId> {
        std::mem::take(&mut self.pending_suspend)
    }

    pub fn drain_detach_requests(&mut self) -> Vec<ClientId> {
        std::mem::take(&mut self.pending_detach)
    }

    pub fn resize_client(&mut self, id: ClientId, rows: u16, cols: u16) {
        if let Some(session) = self.clients.get_mut(&id) {
            session.size = (rows, cols);
        }
    }

    pub fn active_window(&self, client: ClientId) -> Option<&Window> {
        self.arrangement.active_window_for(client).and_then(|id| self.arrangement.window(id))
    }

    pub fn active_pane(&self, client: ClientId) -> Option<PaneId> {
        self.active_window(client).and_then(|w| w.active_pane())
    }

    /// Route one chunk of raw client input (spec.md §4.E) and apply
    /// its outcome: forward translated bytes to the active pane, run
    /// any dispatched commands, and apply window/focus navigation
    /// that doesn't need the full command grammar.
    pub fn handle_client_input(&mut self, client: ClientId, bytes: &[u8]) {
        let (mouse_reports, bytes) = input::extract_mouse_reports(bytes);
        for report in mouse_reports {
            self.handle_client_mouse(client, report.row, report.col, report.button, report.press);
        }
        let bytes = &bytes[..];

        let Some(window_id) = self.arrangement.active_window_for(client) else { return };
        let active_pane = self.arrangement.window(window_id).and_then(|w| w.active_pane());
        let modes = active_pane
            .and_then(|id| self.panes.get(&id))
            .map(|p| (p.screen.modes.application_cursor, p.screen.modes.bracketed_paste))
            .unwrap_or((false, false));

        let Some(session) = self.clients.get_mut(&client) else { return };
        let outcome: RouteOutcome = input::route(&mut session.input, bytes, &self.options.prefix, input::DEFAULT_BINDINGS, modes);

        if !outcome.forward_to_pane.is_empty() {
            if let Some(pane_id) = active_pane {
                if let Some(pane) = self.panes.get_mut(&pane_id) {
                    let _ = pane.write_input(&outcome.forward_to_pane);
                }
            }
        }
        if let Some(digit) = outcome.select_window_digit {
            self.arrangement.select_window_by_index(client, digit);
        }
        if let Some(dir) = outcome.focus {
            let rects = self.clients.get(&client).map(|s| s.last_rects.clone()).unwrap_or_default();
            let direction = match dir {
                input::Direction::Left => Direction::Left,
                input::Direction::Right => Direction::Right,
                input::Direction::Up => Direction::Up,
                input::Direction::Down => Direction::Down,
            };
            if let Some(w) = self.arrangement.window_mut(window_id) {
                w.focus_direction(direction, &rects);
            }
        }
        for command in outcome.run_commands {
            if let Err(e) = self.dispatch(client, &command) {
                warn!(client = client.get(), command = %command, error = %e, "command dispatch failed");
                if let Some(session) = self.clients.get_mut(&client) {
                    session.message = Some(format!("error: {}", e));
                }
            }
        }
    }

    /// Route a mouse press/release at the client's own 0-based (row,
    /// col) (spec.md §4.E): a click on the status row switches the
    /// active window; a click on a pane's title row, or on any
    /// non-active pane's body, focuses that pane without forwarding
    /// the event; a click on the active pane's body is encoded into
    /// its mouse-reporting format (if enabled) and sent as input.
    pub fn handle_client_mouse(&mut self, client: ClientId, row: u16, col: u16, button: u8, press: bool) {
        let Some(window_id) = self.arrangement.active_window_for(client) else { return };
        let Some(session) = self.clients.get(&client) else { return };
        let (client_rows, client_cols) = session.size;
        let rects = session.last_rects.clone();

        if client_rows > 0 && row + 1 == client_rows {
            if let Some(target) = crate::render::status_bar_hit(&self.arrangement, client_cols, col) {
                self.arrangement.set_active_window(client, target);
            }
            return;
        }

        let Some((&pane_id, &rect)) = rects.iter().find(|(_, r)| r.contains(col, row)) else { return };
        let active_pane = self.arrangement.window(window_id).and_then(|w| w.active_pane());
        let on_title_row = row == rect.y;
        if on_title_row || Some(pane_id) != active_pane {
            if let Some(window) = self.arrangement.window_mut(window_id) {
                if let Some((path, _)) = window.panes().into_iter().find(|(_, id)| *id == pane_id) {
                    window.active_path = path;
                }
            }
            return;
        }

        let Some(pane) = self.panes.get_mut(&pane_id) else { return };
        if pane.screen.modes.mouse_tracking == crate::screen::MouseTracking::Off {
            return;
        }
        let local_col = col.saturating_sub(rect.x) + 1;
        let local_row = row.saturating_sub(rect.y) + 1;
        let encoding = pane.screen.modes.mouse_encoding;
        let bytes = input::encode_mouse_event(encoding, button, local_col, local_row, press);
        let _ = pane.write_input(&bytes);
    }

    /// Minimal verb dispatcher (spec.md §1 treats the real grammar as
    /// an out-of-scope black box; this implements exactly the verbs
    /// spec.md §6's default bindings and §8's scenarios exercise).
    pub fn dispatch(&mut self, client: ClientId, command: &str) -> Result<(), DispatchError> {
        let mut parts = command.split_whitespace();
        let verb = parts.next().unwrap_or("");
        let rest: Vec<&str> = parts.collect();
        match verb {
            "split-window" => self.cmd_split_window(client, &rest),
            "new-window" => self.cmd_new_window(client),
            "next-window" => {
                self.arrangement.select_next_window(client);
                Ok(())
            }
            "previous-window" => {
                self.arrangement.select_previous_window(client);
                Ok(())
            }
            "last-window" => {
                self.arrangement.select_last_window(client);
                Ok(())
            }
            "select-pane" => self.cmd_select_pane(client, &rest),
            "last-pane" => self.cmd_last_pane(client),
            "kill-pane" => self.cmd_kill_pane(client),
            "break-pane" => self.cmd_break_pane(client),
            "rename-window" => self.cmd_rename_window(client, &rest.join(" ")),
            "rename-pane" => self.cmd_rename_pane(client, &rest.join(" ")),
            "detach-client" => {
                self.queue_detach(client);
                Ok(())
            }
            "next-layout" => self.cmd_next_layout(client),
            "select-layout" => self.cmd_select_layout(client, rest.first().copied().unwrap_or("even-horizontal")),
            "resize-pane" => self.cmd_resize_pane(client, &rest),
            "rotate-window" => self.cmd_rotate(client, &rest),
            "swap-pane" => self.cmd_swap_pane(client, &rest),
            "suspend-client" => {
                self.queue_suspend(client);
                Ok(())
            }
            "clock-mode" => {
                if let Some(id) = self.active_pane(client) {
                    if let Some(pane) = self.panes.get_mut(&id) {
                        pane.clock_mode = !pane.clock_mode;
                    }
                }
                Ok(())
            }
            _ => Err(DispatchError::Unrecognized(command.to_string())),
        }
    }

    fn cmd_split_window(&mut self, client: ClientId, args: &[&str]) -> Result<(), DispatchError> {
        let orientation = if args.contains(&"-h") { Orientation::Vertical } else { Orientation::Horizontal };
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let (cwd, cols, rows) = self.spawn_context(window_id)?;
        let new_pane = self.spawn_pane(&self.default_argv.clone(), &cwd, cols, rows)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.add_pane(orientation, new_pane);
        Ok(())
    }

    fn cmd_new_window(&mut self, client: ClientId) -> Result<(), DispatchError> {
        let cwd = self.active_pane(client).and_then(|id| self.panes.get(&id)).and_then(|p| p.cwd()).unwrap_or_else(|| PathBuf::from("."));
        let (rows, cols) = self.clients.get(&client).map(|s| s.size).unwrap_or((24, 80));
        let window_id = self.new_window(None, &cwd, cols, rows.saturating_sub(1))?;
        self.arrangement.set_active_window(client, window_id);
        Ok(())
    }

    fn spawn_context(&self, window_id: WindowId) -> Result<(PathBuf, u16, u16), DispatchError> {
        let window = self.arrangement.window(window_id).ok_or(DispatchError::NoSuchWindow)?;
        let active = window.active_pane().ok_or(DispatchError::NoSuchPane)?;
        let pane = self.panes.get(&active).ok_or(DispatchError::NoSuchPane)?;
        let cwd = pane.cwd().unwrap_or_else(|| PathBuf::from("."));
        Ok((cwd, pane.screen.columns, pane.screen.lines))
    }

    fn cmd_select_pane(&mut self, client: ClientId, args: &[&str]) -> Result<(), DispatchError> {
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        if args.contains(&"-L") || args.contains(&"-U") {
            window.focus_previous();
        } else {
            window.focus_next();
        }
        Ok(())
    }

    fn cmd_last_pane(&mut self, client: ClientId) -> Result<(), DispatchError> {
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.focus_last();
        Ok(())
    }

    fn cmd_kill_pane(&mut self, client: ClientId) -> Result<(), DispatchError> {
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let pane_id = self.active_pane(client).ok_or(DispatchError::NoSuchPane)?;
        self.remove_pane(window_id, pane_id);
        Ok(())
    }

    /// Remove `pane` from `window`, terminating its process unless
    /// `remain-on-exit` is set (spec.md §3 "Ownership"). If the window
    /// becomes empty, the arrangement drops it and every affected
    /// client's active-window pointer advances (spec.md §4.C
    /// `remove_pane`).
    pub fn remove_pane(&mut self, window_id: WindowId, pane_id: PaneId) {
        if let Some(pane) = self.panes.remove(&pane_id) {
            drop(pane); // Process::drop signals/reaps the child.
        }
        let Some(window) = self.arrangement.window_mut(window_id) else { return };
        let now_empty = window.remove_pane(pane_id);
        if now_empty {
            self.arrangement.remove_window(window_id);
        }
    }

    fn cmd_break_pane(&mut self, client: ClientId) -> Result<(), DispatchError> {
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        let (pane_id, now_empty) = window.break_active_pane().ok_or(DispatchError::NoSuchPane)?;
        if now_empty {
            self.arrangement.remove_window(window_id);
        }
        let new_window_id = self.ids.next_window();
        self.arrangement.add_window(Window::new(new_window_id, pane_id));
        self.arrangement.set_active_window(client, new_window_id);
        Ok(())
    }

    fn cmd_rename_window(&mut self, client: ClientId, name: &str) -> Result<(), DispatchError> {
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.chosen_name = Some(name.to_string());
        Ok(())
    }

    fn cmd_rename_pane(&mut self, client: ClientId, name: &str) -> Result<(), DispatchError> {
        let pane_id = self.active_pane(client).ok_or(DispatchError::NoSuchPane)?;
        let pane = self.panes.get_mut(&pane_id).ok_or(DispatchError::NoSuchPane)?;
        pane.name = Some(name.to_string());
        Ok(())
    }

    fn cmd_next_layout(&mut self, client: ClientId) -> Result<(), DispatchError> {
        const CYCLE: [LayoutTag; 5] = [
            LayoutTag::EvenHorizontal,
            LayoutTag::EvenVertical,
            LayoutTag::MainHorizontal,
            LayoutTag::MainVertical,
            LayoutTag::Tiled,
        ];
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        let current = window.previous_selected_layout.unwrap_or(LayoutTag::EvenHorizontal);
        let idx = CYCLE.iter().position(|t| *t == current).unwrap_or(0);
        let next = CYCLE[(idx + 1) % CYCLE.len()];
        window.select_layout(next);
        Ok(())
    }

    fn cmd_select_layout(&mut self, client: ClientId, tag: &str) -> Result<(), DispatchError> {
        let tag = LayoutTag::parse(tag).ok_or_else(|| DispatchError::Unrecognized(tag.to_string()))?;
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.select_layout(tag);
        Ok(())
    }

    fn cmd_resize_pane(&mut self, client: ClientId, args: &[&str]) -> Result<(), DispatchError> {
        if args.first().copied() == Some("-Z") {
            let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
            let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
            window.toggle_zoom();
            return Ok(());
        }
        // -L/-R/-U/-D <delta>: resize the active pane's enclosing split
        // by shifting weight (spec.md §4.C `resize`).
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        let mut iter = args.iter();
        while let Some(&flag) = iter.next() {
            let dir = match flag {
                "-L" => Direction::Left,
                "-R" => Direction::Right,
                "-U" => Direction::Up,
                "-D" => Direction::Down,
                _ => continue,
            };
            let delta: i32 = iter.next().and_then(|s| s.parse().ok()).unwrap_or(1);
            window.resize_active(dir, delta);
        }
        Ok(())
    }

    /// `rotate-window` (`Ctrl-O`/`Esc o`, spec.md §6): a full-window
    /// cyclic rotation of every pane by one slot, `-U` reversing the
    /// direction. Unlike `swap-pane`, this is never restricted to the
    /// active pane's neighbor — that 2-slot scope is `swap-pane`'s job.
    fn cmd_rotate(&mut self, client: ClientId, args: &[&str]) -> Result<(), DispatchError> {
        let count = if args.contains(&"-U") { -1 } else { 1 };
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.rotate(count, false, false);
        Ok(())
    }

    fn cmd_swap_pane(&mut self, client: ClientId, args: &[&str]) -> Result<(), DispatchError> {
        let before = args.contains(&"-U");
        let window_id = self.arrangement.active_window_for(client).ok_or(DispatchError::NoSuchWindow)?;
        let window = self.arrangement.window_mut(window_id).ok_or(DispatchError::NoSuchWindow)?;
        window.rotate(1, before, !before);
        Ok(())
    }

    /// Drain PTY output for every pane, feed it to each pane's
    /// emulator, and reap any process whose master fd closed. Returns
    /// true if any pane's screen changed (the caller marks the
    /// session dirty and schedules a re-render, spec.md §4.G).
    pub fn pump(&mut self) -> bool {
        let mut dirty = false;
        let mut terminated: Vec<PaneId> = Vec::new();
        for (&id, pane) in self.panes.iter_mut() {
            if pane.pump() {
                terminated.push(id);
            }
            if pane.take_dirty() {
                dirty = true;
            }
            let _ = pane.flush_replies();
        }
        if !self.options.remain_on_exit {
            for id in terminated {
                if let Some(window_id) = self.window_containing(id) {
                    self.remove_pane(window_id, id);
                }
            }
        }
        dirty
    }

    fn window_containing(&self, pane: PaneId) -> Option<WindowId> {
        self.arrangement.windows.iter().find(|w| w.panes().iter().any(|(_, id)| *id == pane)).map(|w| w.id)
    }

    /// Collect and clear every pane's one-shot bell flag, returning
    /// their ids so the caller can ring the bell at every attached
    /// client (spec.md §4.A "Bell semantics").
    pub fn drain_bells(&mut self) -> Vec<PaneId> {
        self.panes.iter_mut().filter(|(_, p)| p.take_bell()).map(|(&id, _)| id).collect()
    }

    /// Resize every pane the renderer assigned a rectangle this frame,
    /// keeping each pane's emulator grid and PTY size in lockstep
    /// (spec.md §4.B `resize` guarantee).
    pub fn apply_pane_rects(&mut self, rects: &HashMap<PaneId, Rect>) {
        for (&id, rect) in rects {
            if let Some(pane) = self.panes.get_mut(&id) {
                let body_rows = rect.height.saturating_sub(1).max(1);
                if pane.screen.columns != rect.width || pane.screen.lines != body_rows {
                    let _ = pane.resize(rect.width, body_rows);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_engine() -> (Engine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = Engine::new(
            EngineOptions::default(),
            dir.path().join("sock").to_string_lossy().into_owned(),
            vec!["/bin/sh".to_string()],
        );
        (engine, dir)
    }

    #[test]
    fn new_window_then_split_gives_two_panes() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let (mut engine, dir) = test_engine();
        let window_id = engine.new_window(None, dir.path(), 80, 24).unwrap();
        let client = engine.attach_client(24, 80);
        assert_eq!(engine.active_window(client).unwrap().id, window_id);
        engine.dispatch(client, "split-window -v").unwrap();
        assert_eq!(engine.active_window(client).unwrap().pane_count(), 2);
    }

    #[test]
    fn kill_pane_removes_window_when_last_pane_dies() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let (mut engine, dir) = test_engine();
        engine.new_window(None, dir.path(), 80, 24).unwrap();
        let client = engine.attach_client(24, 80);
        engine.dispatch(client, "kill-pane").unwrap();
        assert!(engine.arrangement.windows.is_empty());
    }

    #[test]
    fn unrecognized_command_is_an_error_not_a_panic() {
        let (mut engine, _dir) = test_engine();
        let client = engine.attach_client(24, 80);
        let err = engine.dispatch(client, "frobnicate").unwrap_err();
        assert!(matches!(err, DispatchError::Unrecognized(_)));
    }

    #[test]
    fn select_layout_is_idempotent() {
        if std::env::var("CI").is_ok() {
            return;
        }
        let (mut engine, dir) = test_engine();
        let window_id = engine.new_window(None, dir.path(), 80, 24).unwrap();
        let client = engine.attach_client(24, 80);
        engine.dispatch(client, "split-window -v").unwrap();
        engine.dispatch(client, "split-window -v").unwrap();
        engine.dispatch(client, "select-layout tiled").unwrap();
        let panes_first: Vec<PaneId> = engine.arrangement.window(window_id).unwrap().panes().into_iter().map(|(_, id)| id).collect();
        engine.dispatch(client, "select-layout tiled").unwrap();
        let panes_second: Vec<PaneId> = engine.arrangement.window(window_id).unwrap().panes().into_iter().map(|(_, id)| id).collect();
        assert_eq!(panes_first, panes_second);
    }
}
