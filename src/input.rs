//! Input router (spec §4.E): per-client key decision procedure.
//!
//! Grounded in the teacher's `input.rs` `handle_key` state machine
//! (`Mode::Passthrough`/`Prefix`/`CommandPrompt`/...), trimmed to the
//! states spec.md §4.E names and reworked for a byte-stream transport:
//! the teacher dispatches `crossterm::event::KeyEvent`s produced
//! locally by its own terminal read loop, but here keystrokes arrive
//! as raw bytes inside a `{"cmd":"in",...}` packet (spec.md §4.F), so
//! the router tokenizes a chunk into logical keys itself before
//! applying the six-step procedure.

use crate::ids::PaneId;

/// One logical keypress as the raw bytes the terminal would have sent
/// for it: a single byte, a UTF-8 scalar, or a complete CSI/SS3
/// sequence. Tokenizing up front means steps 1-4 of the decision
/// procedure (confirmation / prompt / prefix table) match whole keys
/// instead of guessing at escape-sequence boundaries themselves.
pub fn tokenize_keys(bytes: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        if bytes[i] == 0x1b && i + 1 < bytes.len() && (bytes[i + 1] == b'[' || bytes[i + 1] == b'O') {
            i += 2;
            while i < bytes.len() && !bytes[i].is_ascii_alphabetic() && bytes[i] != b'~' {
                i += 1;
            }
            if i < bytes.len() {
                i += 1;
            }
        } else if bytes[i] == 0x1b {
            // Bare ESC (e.g. `Esc 1`..`Esc 5` layout shortcuts, `Esc o` rotate).
            i += 1;
            if i < bytes.len() {
                i += 1;
            }
        } else {
            let width = utf8_len(bytes[i]);
            i += width.min(bytes.len() - i).max(1);
        }
        out.push(&bytes[start..i]);
    }
    out
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else if first_byte & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// Per-client mode (spec.md §3 "Client session" flags, collapsed into
/// one enum the way the teacher's `types::Mode` does). `CopyMode` only
/// tracks that keys should be swallowed here; actual scrollback
/// navigation is out of scope per spec.md §4.E item 5.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Normal,
    PrefixArmed,
    CommandPrompt { buffer: String },
    TextPrompt { template: String, buffer: String },
    Confirm { command: String },
    CopyMode,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

/// Per-client input state threaded through every call to `route`.
#[derive(Debug, Default)]
pub struct ClientInputState {
    pub mode: Mode,
}

/// A default prefix binding: spec.md §6's table, matched against the
/// raw bytes of the key that follows the prefix.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub key: &'static [u8],
    pub command: &'static str,
}

/// Default `Ctrl-B`-prefixed bindings (spec.md §6). Digit keys
/// (`0`..`9`) and the four arrow/`Ctrl-h,j,k,l` directional bindings
/// are handled specially in `route` rather than listed here, since
/// their target depends on which digit/direction was pressed.
pub const DEFAULT_BINDINGS: &[Binding] = &[
    Binding { key: b"\"", command: "split-window -v" },
    Binding { key: b"%", command: "split-window -h" },
    Binding { key: b"c", command: "new-window" },
    Binding { key: b"n", command: "next-window" },
    Binding { key: b"p", command: "previous-window" },
    Binding { key: b"o", command: "select-pane -t :.+" },
    Binding { key: b";", command: "last-pane" },
    Binding { key: b"l", command: "last-window" },
    Binding { key: b",", command: "command-prompt -p \"New window name:\" rename-window %%" },
    Binding { key: b"'", command: "command-prompt -p \"New pane name:\" rename-pane %%" },
    Binding { key: b"x", command: "confirm-before -p \"kill-pane? (y/n)\" kill-pane" },
    Binding { key: b"!", command: "break-pane" },
    Binding { key: b"d", command: "detach-client" },
    Binding { key: b"t", command: "clock-mode" },
    Binding { key: b" ", command: "next-layout" },
    Binding { key: b"\x1a", command: "suspend-client" }, // Ctrl-Z
    Binding { key: b":", command: "command-prompt" },
    Binding { key: b"z", command: "resize-pane -Z" },
    Binding { key: b"{", command: "swap-pane -U" },
    Binding { key: b"}", command: "swap-pane -D" },
    Binding { key: b"\x0f", command: "rotate-window" },    // Ctrl-O
    Binding { key: b"\x1bo", command: "rotate-window" },   // Esc o
    Binding { key: b"\x1b1", command: "select-layout even-horizontal" },
    Binding { key: b"\x1b2", command: "select-layout even-vertical" },
    Binding { key: b"\x1b3", command: "select-layout main-horizontal" },
    Binding { key: b"\x1b4", command: "select-layout main-vertical" },
    Binding { key: b"\x1b5", command: "select-layout tiled" },
    Binding { key: b"\x08", command: "resize-pane -L 5" },  // Ctrl-H
    Binding { key: b"\x0a", command: "resize-pane -D 5" },  // Ctrl-J
    Binding { key: b"\x0b", command: "resize-pane -U 5" },  // Ctrl-K
    Binding { key: b"\x0c", command: "resize-pane -R 5" },  // Ctrl-L
];

pub const DEFAULT_PREFIX: &[u8] = b"\x02"; // Ctrl-B

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// Outcome of routing one chunk of client input. The caller applies
/// these in order: swallow nothing, run zero or more dispatcher
/// commands, optionally focus a direction, and forward the remaining
/// bytes (already CR/paste-translated) to the active pane.
#[derive(Debug, Default)]
pub struct RouteOutcome {
    pub run_commands: Vec<String>,
    pub focus: Option<Direction>,
    pub select_window_digit: Option<u32>,
    pub forward_to_pane: Vec<u8>,
    pub cancel_to_active: bool,
}

/// Translate a single logical key per spec.md §4.E step 6: arrow keys
/// become SS3 form under application-cursor mode, `\n` becomes `\r`,
/// and the whole batch is bracketed-paste-wrapped if the pane has that
/// mode on. `application_cursor` and `bracketed_paste` are read from
/// the target pane's `Screen` by the caller.
pub fn translate_for_pane(key: &[u8], application_cursor: bool, bracketed_paste_batch: bool) -> Vec<u8> {
    if application_cursor {
        let translated = match key {
            b"\x1b[A" => Some(&b"\x1bOA"[..]),
            b"\x1b[B" => Some(&b"\x1bOB"[..]),
            b"\x1b[C" => Some(&b"\x1bOC"[..]),
            b"\x1b[D" => Some(&b"\x1bOD"[..]),
            _ => None,
        };
        if let Some(t) = translated {
            return t.to_vec();
        }
    }
    let body: Vec<u8> = key.iter().map(|&b| if b == b'\n' { b'\r' } else { b }).collect();
    if bracketed_paste_batch {
        let mut out = Vec::with_capacity(body.len() + 12);
        out.extend_from_slice(b"\x1b[200~");
        out.extend_from_slice(&body);
        out.extend_from_slice(b"\x1b[201~");
        out
    } else {
        body
    }
}

/// Run the six-step decision procedure (spec.md §4.E) over one chunk
/// of raw input bytes for a single client. `active_pane_modes` carries
/// the (application_cursor, bracketed_paste) pair read from the
/// active pane's `Screen` so step 6's translation can be applied.
pub fn route(
    state: &mut ClientInputState,
    bytes: &[u8],
    prefix: &[u8],
    bindings: &[Binding],
    active_pane_modes: (bool, bool),
) -> RouteOutcome {
    let mut outcome = RouteOutcome::default();
    for key in tokenize_keys(bytes) {
        route_one(state, key, prefix, bindings, active_pane_modes, &mut outcome);
    }
    outcome
}

fn route_one(
    state: &mut ClientInputState,
    key: &[u8],
    prefix: &[u8],
    bindings: &[Binding],
    active_pane_modes: (bool, bool),
    outcome: &mut RouteOutcome,
) {
    match &mut state.mode {
        // Step 1: confirmation dialog.
        Mode::Confirm { command } => {
            match key {
                b"y" | b"Y" => {
                    outcome.run_commands.push(command.clone());
                    state.mode = Mode::Normal;
                }
                b"n" | b"N" | b"\x03" => {
                    state.mode = Mode::Normal;
                }
                _ => {}
            }
            return;
        }
        // Step 2: `:` prompt or `command-prompt -p` text prompt.
        Mode::CommandPrompt { buffer } => {
            match key {
                b"\x03" | b"\x07" => state.mode = Mode::Normal,
                b"\x7f" | b"\x08" if buffer.is_empty() => state.mode = Mode::Normal,
                b"\x7f" | b"\x08" => {
                    buffer.pop();
                }
                b"\r" | b"\n" => {
                    outcome.run_commands.push(std::mem::take(buffer));
                    state.mode = Mode::Normal;
                }
                _ => {
                    if let Ok(s) = std::str::from_utf8(key) {
                        buffer.push_str(s);
                    }
                }
            }
            return;
        }
        Mode::TextPrompt { template, buffer } => {
            match key {
                b"\x03" | b"\x07" => state.mode = Mode::Normal,
                b"\x7f" | b"\x08" if buffer.is_empty() => state.mode = Mode::Normal,
                b"\x7f" | b"\x08" => {
                    buffer.pop();
                }
                b"\r" | b"\n" => {
                    let filled = template.replacen("%%", buffer, 1);
                    outcome.run_commands.push(filled);
                    state.mode = Mode::Normal;
                }
                _ => {
                    if let Ok(s) = std::str::from_utf8(key) {
                        buffer.push_str(s);
                    }
                }
            }
            return;
        }
        _ => {}
    }

    // Step 3: prefix already armed for this client.
    if state.mode == Mode::PrefixArmed {
        state.mode = Mode::Normal;
        if let Ok(s) = std::str::from_utf8(key) {
            if s.len() == 1 {
                if let Some(d) = s.chars().next().unwrap().to_digit(10) {
                    outcome.select_window_digit = Some(d);
                    return;
                }
            }
        }
        match key {
            b"\x1b[A" | b"\x08" => { outcome.focus = Some(Direction::Up); return; } // Ctrl-H is resize above; arrow always focuses
            b"\x1b[B" => { outcome.focus = Some(Direction::Down); return; }
            b"\x1b[C" => { outcome.focus = Some(Direction::Right); return; }
            b"\x1b[D" => { outcome.focus = Some(Direction::Left); return; }
            _ => {}
        }
        if let Some(b) = bindings.iter().find(|b| b.key == key) {
            if b.command == "command-prompt" {
                state.mode = Mode::CommandPrompt { buffer: String::new() };
                return;
            }
            if let Some(template) = parse_command_prompt_template(b.command) {
                state.mode = Mode::TextPrompt { template, buffer: String::new() };
                return;
            }
            if let Some(cmd) = parse_confirm_template(b.command) {
                state.mode = Mode::Confirm { command: cmd };
                return;
            }
            outcome.run_commands.push(b.command.to_string());
        }
        // Miss: swallow.
        return;
    }

    // Step 4: the prefix key itself.
    if key == prefix {
        state.mode = Mode::PrefixArmed;
        return;
    }

    // Step 5: copy-mode consumes keys; q/Ctrl-C exit (navigation itself
    // is out of scope per spec.md §4.E item 5).
    if state.mode == Mode::CopyMode {
        if key == b"q" || key == b"\x03" {
            state.mode = Mode::Normal;
        }
        return;
    }

    // Step 6: forward to the active pane's process.
    let (app_cursor, bpaste) = active_pane_modes;
    outcome.forward_to_pane.extend(translate_for_pane(key, app_cursor, bpaste));
}

/// Extract the `%%`-templated command out of a `command-prompt -p ...`
/// binding body, e.g. `,`'s rename-window binding.
fn parse_command_prompt_template(command: &str) -> Option<String> {
    if !command.starts_with("command-prompt") {
        return None;
    }
    let idx = command.find('"')?;
    let rest = &command[idx + 1..];
    let end = rest.find('"')?;
    let after_prompt = rest[end + 1..].trim_start();
    Some(after_prompt.to_string())
}

fn parse_confirm_template(command: &str) -> Option<String> {
    if !command.starts_with("confirm-before") {
        return None;
    }
    let idx = command.find('"')?;
    let rest = &command[idx + 1..];
    let end = rest.find('"')?;
    let after_prompt = rest[end + 1..].trim_start();
    Some(after_prompt.to_string())
}

/// Renderer-side mouse byte encoding (spec.md §4.A "Mouse encoding").
/// `pane_under_cursor`/title/status routing decisions are made by the
/// caller; this only formats the wire bytes for a click once a target
/// pane and its active encoding are known.
pub fn encode_mouse_event(encoding: crate::screen::MouseEncoding, button: u8, col: u16, row: u16, press: bool) -> Vec<u8> {
    match encoding {
        crate::screen::MouseEncoding::Sgr => {
            let ch = if press { 'M' } else { 'm' };
            format!("\x1b[<{};{};{}{}", button, col, row, ch).into_bytes()
        }
        crate::screen::MouseEncoding::Urxvt => {
            format!("\x1b[{};{};{}M", button + 32, col, row).into_bytes()
        }
        crate::screen::MouseEncoding::X10 | crate::screen::MouseEncoding::Utf8 => {
            if press {
                vec![0x1b, b'[', b'M', button.wrapping_add(32), (col as u8).saturating_add(32), (row as u8).saturating_add(32)]
            } else {
                vec![0x1b, b'[', b'M', 3u8.wrapping_add(32), (col as u8).saturating_add(32), (row as u8).saturating_add(32)]
            }
        }
    }
}

/// One decoded mouse report arriving in a client's raw input stream:
/// the attached real terminal's own SGR mouse-reporting mode (`CSI <
/// b ; c ; r M/m`), the same format this crate's own
/// `encode_mouse_event` emits toward a pane. `col`/`row` are converted
/// to 0-based here so callers never re-subtract the wire's 1-based
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseReport {
    pub button: u8,
    pub col: u16,
    pub row: u16,
    pub press: bool,
}

/// Pull every embedded SGR mouse report out of a raw input chunk
/// (spec.md §4.E "mouse events from a client"), returning them in
/// order alongside the remaining bytes with those sequences removed
/// so the ordinary key router never sees them.
pub fn extract_mouse_reports(bytes: &[u8]) -> (Vec<MouseReport>, Vec<u8>) {
    let mut reports = Vec::new();
    let mut rest = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'[') && bytes.get(i + 2) == Some(&b'<') {
            if let Some((report, consumed)) = parse_sgr_mouse(&bytes[i..]) {
                reports.push(report);
                i += consumed;
                continue;
            }
        }
        rest.push(bytes[i]);
        i += 1;
    }
    (reports, rest)
}

fn parse_sgr_mouse(bytes: &[u8]) -> Option<(MouseReport, usize)> {
    let end = bytes.iter().position(|&b| b == b'M' || b == b'm')?;
    let body = std::str::from_utf8(&bytes[3..end]).ok()?;
    let mut parts = body.split(';');
    let button: u8 = parts.next()?.parse().ok()?;
    let col: u16 = parts.next()?.parse().ok()?;
    let row: u16 = parts.next()?.parse().ok()?;
    let press = bytes[end] == b'M';
    Some((MouseReport { button, col: col.saturating_sub(1), row: row.saturating_sub(1), press }, end + 1))
}

/// Used by the renderer to decide whether a click targets the status
/// bar, a pane's title row, or the pane body itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    StatusBar,
    PaneTitle(PaneId),
    Pane(PaneId),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_csi_sequence_as_one_key() {
        let toks = tokenize_keys(b"\x1b[A");
        assert_eq!(toks, vec![&b"\x1b[A"[..]]);
    }

    #[test]
    fn tokenizes_plain_bytes_individually() {
        let toks = tokenize_keys(b"ab");
        assert_eq!(toks, vec![&b"a"[..], &b"b"[..]]);
    }

    #[test]
    fn prefix_then_split_binding_dispatches_command() {
        let mut state = ClientInputState::default();
        let out = route(&mut state, DEFAULT_PREFIX, DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert!(out.run_commands.is_empty());
        assert_eq!(state.mode, Mode::PrefixArmed);
        let out2 = route(&mut state, b"\"", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert_eq!(out2.run_commands, vec!["split-window -v".to_string()]);
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn unprefixed_key_forwards_to_pane_with_cr_translation() {
        let mut state = ClientInputState::default();
        let out = route(&mut state, b"\n", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert_eq!(out.forward_to_pane, b"\r");
    }

    #[test]
    fn application_cursor_mode_translates_arrow_to_ss3() {
        let mut state = ClientInputState::default();
        let out = route(&mut state, b"\x1b[A", DEFAULT_PREFIX, DEFAULT_BINDINGS, (true, false));
        assert_eq!(out.forward_to_pane, b"\x1bOA");
    }

    #[test]
    fn bracketed_paste_wraps_forwarded_bytes() {
        let mut state = ClientInputState::default();
        let out = route(&mut state, b"x", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, true));
        assert_eq!(out.forward_to_pane, b"\x1b[200~x\x1b[201~");
    }

    #[test]
    fn confirm_dialog_y_dispatches_and_clears() {
        let mut state = ClientInputState {
            mode: Mode::Confirm { command: "kill-pane".to_string() },
        };
        let out = route(&mut state, b"y", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert_eq!(out.run_commands, vec!["kill-pane".to_string()]);
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn confirm_dialog_n_clears_without_dispatch() {
        let mut state = ClientInputState {
            mode: Mode::Confirm { command: "kill-pane".to_string() },
        };
        let out = route(&mut state, b"n", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert!(out.run_commands.is_empty());
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn command_prompt_enter_submits_buffer() {
        let mut state = ClientInputState { mode: Mode::CommandPrompt { buffer: "kill-pane".to_string() } };
        let out = route(&mut state, b"\r", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert_eq!(out.run_commands, vec!["kill-pane".to_string()]);
    }

    #[test]
    fn digit_after_prefix_selects_window() {
        let mut state = ClientInputState { mode: Mode::PrefixArmed };
        let out = route(&mut state, b"3", DEFAULT_PREFIX, DEFAULT_BINDINGS, (false, false));
        assert_eq!(out.select_window_digit, Some(3));
    }
}
