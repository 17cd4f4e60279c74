//! End-to-end engine scenarios (spec.md §8) run against a real
//! `Engine` with real `/bin/sh` children under a PTY. These are
//! integration tests rather than `#[cfg(test)]` unit tests because
//! they exercise the full spawn -> pump -> screen pipeline instead of
//! one module in isolation, matching the top-level `tests/*.rs`
//! convention `karlb-termstack` uses for its own cross-module checks.

use std::thread::sleep;
use std::time::{Duration, Instant};

use pymux::arrangement::Rect;
use pymux::engine::{Engine, EngineOptions};
use pymux::ids::PaneId;

fn test_engine(dir: &std::path::Path) -> Engine {
    Engine::new(EngineOptions::default(), dir.join("sock").to_string_lossy().into_owned(), vec!["/bin/sh".to_string()])
}

/// Pump the engine until `pred` is satisfied or a short timeout
/// elapses, draining PTY output a child needs a moment to produce.
fn pump_until(engine: &mut Engine, pred: impl Fn(&Engine) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        engine.pump();
        if pred(engine) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(20));
    }
}

fn pane_text(engine: &Engine, pane: PaneId) -> String {
    let screen = &engine.panes.get(&pane).unwrap().screen;
    let mut out = String::new();
    for row in 0..screen.lines {
        let line = screen.display_line(row);
        for cell in &line.cells {
            out.push(cell.ch);
        }
        out.push('\n');
    }
    out
}

/// Skip PTY-spawning scenarios when no real shell is available (e.g. a
/// minimal sandbox with no `/bin/sh`), matching the existing `CI`-gated
/// unit tests in `engine.rs`.
fn shell_unavailable() -> bool {
    !std::path::Path::new("/bin/sh").exists() || std::env::var("CI").is_ok()
}

#[test]
fn split_and_route_delivers_input_to_new_pane_only() {
    if shell_unavailable() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let window_id = engine.new_window(None, dir.path(), 80, 24).unwrap();
    let client = engine.attach_client(24, 80);
    let original_pane = engine.active_pane(client).unwrap();

    engine.dispatch(client, "split-window -v").unwrap();
    assert_eq!(engine.active_window(client).unwrap().id, window_id);
    assert_eq!(engine.active_window(client).unwrap().pane_count(), 2);

    let new_pane = engine.active_pane(client).unwrap();
    assert_ne!(new_pane, original_pane);

    engine.handle_client_input(client, b"echo hi\n");
    let saw_output = pump_until(&mut engine, |e| pane_text(e, new_pane).contains("hi"));
    assert!(saw_output, "expected the new pane to show the echoed text");
    assert!(!pane_text(&engine, original_pane).contains("hi"), "original pane should not see the other pane's input");
}

#[test]
fn layout_cycle_visits_all_five_tags_and_returns() {
    if shell_unavailable() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    engine.new_window(None, dir.path(), 80, 24).unwrap();
    let client = engine.attach_client(24, 80);
    for _ in 0..4 {
        engine.dispatch(client, "split-window -v").unwrap();
    }
    assert_eq!(engine.active_window(client).unwrap().pane_count(), 5);

    let first_panes: Vec<PaneId> = engine.active_window(client).unwrap().panes().into_iter().map(|(_, id)| id).collect();
    for _ in 0..5 {
        engine.dispatch(client, "next-layout").unwrap();
    }
    let panes_after_cycle: Vec<PaneId> = engine.active_window(client).unwrap().panes().into_iter().map(|(_, id)| id).collect();
    assert_eq!(
        first_panes.iter().collect::<std::collections::HashSet<_>>(),
        panes_after_cycle.iter().collect::<std::collections::HashSet<_>>(),
        "cycling through all five layouts must preserve pane identity"
    );
}

#[test]
fn kill_pane_terminates_the_child_process() {
    if shell_unavailable() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    engine.new_window(None, dir.path(), 80, 24).unwrap();
    let client = engine.attach_client(24, 80);
    let pane = engine.active_pane(client).unwrap();

    engine.dispatch(client, "kill-pane").unwrap();
    assert!(!engine.panes.contains_key(&pane));
    assert!(engine.arrangement.windows.is_empty());
    assert!(engine.is_empty());
}

#[test]
fn bell_is_reported_once_per_batch() {
    if shell_unavailable() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    engine.new_window(None, dir.path(), 80, 24).unwrap();
    let client = engine.attach_client(24, 80);
    let pane = engine.active_pane(client).unwrap();

    engine.handle_client_input(client, b"printf '\\a'\n");
    let rang = pump_until(&mut engine, |e| !e.panes.get(&pane).is_none());
    assert!(rang);
    // Drain whatever accumulated; a bell from the printf must show up
    // at least once even if pumping split it across iterations.
    let mut saw_bell = false;
    for _ in 0..50 {
        engine.pump();
        if !engine.drain_bells().is_empty() {
            saw_bell = true;
            break;
        }
        sleep(Duration::from_millis(20));
    }
    assert!(saw_bell, "expected at least one bell from the child's BEL byte");
}

/// Poll a pane's raw PTY master fd (non-blocking, per spec.md §4.B)
/// until `needle` appears in the accumulated bytes or a short timeout
/// elapses. Reads at this level rather than through `Pane::pump` /
/// `Screen` because the bytes under test are a mouse report the
/// emulator would otherwise consume as an (unrecognized) CSI command
/// instead of echoing back as visible text.
fn wait_for_bytes_on_fd(fd: std::os::fd::RawFd, needle: &[u8]) -> bool {
    let mut acc = Vec::new();
    let mut buf = [0u8; 256];
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            acc.extend_from_slice(&buf[..n as usize]);
            if acc.windows(needle.len()).any(|w| w == needle) {
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10));
    }
}

/// Scenario 5 (spec.md §8): with SGR mouse mode enabled in a pane,
/// a client click at (row=3, col=7) must be encoded and delivered to
/// that pane as `CSI < 0 ; 8 ; 4 M` (1-based coordinates) — and must
/// go through `handle_client_input`'s mouse-extraction path, not be
/// forwarded to the child verbatim as a key.
#[test]
fn mouse_click_on_active_pane_is_encoded_sgr_and_delivered() {
    if shell_unavailable() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    engine.new_window(None, dir.path(), 80, 24).unwrap();
    let client = engine.attach_client(24, 80);
    let pane_id = engine.active_pane(client).unwrap();

    // Normally set by the renderer each frame; a test has to seed it
    // itself so `handle_client_mouse`'s rectangle lookup succeeds.
    let rect = Rect { x: 0, y: 0, width: 80, height: 23 };
    if let Some(session) = engine.clients.get_mut(&client) {
        session.last_rects.insert(pane_id, rect);
    }

    // The child (e.g. vim) enables SGR mouse reporting by writing
    // DECSET 1000/1006 to its own terminal, which the emulator parses
    // the same way it parses any other output.
    engine.panes.get_mut(&pane_id).unwrap().screen.feed(b"\x1b[?1000h\x1b[?1006h");

    let fd = engine.panes.get(&pane_id).unwrap().raw_fd().unwrap();

    // Route it exactly the way the reactor would: as bytes embedded
    // in an `in` packet, not a direct `handle_client_mouse` call, so
    // this exercises `extract_mouse_reports`'s wiring into
    // `handle_client_input` rather than assuming it.
    engine.handle_client_input(client, b"\x1b[<0;8;4M");

    assert!(
        wait_for_bytes_on_fd(fd, b"\x1b[<0;8;4M"),
        "expected the pane to receive the re-encoded SGR mouse press report"
    );
}
