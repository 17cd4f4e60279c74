//! The single-threaded reactor (spec.md §4.G): one `calloop::EventLoop`
//! multiplexing PTY master fds, the listener socket, connected client
//! sockets, a 1 Hz timer and a SIGCHLD/SIGWINCH self-pipe. Grounded in
//! `karlb-termstack`'s `compositor::main` (a calloop loop registering a
//! Wayland backend fd, a timer and a signal source side by side) with
//! the Wayland-specific sources swapped for this crate's PTY/socket
//! ones.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::rc::Rc;
use std::time::Duration;

use calloop::generic::Generic;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, Mode, PostAction};
use tracing::{debug, error, info, warn};

use crate::arrangement::Rect;
use crate::engine::Engine;
use crate::error::ServerError;
use crate::ids::{ClientId, PaneId};
use crate::pane::Pane;
use crate::render::{self, Theme};
use crate::transport::{ClientMessage, FrameDecoder, ServerMessage};

/// Outbound bytes queued for a client exceed this many before we stop
/// buffering and drop the connection rather than let one slow client
/// back-pressure the whole server (spec.md §4.G backpressure note).
const WRITE_QUEUE_HIGH_WATER: usize = 8 * 1024 * 1024;

struct ClientConn {
    stream: UnixStream,
    decoder: FrameDecoder<ClientMessage>,
    write_queue: VecDeque<u8>,
    pending: Vec<ClientMessage>,
    closed: bool,
}

/// Shared reactor state. `RefCell`-wrapped because calloop callbacks
/// each take `&mut` independently; there is only ever one thread, so
/// this never actually contends.
pub struct State {
    pub engine: Engine,
    clients: HashMap<ClientId, ClientConn>,
    theme: Theme,
    pending_redraw: bool,
}

impl State {
    fn queue_write(&mut self, client: ClientId, bytes: &[u8]) {
        let Some(conn) = self.clients.get_mut(&client) else { return };
        if conn.write_queue.len() + bytes.len() > WRITE_QUEUE_HIGH_WATER {
            warn!(client = client.get(), "write queue exceeded high water mark, dropping client");
            conn.closed = true;
            return;
        }
        conn.write_queue.extend(bytes);
        flush_client(conn);
    }

    fn drop_closed_clients(&mut self) {
        let dead: Vec<ClientId> = self.clients.iter().filter(|(_, c)| c.closed).map(|(&id, _)| id).collect();
        for id in dead {
            self.clients.remove(&id);
            self.engine.detach_client(id);
        }
    }

    /// Render every attached client's frame and queue it for delivery.
    /// Called at most once per reactor iteration regardless of how many
    /// events fired (coalesced invalidation, spec.md §4.G).
    fn redraw_all(&mut self) {
        let time_str = chrono::Local::now().format("%H:%M:%S").to_string();
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        let client_sizes: HashMap<ClientId, (u16, u16)> = self.engine.clients.iter().map(|(&id, s)| (id, s.size)).collect();

        for client in ids {
            let Some(window_id) = self.engine.arrangement.active_window_for(client) else { continue };
            let Some((client_rows, client_cols)) = self.engine.clients.get(&client).map(|s| s.size) else { continue };
            let message = self.engine.clients.get(&client).and_then(|s| s.message.clone());

            let (shared_rows, shared_cols) = {
                let arrangement = &self.engine.arrangement;
                render::shared_content_size(window_id, arrangement, &client_sizes, |c| arrangement.active_window_for(c))
            };
            let content_area = Rect {
                x: 0,
                y: 0,
                width: shared_cols.min(client_cols),
                height: shared_rows.min(client_rows.saturating_sub(1)),
            };

            let rects = match self.engine.arrangement.window(window_id) {
                Some(window) => render::window_pane_rects(window, content_area),
                None => continue,
            };
            if let Some(session) = self.engine.clients.get_mut(&client) {
                session.last_rects = rects.clone();
            }
            self.engine.apply_pane_rects(&rects);

            let bytes = {
                let arrangement = &self.engine.arrangement;
                let Some(window) = arrangement.window(window_id) else { continue };
                let panes_ref: HashMap<PaneId, &Pane> = self.engine.panes.iter().map(|(&id, p)| (id, p)).collect();
                let frame = render::render_client(
                    client_rows,
                    client_cols,
                    window,
                    &panes_ref,
                    arrangement,
                    shared_rows,
                    shared_cols,
                    &time_str,
                    message.as_deref(),
                    &self.theme,
                );
                render::encode_frame(&frame)
            };

            let packet = match ServerMessage::Out(String::from_utf8_lossy(&bytes).into_owned()).encode() {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, "failed to encode frame");
                    continue;
                }
            };
            self.queue_write(client, &packet);
        }
    }
}

fn flush_client(conn: &mut ClientConn) {
    while !conn.write_queue.is_empty() {
        let (front, _) = conn.write_queue.as_slices();
        match conn.stream.write(front) {
            Ok(0) => {
                conn.closed = true;
                return;
            }
            Ok(n) => {
                conn.write_queue.drain(..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => {
                conn.closed = true;
                return;
            }
        }
    }
}

/// Register a self-pipe for SIGCHLD and SIGWINCH (spec.md §4.G); the
/// returned read end is registered as a `Generic` fd source by the
/// caller. Standalone mode additionally resizes the foreground pane on
/// SIGWINCH; server mode only reaps on SIGCHLD, since pane size is
/// driven by client `Size` packets instead.
fn install_signal_pipe() -> std::io::Result<UnixStream> {
    let (read_end, write_end) = UnixStream::pair()?;
    read_end.set_nonblocking(true)?;
    let write_for_chld = write_end.try_clone()?;
    signal_hook::low_level::pipe::register(signal_hook::consts::SIGCHLD, write_for_chld)?;
    signal_hook::low_level::pipe::register(signal_hook::consts::SIGWINCH, write_end)?;
    Ok(read_end)
}

/// Run the server reactor until the last window closes or the process
/// receives a fatal error. A listener-bind failure or a panic inside a
/// callback are the only conditions that tear the whole server down;
/// everything else (a bad pane, a disconnecting client) is handled
/// locally (spec.md §7).
pub fn run(engine: Engine, listener: UnixListener) -> Result<(), ServerError> {
    run_with(engine, Some(listener), None)
}

/// Run the reactor for `pymux standalone`/the combined default
/// invocation: engine and one attached client share the process, fed
/// by an already-connected socket pair instead of a listener (spec.md
/// §6 "Run engine + UI in one foreground process"). No listener means
/// no further client can ever attach, matching "no detach" — there is
/// nothing else to attach to.
pub fn run_standalone(engine: Engine, client_stream: UnixStream) -> Result<(), ServerError> {
    run_with(engine, None, Some(client_stream))
}

fn run_with(engine: Engine, listener: Option<UnixListener>, preconnected: Option<UnixStream>) -> Result<(), ServerError> {
    if let Some(l) = &listener {
        l.set_nonblocking(true).map_err(ServerError::Io)?;
    }
    let mut event_loop: EventLoop<'static, State> = EventLoop::try_new().map_err(|e| ServerError::Io(e.into()))?;
    let handle = event_loop.handle();

    let state = Rc::new(RefCell::new(State {
        engine,
        clients: HashMap::new(),
        theme: Theme::default(),
        pending_redraw: false,
    }));

    if let Some(stream) = preconnected {
        let _ = stream.set_nonblocking(true);
        let mut st = state.borrow_mut();
        let client_id = st.engine.attach_client(24, 80);
        st.clients.insert(
            client_id,
            ClientConn { stream, decoder: FrameDecoder::new(), write_queue: VecDeque::new(), pending: Vec::new(), closed: false },
        );
        info!(client = client_id.get(), "standalone client attached");
    }

    // Listener: accept new clients. Absent in standalone mode.
    if let Some(listener) = listener {
        let state = state.clone();
        let listener_fd = listener.as_raw_fd();
        let source = Generic::new(listener_fd, Interest::READ, Mode::Level);
        handle
            .insert_source(source, move |_, _, _| {
                loop {
                    match listener.accept() {
                        Ok((stream, _addr)) => {
                            let _ = stream.set_nonblocking(true);
                            let mut st = state.borrow_mut();
                            let client_id = st.engine.attach_client(24, 80);
                            st.clients.insert(
                                client_id,
                                ClientConn {
                                    stream,
                                    decoder: FrameDecoder::new(),
                                    write_queue: VecDeque::new(),
                                    pending: Vec::new(),
                                    closed: false,
                                },
                            );
                            info!(client = client_id.get(), "client connected");
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            })
            .map_err(|e| ServerError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;
    }

    // Signal self-pipe: reap terminated children, resize on SIGWINCH
    // in standalone mode (handled by the caller's own signal wiring
    // when not attached through the socket protocol).
    let sig_read = install_signal_pipe().map_err(ServerError::Io)?;
    {
        let state = state.clone();
        let fd = sig_read.as_raw_fd();
        let source = Generic::new(fd, Interest::READ, Mode::Level);
        handle
            .insert_source(source, move |_, _, _| {
                let mut buf = [0u8; 64];
                let mut sig_read = &sig_read;
                while sig_read.read(&mut buf).map(|n| n > 0).unwrap_or(false) {}
                let mut st = state.borrow_mut();
                let ids: Vec<PaneId> = st.engine.panes.keys().copied().collect();
                for id in ids {
                    if let Some(pane) = st.engine.panes.get_mut(&id) {
                        pane.try_reap();
                    }
                }
                st.pending_redraw = true;
                Ok(PostAction::Continue)
            })
            .map_err(|e| ServerError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;
    }

    // 1 Hz tick for the clock-mode pane and the status bar's time
    // display (spec.md §4.D "tick").
    {
        let state = state.clone();
        let timer = Timer::from_duration(Duration::from_secs(1));
        handle
            .insert_source(timer, move |_, _, _| {
                state.borrow_mut().pending_redraw = true;
                TimeoutAction::ToDuration(Duration::from_secs(1))
            })
            .map_err(|e| ServerError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;
    }

    // Drive the loop. Every iteration first pumps every pane's PTY
    // (cheap: non-blocking reads that return immediately with nothing
    // to do), then a client socket pass, then one coalesced redraw if
    // anything changed (spec.md §4.G).
    loop {
        // Pane PTYs are drained unconditionally every iteration rather
        // than through individual readiness sources: `Engine::pump`'s
        // non-blocking reads are cheap no-ops when a pane has nothing
        // new, and this sidesteps re-registering a `Generic` source
        // every time a split or new-window spawns another pane.
        event_loop
            .dispatch(Some(Duration::from_millis(250)), &mut *state.borrow_mut())
            .map_err(|e| ServerError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;

        let mut st = state.borrow_mut();
        for (_id, conn) in st.clients.iter_mut() {
            poll_client_socket(conn);
        }
        let pump_dirty = st.engine.pump();
        let bells = st.engine.drain_bells();
        if !bells.is_empty() {
            for pane in &bells {
                debug!(pane = pane.get(), "bell");
            }
            if st.engine.options.bell_action {
                if let Ok(packet) = ServerMessage::Out("\x07".to_string()).encode() {
                    let ids: Vec<ClientId> = st.clients.keys().copied().collect();
                    for client in ids {
                        st.queue_write(client, &packet);
                    }
                }
            }
        }
        drain_client_input(&mut st);
        deliver_control_messages(&mut st);
        if pump_dirty || std::mem::take(&mut st.pending_redraw) {
            st.redraw_all();
        }
        st.drop_closed_clients();
        if st.engine.is_empty() {
            info!("last window closed, shutting down");
            return Ok(());
        }
    }
}

fn poll_client_socket(conn: &mut ClientConn) {
    let mut buf = [0u8; 16384];
    loop {
        match conn.stream.read(&mut buf) {
            Ok(0) => {
                conn.closed = true;
                return;
            }
            Ok(n) => match conn.decoder.feed(&buf[..n]) {
                Ok(msgs) => conn.pending.extend(msgs),
                Err(e) => {
                    warn!(error = %e, "malformed client packet, dropping client");
                    conn.closed = true;
                    return;
                }
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => {
                conn.closed = true;
                return;
            }
        }
    }
}

/// Send queued `suspend`/`detach` control packets (spec.md §4.F). A
/// suspended client stays attached; a detached one is sent `detach`
/// and then torn down immediately, since nothing further should be
/// rendered to a connection the engine has already forgotten.
fn deliver_control_messages(st: &mut State) {
    for client in st.engine.drain_suspend_requests() {
        if let Ok(packet) = ServerMessage::Suspend.encode() {
            st.queue_write(client, &packet);
        }
    }
    for client in st.engine.drain_detach_requests() {
        if let Ok(packet) = ServerMessage::Detach.encode() {
            st.queue_write(client, &packet);
        }
        if let Some(conn) = st.clients.get_mut(&client) {
            conn.closed = true;
        }
        // `drop_closed_clients` picks this connection up later in the
        // same iteration and calls `Engine::detach_client` for it.
    }
}

fn drain_client_input(st: &mut State) {
    let ids: Vec<ClientId> = st.clients.keys().copied().collect();
    for client in ids {
        let msgs = match st.clients.get_mut(&client) {
            Some(conn) => std::mem::take(&mut conn.pending),
            None => continue,
        };
        for msg in msgs {
            match msg {
                ClientMessage::StartGui { detach_others } => {
                    if detach_others {
                        for other in st.engine.other_clients(client) {
                            st.engine.queue_detach(other);
                        }
                    }
                }
                ClientMessage::Size([rows, cols]) => st.engine.resize_client(client, rows, cols),
                ClientMessage::In(bytes) => st.engine.handle_client_input(client, bytes.as_bytes()),
                ClientMessage::RunCommand { command, .. } => {
                    if let Err(e) = st.engine.dispatch(client, &command) {
                        if let Some(session) = st.engine.clients.get_mut(&client) {
                            session.message = Some(format!("error: {}", e));
                        }
                        warn!(client = client.get(), command = %command, error = %e, "run-command failed");
                    }
                }
            }
        }
    }
}
