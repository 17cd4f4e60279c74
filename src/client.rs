//! Attach-mode client (spec.md §4.F, §5): a dumb terminal. It holds no
//! engine state and does no local rendering — it puts the real
//! terminal into raw mode, forwards every byte of stdin to the server
//! as an `in` packet, and writes whatever `out` bytes come back
//! straight to stdout. `suspend` raises `SIGTSTP` on itself; `detach`
//! restores the terminal and exits cleanly.

use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};

use crate::transport::{ClientMessage, FrameDecoder, ServerMessage};

pub enum AttachOutcome {
    Detached,
    ServerClosed,
}

/// Connect to `socket_path` and run the attach loop on the current
/// terminal until the server sends `detach` or the connection drops.
pub fn run(socket_path: &std::path::Path, detach_others: bool) -> io::Result<AttachOutcome> {
    let stream = UnixStream::connect(socket_path)?;
    run_on_stream(stream, detach_others)
}

/// Same as `run`, but over an already-connected stream (used by
/// `pymux standalone`, which hands the client end of an in-process
/// socket pair instead of dialing a listener, spec.md §6).
pub fn run_on_stream(mut stream: UnixStream, detach_others: bool) -> io::Result<AttachOutcome> {
    enable_raw_mode()?;
    let outcome = attach_loop(&mut stream, detach_others);
    let _ = disable_raw_mode();
    outcome
}

/// Watch for SIGWINCH on a self-pipe and forward the client's new
/// terminal size as `size` packets (spec.md §4.F). Runs on its own
/// thread so the main loop's non-blocking socket poll doesn't have to
/// also poll a signal fd.
fn spawn_resize_watcher(tx: mpsc::Sender<(u16, u16)>) {
    use std::os::unix::net::UnixStream as SigStream;
    let Ok((mut read_end, write_end)) = SigStream::pair() else { return };
    if signal_hook::low_level::pipe::register(signal_hook::consts::SIGWINCH, write_end).is_err() {
        return;
    }
    thread::spawn(move || {
        let mut buf = [0u8; 64];
        loop {
            match read_end.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if let Ok((cols, rows)) = crossterm::terminal::size() {
                        if tx.send((rows, cols)).is_err() {
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

fn attach_loop(stream: &mut UnixStream, detach_others: bool) -> io::Result<AttachOutcome> {
    let (cols, rows) = crossterm::terminal::size()?;
    send(stream, &ClientMessage::StartGui { detach_others })?;
    send(stream, &ClientMessage::Size([rows, cols]))?;

    // A dedicated thread owns stdin: blocking reads there would
    // otherwise stall the socket-read loop below, and stdin has no
    // portable non-blocking mode on a tty.
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || {
        let mut stdin = io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>();
    spawn_resize_watcher(resize_tx);

    stream.set_nonblocking(true)?;
    let mut decoder: FrameDecoder<ServerMessage> = FrameDecoder::new();
    let mut stdout = io::stdout();
    let mut read_buf = [0u8; 65536];

    loop {
        while let Ok(chunk) = rx.try_recv() {
            send(stream, &ClientMessage::In(String::from_utf8_lossy(&chunk).into_owned()))?;
        }
        while let Ok((rows, cols)) = resize_rx.try_recv() {
            send(stream, &ClientMessage::Size([rows, cols]))?;
        }
        match stream.read(&mut read_buf) {
            Ok(0) => return Ok(AttachOutcome::ServerClosed),
            Ok(n) => {
                let msgs = decoder.feed(&read_buf[..n]).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
                for msg in msgs {
                    match msg {
                        ServerMessage::Out(text) => {
                            stdout.write_all(text.as_bytes())?;
                            stdout.flush()?;
                        }
                        ServerMessage::Suspend => raise_sigtstp(),
                        ServerMessage::Detach => {
                            info!("detached by server");
                            return Ok(AttachOutcome::Detached);
                        }
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn send(stream: &mut UnixStream, msg: &ClientMessage) -> io::Result<()> {
    let bytes = msg.encode().map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    match stream.write_all(&bytes) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(e),
    }
}

fn raise_sigtstp() {
    // SAFETY: raising a signal against our own process is always valid.
    unsafe {
        libc::raise(libc::SIGTSTP);
    }
    warn!("resumed from suspend");
}
