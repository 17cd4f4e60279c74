//! Client/server wire protocol (spec §4.F): NUL-terminated JSON
//! packets over a Unix domain socket, tolerant of arbitrary chunking.
//!
//! Grounded in `karlb-termstack`'s `compositor::ipc` module (a
//! `serde`-tagged enum decoded off a `UnixStream`) but re-keyed from
//! that crate's newline-delimited framing to the NUL-delimited framing
//! spec.md §4.F specifies, with the same incremental-buffering shape
//! as `Tonksthebear-trybotster`'s `socket::framing::FrameDecoder`
//! (`feed(&[u8]) -> Vec<Packet>`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Largest single packet the decoder accepts before erroring out,
/// guarding against a misbehaving peer holding the buffer open
/// forever without ever sending a NUL terminator.
pub const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub cmd: String,
    pub data: T,
}

/// Client -> server packet tags (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartGui { #[serde(default)] detach_others: bool },
    Size([u16; 2]),
    In(String),
    RunCommand { command: String, #[serde(default)] pane_id: Option<usize> },
}

/// Server -> client packet tags (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Out(String),
    Suspend,
    Detach,
}

impl ServerMessage {
    /// Serialize to a single NUL-terminated wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(0);
        Ok(bytes)
    }
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(0);
        Ok(bytes)
    }
}

/// Buffers bytes across reads until a NUL terminator is seen, then
/// parses the preceding slice as UTF-8 JSON (spec §4.F "the reader
/// buffers bytes until a \x00 byte is seen"). Generic over the
/// direction so both client and server connections can reuse it.
pub struct FrameDecoder<T> {
    buf: Vec<u8>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Default for FrameDecoder<T> {
    fn default() -> Self {
        FrameDecoder { buf: Vec::new(), _marker: std::marker::PhantomData }
    }
}

impl<T: for<'de> Deserialize<'de>> FrameDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed freshly-read bytes in; returns every complete packet found
    /// so far, in order. A malformed packet surfaces as an `Err` for
    /// that one frame without discarding the rest of the buffer.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<T>, ProtocolError> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_PACKET_BYTES && !self.buf.contains(&0) {
            return Err(ProtocolError::TooLarge(self.buf.len()));
        }
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == 0) {
            let frame: Vec<u8> = self.buf.drain(..=pos).collect();
            let frame = &frame[..frame.len() - 1];
            let parsed: T = serde_json::from_slice(frame)?;
            out.push(parsed);
        }
        Ok(out)
    }
}

/// Bind a Unix listener at `<tmpdir>/pymux.sock.<user>.<N>`,
/// incrementing `N` on `EADDRINUSE` and giving up after 100 tries
/// (spec §4.F). Stale sockets from a crashed server are distinguished
/// from a live one by attempting to connect first; a refused
/// connection means it's safe to unlink and rebind.
pub fn bind_listener(tmpdir: &std::path::Path, user: &str) -> Result<(std::os::unix::net::UnixListener, PathBuf), crate::error::ServerError> {
    use std::os::unix::net::{UnixListener, UnixStream};

    const MAX_ATTEMPTS: u32 = 100;
    for n in 0..MAX_ATTEMPTS {
        let path = tmpdir.join(format!("pymux.sock.{}.{}", user, n));
        match UnixListener::bind(&path) {
            Ok(listener) => return Ok((listener, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if UnixStream::connect(&path).is_err() {
                    let _ = std::fs::remove_file(&path);
                    if let Ok(listener) = UnixListener::bind(&path) {
                        return Ok((listener, path));
                    }
                }
                continue;
            }
            Err(e) => return Err(crate::error::ServerError::Io(e)),
        }
    }
    Err(crate::error::ServerError::BindExhausted(MAX_ATTEMPTS))
}

/// Default socket directory: `$TMPDIR` or `/tmp`, matching the
/// teacher's own fallback in `session.rs`.
pub fn default_tmpdir() -> PathBuf {
    std::env::var_os("TMPDIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_handles_split_chunks() {
        let mut d: FrameDecoder<ClientMessage> = FrameDecoder::new();
        let full = ClientMessage::In("hi".to_string()).encode().unwrap();
        let (first, second) = full.split_at(full.len() / 2);
        assert!(d.feed(first).unwrap().is_empty());
        let msgs = d.feed(second).unwrap();
        assert_eq!(msgs.len(), 1);
        matches!(msgs[0], ClientMessage::In(ref s) if s == "hi");
    }

    #[test]
    fn decoder_handles_multiple_packets_in_one_chunk() {
        let mut d: FrameDecoder<ClientMessage> = FrameDecoder::new();
        let mut bytes = ClientMessage::Size([24, 80]).encode().unwrap();
        bytes.extend(ClientMessage::In("x".to_string()).encode().unwrap());
        let msgs = d.feed(&bytes).unwrap();
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn server_message_round_trips() {
        let msg = ServerMessage::Out("\x1b[Hhello".to_string());
        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.last(), Some(&0));
        let parsed: ServerMessage = serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap();
        matches!(parsed, ServerMessage::Out(ref s) if s == "\x1b[Hhello");
    }
}
