//! Error taxonomy for the session engine (spec §7).
//!
//! Each subsystem gets its own `thiserror` enum instead of raising and
//! catching; handlers return `Result` and the call site decides blast
//! radius (a bad client is detached, a bad pane is torn down, only a
//! listener-bind failure or a reactor panic is fatal).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to open pty: {0}")]
    OpenPty(#[source] std::io::Error),
    #[error("failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to resize pty: {0}")]
    Resize(#[source] std::io::Error),
    #[error("write to pty failed: {0}")]
    Write(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("unknown command tag: {0}")]
    UnknownTag(String),
    #[error("packet exceeds maximum size ({0} bytes)")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no such pane")]
    NoSuchPane,
    #[error("no such window")]
    NoSuchWindow,
    #[error("unrecognized command: {0}")]
    Unrecognized(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not bind listener socket after {0} attempts")]
    BindExhausted(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
