//! pymux: a terminal multiplexer split into a server process that owns
//! every pane's PTY and screen state, and dumb attach-mode clients that
//! forward keystrokes and paint whatever bytes the server sends back.

pub mod arrangement;
pub mod cell;
pub mod cli;
pub mod client;
pub mod engine;
pub mod error;
pub mod ids;
pub mod input;
pub mod pane;
pub mod process;
pub mod reactor;
pub mod render;
pub mod screen;
pub mod transport;
pub mod vtparse;
