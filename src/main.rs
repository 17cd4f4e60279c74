//! Entry point: parses argv, then dispatches to the server reactor,
//! the attach-mode client, or a one-shot `list-sessions`/run-command
//! request against an already-running server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pymux::cli::{self, Action};
use pymux::client;
use pymux::engine::{Engine, EngineOptions};
use pymux::reactor;
use pymux::transport;

fn main() -> Result<()> {
    let cli = cli::parse(std::env::args()).context("parsing arguments")?;

    match cli.action {
        Action::Server { log_file } => {
            init_logging(log_file.as_deref());
            run_server(resolve_socket_path(cli.socket_path.as_deref()))
        }
        Action::Standalone => {
            // Standalone shares this process's stdout with the attach
            // client's raw terminal output; logging to stdout would
            // corrupt the display, so route it to stderr instead.
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
            run_standalone()
        }
        Action::Attach { detach_others } => {
            let socket_path = resolve_socket_path(cli.socket_path.as_deref());
            match client::run(&socket_path, detach_others)? {
                client::AttachOutcome::Detached => Ok(()),
                client::AttachOutcome::ServerClosed => {
                    anyhow::bail!("server closed the connection")
                }
            }
        }
        Action::ListSessions => list_sessions(resolve_socket_path(cli.socket_path.as_deref())),
        Action::RunCommand(command) => run_single_command(resolve_socket_path(cli.socket_path.as_deref()), &command),
        Action::Default => {
            let socket_path = resolve_socket_path(cli.socket_path.as_deref());
            if std::os::unix::net::UnixStream::connect(&socket_path).is_ok() {
                match client::run(&socket_path, false)? {
                    client::AttachOutcome::Detached => Ok(()),
                    client::AttachOutcome::ServerClosed => anyhow::bail!("server closed the connection"),
                }
            } else {
                run_combined(&socket_path)
            }
        }
    }
}

fn init_logging(log_file: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("pymux.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(appender).with_ansi(false).init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn resolve_socket_path(explicit: Option<&std::path::Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(env) = std::env::var("PYMUX") {
        if let Some(path) = env.split(',').next() {
            return PathBuf::from(path);
        }
    }
    transport::default_tmpdir().join(format!("pymux.sock.{}.0", transport::current_user()))
}

fn run_server(requested_path: PathBuf) -> Result<()> {
    let tmpdir = requested_path.parent().map(PathBuf::from).unwrap_or_else(transport::default_tmpdir);
    let user = transport::current_user();
    let (listener, path) = transport::bind_listener(&tmpdir, &user).context("binding listener socket")?;

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let mut engine = Engine::new(EngineOptions::default(), path.to_string_lossy().into_owned(), vec![shell]);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    engine.new_window(None, &cwd, 80, 23).context("spawning initial window")?;

    reactor::run(engine, listener).context("running reactor")?;
    let _ = std::fs::remove_file(&path);
    Ok(())
}

/// Standalone mode (spec.md §6: "Run engine + UI in one foreground
/// process (no detach)"): the reactor and the attach client share a
/// process, connected by an in-process socket pair instead of a
/// listener, so there is never anything else to attach to and no
/// socket file is left on disk (spec.md §6 "Persisted state: none").
fn run_standalone() -> Result<()> {
    use std::os::unix::net::UnixStream;

    let (server_side, client_side) = UnixStream::pair().context("creating standalone socket pair")?;
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let mut engine = Engine::new(EngineOptions::default(), String::new(), vec![shell]);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    engine.new_window(None, &cwd, cols, rows.saturating_sub(1)).context("spawning initial window")?;

    let server_thread = std::thread::spawn(move || reactor::run_standalone(engine, server_side));

    let outcome = client::run_on_stream(client_side, false);
    match server_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "standalone reactor exited with an error"),
        Err(_) => tracing::warn!("standalone reactor thread panicked"),
    }
    match outcome? {
        client::AttachOutcome::Detached | client::AttachOutcome::ServerClosed => Ok(()),
    }
}

/// `pymux` with no subcommand and no server reachable at the resolved
/// socket: fork a detached `pymux server` at that path and attach to
/// it once it starts listening (spec.md §6 "Start server (forked) +
/// attach one client (combined)").
fn run_combined(socket_path: &std::path::Path) -> Result<()> {
    let exe = std::env::current_exe().context("locating current executable")?;
    std::process::Command::new(exe)
        .arg("server")
        .arg("-S")
        .arg(socket_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("forking server process")?;

    // The forked server binds its listener before doing anything else
    // that could block, so a short connect-retry window is enough to
    // observe it come up without a second IPC channel for "ready".
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if let Ok(()) = std::os::unix::net::UnixStream::connect(socket_path).map(drop) {
            break;
        }
        if std::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for forked server to start");
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    match client::run(socket_path, false)? {
        client::AttachOutcome::Detached => Ok(()),
        client::AttachOutcome::ServerClosed => anyhow::bail!("server closed the connection"),
    }
}

fn list_sessions(socket_path: PathBuf) -> Result<()> {
    use std::io::{Read, Write};
    let mut stream = std::os::unix::net::UnixStream::connect(&socket_path).context("connecting to server")?;
    let msg = pymux::transport::ClientMessage::RunCommand { command: "list-windows".to_string(), pane_id: None };
    stream.write_all(&msg.encode()?)?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    print!("{}", String::from_utf8_lossy(&buf));
    Ok(())
}

fn run_single_command(socket_path: PathBuf, command: &str) -> Result<()> {
    use std::io::Write;
    let mut stream = std::os::unix::net::UnixStream::connect(&socket_path).context("connecting to server")?;
    let msg = pymux::transport::ClientMessage::RunCommand { command: command.to_string(), pane_id: None };
    stream.write_all(&msg.encode()?)?;
    Ok(())
}
