//! Argv parsing (spec.md §6). Hand-matched rather than built on an
//! arg-parsing crate, the way the teacher's own `cli.rs` walks `argv`
//! with a small state machine instead of reaching for `clap`.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Action {
    /// No subcommand: behaves like `attach` if a server is already
    /// running at the resolved socket path, otherwise like `standalone`.
    Default,
    Standalone,
    Server { log_file: Option<PathBuf> },
    Attach { detach_others: bool },
    ListSessions,
    /// `pymux <command...>`: forward a single command line to a running
    /// server's dispatcher without attaching a full client session.
    RunCommand(String),
}

#[derive(Debug, Clone)]
pub struct Cli {
    pub action: Action,
    pub socket_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("missing argument for {0}")]
    MissingArgument(String),
    #[error("unknown flag {0}")]
    UnknownFlag(String),
}

pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Cli, CliError> {
    let _argv0 = args.next();
    let mut socket_path = None;
    let mut rest: Vec<String> = Vec::new();
    let mut args = args.peekable();

    // Global -S <path> may appear before the subcommand.
    while let Some(arg) = args.peek() {
        if arg == "-S" {
            args.next();
            let path = args.next().ok_or_else(|| CliError::MissingArgument("-S".to_string()))?;
            socket_path = Some(PathBuf::from(path));
        } else {
            break;
        }
    }

    let subcommand = args.next();
    let action = match subcommand.as_deref() {
        None => Action::Default,
        Some("standalone") => Action::Standalone,
        Some("server") => {
            let mut log_file = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "-S" => {
                        let path = args.next().ok_or_else(|| CliError::MissingArgument("-S".to_string()))?;
                        socket_path = Some(PathBuf::from(path));
                    }
                    "--log" => {
                        let path = args.next().ok_or_else(|| CliError::MissingArgument("--log".to_string()))?;
                        log_file = Some(PathBuf::from(path));
                    }
                    other => return Err(CliError::UnknownFlag(other.to_string())),
                }
            }
            Action::Server { log_file }
        }
        Some("attach") => {
            let mut detach_others = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "-d" => detach_others = true,
                    "-S" => {
                        let path = args.next().ok_or_else(|| CliError::MissingArgument("-S".to_string()))?;
                        socket_path = Some(PathBuf::from(path));
                    }
                    other => return Err(CliError::UnknownFlag(other.to_string())),
                }
            }
            Action::Attach { detach_others }
        }
        Some("list-sessions") => Action::ListSessions,
        Some(first) => {
            rest.push(first.to_string());
            rest.extend(args);
            Action::RunCommand(rest.join(" "))
        }
    };

    Ok(Cli { action, socket_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> impl Iterator<Item = String> {
        std::iter::once("pymux".to_string()).chain(s.split_whitespace().map(str::to_string))
    }

    #[test]
    fn bare_invocation_is_default() {
        let cli = parse(argv("")).unwrap();
        assert!(matches!(cli.action, Action::Default));
    }

    #[test]
    fn server_parses_log_flag() {
        let cli = parse(argv("server --log /tmp/pymux.log")).unwrap();
        match cli.action {
            Action::Server { log_file } => assert_eq!(log_file, Some(PathBuf::from("/tmp/pymux.log"))),
            _ => panic!("expected Server"),
        }
    }

    #[test]
    fn attach_dash_d_sets_detach_others() {
        let cli = parse(argv("attach -d")).unwrap();
        assert!(matches!(cli.action, Action::Attach { detach_others: true }));
    }

    #[test]
    fn leading_socket_flag_applies_globally() {
        let cli = parse(argv("-S /tmp/foo list-sessions")).unwrap();
        assert_eq!(cli.socket_path, Some(PathBuf::from("/tmp/foo")));
        assert!(matches!(cli.action, Action::ListSessions));
    }

    #[test]
    fn unrecognized_subcommand_is_a_run_command() {
        let cli = parse(argv("split-window -h")).unwrap();
        match cli.action {
            Action::RunCommand(cmd) => assert_eq!(cmd, "split-window -h"),
            _ => panic!("expected RunCommand"),
        }
    }
}
