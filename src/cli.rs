use std::io;
use std::path::{self, Path, PathBuf};

use owo_colors::OwoColorize;

use crate::config::{DEFAULT_HOSTNAME, DevArgs, StartOptions};
use crate::manifest;
use crate::startup::{self, StartServerError};

pub const DEV_HELP: &str = "
Description
  Starts the application in development mode (hot-code reloading, error
  reporting, etc)

Usage
  $ next dev <dir> -p <port number>

<dir> represents the directory of the application.
If no directory is provided, the current directory will be used.

Options
  --port, -p      A port number on which to start the application
  --hostname, -H  Hostname on which to start the application
  --help, -h      Displays this message
";

/// What the `dev` command decided; the entry point performs the actual
/// process exit so this stays callable from tests.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Fatal { code: i32, message: String },
}

pub async fn run_dev(args: DevArgs) -> Outcome {
    if args.help {
        println!("{DEV_HELP}");
        return Outcome::Done;
    }

    let dir = match resolve_project_dir(args.directory.as_deref()) {
        Ok(dir) => dir,
        Err(error) => {
            return Outcome::Fatal {
                code: 1,
                message: format!("failed to resolve the project directory: {error}"),
            };
        }
    };

    if !dir.exists() {
        return Outcome::Fatal {
            code: 1,
            message: format!(
                "> No such directory exists as the project root: {}",
                dir.display()
            ),
        };
    }

    let port = args.port;
    let app_url = app_url(args.hostname.as_deref(), port);

    // Announced before the bind is attempted, so this is optimistic.
    started_development_server(&app_url);

    let options = StartOptions {
        directory: dir.clone(),
        dev_mode: true,
        is_dev_command: true,
    };

    let served = match startup::start_server(options, port, args.hostname).await {
        Ok(app) => app.prepare().await,
        Err(error) => Err(error),
    };

    match served {
        Ok(()) => Outcome::Done,
        Err(error) => Outcome::Fatal {
            code: 1,
            message: bootstrap_failure_message(error, &dir),
        },
    }
}

fn started_development_server(app_url: &str) {
    println!(
        "{} - started development server at {}",
        "ready".green().bold(),
        app_url.cyan()
    );
}

fn app_url(hostname: Option<&str>, port: u16) -> String {
    format!("http://{}:{}", hostname.unwrap_or(DEFAULT_HOSTNAME), port)
}

/// Resolves the positional directory argument to an absolute path without
/// requiring it to exist; the existence check wants to print the resolved
/// path on failure.
fn resolve_project_dir(directory: Option<&str>) -> io::Result<PathBuf> {
    path::absolute(directory.unwrap_or("."))
}

fn bootstrap_failure_message(error: StartServerError, dir: &Path) -> String {
    match error {
        StartServerError::AddrInUse { port } => port_in_use_message(port, dir),
        StartServerError::Other(error) => format!("{error:#}"),
    }
}

fn port_in_use_message(port: u16, dir: &Path) -> String {
    let mut message = format!("Port {port} is already in use.");
    if let Some(script) = manifest::find_next_script(dir) {
        message.push_str(&format!(
            "\nUse `npm run {script} -- -p <some other port>`."
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("next_dev_cli_{name}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn help_text_mentions_dev_usage() {
        assert!(DEV_HELP.contains("next dev <dir>"));
    }

    #[test]
    fn app_url_defaults_to_localhost() {
        assert_eq!(app_url(None, 3000), "http://localhost:3000");
    }

    #[test]
    fn app_url_uses_the_port_flag() {
        assert_eq!(app_url(None, 4000), "http://localhost:4000");
    }

    #[test]
    fn app_url_uses_hostname_and_port() {
        assert_eq!(app_url(Some("example.com"), 80), "http://example.com:80");
    }

    #[test]
    fn project_dir_defaults_to_current_directory() {
        let resolved = resolve_project_dir(None).unwrap();
        assert_eq!(resolved, std::env::current_dir().unwrap());
    }

    #[test]
    fn relative_project_dir_becomes_absolute() {
        let resolved = resolve_project_dir(Some("some/app")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::env::current_dir().unwrap().join("some/app"));
    }

    #[tokio::test]
    async fn missing_directory_is_fatal_before_bootstrap() {
        let missing = scratch_dir("missing_root").join("definitely_not_here");
        let args = DevArgs {
            directory: Some(missing.to_string_lossy().into_owned()),
            port: 3000,
            hostname: None,
            help: false,
        };

        match run_dev(args).await {
            Outcome::Fatal { code, message } => {
                assert_eq!(code, 1);
                assert!(
                    message.starts_with("> No such directory exists as the project root:"),
                    "unexpected message: {message}"
                );
                assert!(message.contains("definitely_not_here"));
            }
            other => panic!("expected fatal outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn help_short_circuits_the_command() {
        let args = DevArgs {
            directory: None,
            port: 3000,
            hostname: None,
            help: true,
        };
        assert_eq!(run_dev(args).await, Outcome::Done);
    }

    #[test]
    fn port_in_use_message_includes_script_hint() {
        let dir = scratch_dir("hint");
        fs::write(
            dir.join("package.json"),
            r#"{ "name": "app", "scripts": { "dev": "next", "build": "next build" } }"#,
        )
        .unwrap();

        let message = port_in_use_message(3000, &dir);
        assert!(message.contains("Port 3000 is already in use."));
        assert!(message.contains("npm run dev -- -p <some other port>"));
    }

    #[test]
    fn port_in_use_message_without_matching_script() {
        let dir = scratch_dir("no_hint");
        fs::write(
            dir.join("package.json"),
            r#"{ "scripts": { "build": "tsc" } }"#,
        )
        .unwrap();

        assert_eq!(port_in_use_message(4000, &dir), "Port 4000 is already in use.");
    }

    #[test]
    fn other_failures_pass_through_verbatim() {
        let dir = scratch_dir("passthrough");
        let message =
            bootstrap_failure_message(StartServerError::Other(anyhow::anyhow!("boom")), &dir);
        assert_eq!(message, "boom");
    }
}
