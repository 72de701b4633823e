use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOSTNAME: &str = "localhost";

#[derive(Debug, clap::Parser)]
#[command(name = "next", bin_name = "next", disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Starts the application in development mode
    Dev(DevArgs),
}

// clap's generated help flag is disabled so `-h`/`--help` can print the
// command's fixed help text instead of an auto-generated one.
#[derive(Debug, Clone, clap::Args)]
#[command(disable_help_flag = true)]
pub struct DevArgs {
    /// Directory of the application (defaults to the current directory)
    pub directory: Option<String>,

    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(short = 'H', long)]
    pub hostname: Option<String>,

    #[arg(short = 'h', long, action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

/// Options handed to the server bootstrap, built once per invocation.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub directory: PathBuf,
    pub dev_mode: bool,
    pub is_dev_command: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse_dev(argv: &[&str]) -> DevArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Dev(args) => args,
        }
    }

    #[test]
    fn dev_defaults() {
        let args = parse_dev(&["next", "dev"]);
        assert_eq!(args.directory, None);
        assert_eq!(args.port, 3000);
        assert_eq!(args.hostname, None);
        assert!(!args.help);
    }

    #[test]
    fn dev_accepts_directory_port_and_hostname() {
        let args = parse_dev(&["next", "dev", "my-app", "--port", "4000", "-H", "example.com"]);
        assert_eq!(args.directory.as_deref(), Some("my-app"));
        assert_eq!(args.port, 4000);
        assert_eq!(args.hostname.as_deref(), Some("example.com"));
    }

    #[test]
    fn short_port_alias() {
        let args = parse_dev(&["next", "dev", "-p", "8080"]);
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn help_flag_is_a_plain_boolean() {
        let args = parse_dev(&["next", "dev", "-h"]);
        assert!(args.help);
    }

    #[test]
    fn unknown_flags_are_usage_errors() {
        assert!(Cli::try_parse_from(["next", "dev", "--bogus"]).is_err());
    }

    #[test]
    fn non_numeric_port_is_a_usage_error() {
        assert!(Cli::try_parse_from(["next", "dev", "--port", "abc"]).is_err());
    }
}
