//! Command-line interface for sns-toolbox.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// What the binary does once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run every command of a batch file.
    Commands(PathBuf),
    /// Send one command and print its output.
    Exec(String),
    /// Read commands from stdin, one per line.
    Terminal,
    /// Poll a monitor preset until interrupted.
    Monitor(String),
    /// Download a configuration backup.
    Backup(PathBuf),
    /// Download system information; defaults to `system_info_<name>`.
    SystemInfo(Option<PathBuf>),
    /// Decrypt a local backup file. Needs no connection.
    Decrypt(PathBuf),
}

impl Action {
    fn flag(&self) -> &'static str {
        match self {
            Self::Commands(_) => "--commands",
            Self::Exec(_) => "--exec",
            Self::Terminal => "--terminal",
            Self::Monitor(_) => "--monitor",
            Self::Backup(_) => "--backup",
            Self::SystemInfo(_) => "--system-info",
            Self::Decrypt(_) => "--decrypt",
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Appliance address.
    pub host: Option<String>,
    /// Appliance port.
    pub port: Option<u16>,
    /// Administrator account.
    pub user: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Named profile from the configuration file.
    pub profile: Option<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Selected action.
    pub action: Option<Action>,
    /// Where to write the batch report.
    pub report: Option<PathBuf>,
    /// Monitor interval in seconds.
    pub interval: Option<u64>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('u') | Long("user") => {
                result.user = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('P') | Long("profile") => {
                result.profile = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Short('f') | Long("commands") => {
                let path = parser.value()?.parse()?;
                set_action(&mut result, Action::Commands(path))?;
            }
            Short('e') | Long("exec") => {
                let command: String = parser.value()?.parse()?;
                if command.trim().is_empty() {
                    return Err(ArgsError::InvalidValue("exec", command));
                }
                set_action(&mut result, Action::Exec(command))?;
            }
            Short('t') | Long("terminal") => {
                set_action(&mut result, Action::Terminal)?;
            }
            Short('m') | Long("monitor") => {
                let name = parser.value()?.parse()?;
                set_action(&mut result, Action::Monitor(name))?;
            }
            Long("backup") => {
                let path = parser.value()?.parse()?;
                set_action(&mut result, Action::Backup(path))?;
            }
            Long("system-info") => {
                let path = match parser.optional_value() {
                    Some(value) => Some(value.parse()?),
                    None => None,
                };
                set_action(&mut result, Action::SystemInfo(path))?;
            }
            Long("decrypt") => {
                let path = parser.value()?.parse()?;
                set_action(&mut result, Action::Decrypt(path))?;
            }
            Long("report") => {
                result.report = Some(parser.value()?.parse()?);
            }
            Long("interval") => {
                let value: String = parser.value()?.parse()?;
                let secs = value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ArgsError::InvalidValue("interval", value))?;
                result.interval = Some(secs);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn set_action(args: &mut Args, action: Action) -> Result<(), ArgsError> {
    if let Some(existing) = &args.action {
        return Err(ArgsError::ConflictingActions(existing.flag(), action.flag()));
    }
    args.action = Some(action);
    Ok(())
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"sns-toolbox {version}
Command and session orchestrator for Stormshield SNS appliances

USAGE:
    sns-toolbox [OPTIONS] <ACTION>

OPTIONS:
    -H, --host <ADDR>       Appliance address
    -p, --port <PORT>       Appliance port [default: 443]
    -u, --user <NAME>       Administrator account [default: admin]
    -c, --config <FILE>     Path to configuration file (JSON)
    -P, --profile <NAME>    Use a saved connection profile
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --report <FILE>     Write the batch report (.json or text)
        --interval <SECS>   Monitor interval [default: 2]
    -h, --help              Print help
    -V, --version           Print version

ACTIONS:
    -f, --commands <FILE>   Run the commands listed in FILE, in order
    -e, --exec <COMMAND>    Send a single command and print its output
    -t, --terminal          Send commands read from stdin, one per line
                            ('history' lists recent commands, 'quit' leaves)
    -m, --monitor <NAME>    Poll a monitor preset (system, ipsec, interface, ...)
        --backup <FILE>     Download a full configuration backup
        --system-info[=FILE]
                            Download the system information dump
        --decrypt <FILE>    Decrypt a backup with the decbackup tool

ENVIRONMENT VARIABLES:
    SNS_TOOLBOX_HOST        Appliance address (overrides config)
    SNS_TOOLBOX_PORT        Appliance port (overrides config)
    SNS_TOOLBOX_USER        Administrator account (overrides config)
    SNS_TOOLBOX_PASSWORD    Password; prompted on stdin when unset
    SNS_TOOLBOX_LOG_LEVEL   Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Run a batch and save the report
    sns-toolbox -H 10.0.0.254 -f commands.txt --report report.json

    # One-off command
    sns-toolbox -H 10.0.0.254 -e "system ident"

    # Watch IPsec tunnels every 5 seconds
    sns-toolbox -P paris -m ipsec --interval 5

    # Backup, then decrypt locally
    sns-toolbox -H 10.0.0.254 --backup fw.na
    sns-toolbox --decrypt fw.na
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("sns-toolbox {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// More than one action flag.
    ConflictingActions(&'static str, &'static str),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::ConflictingActions(first, second) => {
                write!(f, "{} cannot be combined with {}", second, first)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
