//! sns-toolbox binary entry point.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use sns_toolbox::batch::{BatchEvent, BatchRunner, Command, CommandBatch, Terminal, TerminalReply};
use sns_toolbox::cli::{self, Action, Args};
use sns_toolbox::config::{Config, PASSWORD_ENV};
use sns_toolbox::export::system_info_file_name;
use sns_toolbox::monitor::{Monitor, MonitorEvent, MonitorQuery, MonitorState};
use sns_toolbox::{logging, ExportCoordinator, SessionHandle, SessionManager};
use tokio::sync::mpsc;
use tracing::{info, warn};
use zeroize::Zeroizing;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Work to do once a session is open. Inputs are validated before the
/// password prompt.
enum Job {
    Batch(CommandBatch),
    Exec(Command),
    Terminal,
    Monitor(MonitorQuery),
    Backup(PathBuf),
    SystemInfo(Option<PathBuf>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'sns-toolbox --help' for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if logging::init_with_filter(config.log_filter()).is_err() {
        eprintln!("warning: logging already initialized");
    }
    info!("sns-toolbox v{}", env!("CARGO_PKG_VERSION"));

    match run(&args, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: &Config) -> Result<ExitCode, BoxError> {
    let Some(action) = args.action.clone() else {
        cli::print_help();
        return Ok(ExitCode::from(2));
    };

    let job = match action {
        Action::Decrypt(source) => return run_decrypt(&source, config).await,
        Action::Commands(path) => Job::Batch(CommandBatch::from_file(&path)?),
        Action::Exec(text) => Job::Exec(Command::new(text)),
        Action::Terminal => Job::Terminal,
        Action::Monitor(name) => Job::Monitor(MonitorQuery::preset(&name)),
        Action::Backup(path) => Job::Backup(path),
        Action::SystemInfo(path) => Job::SystemInfo(path),
    };

    let password = read_password().await?;
    let params = config.connect_params(&password)?;
    let manager = SessionManager::new(Arc::new(config.connector()), config.session_options());
    let session = manager.connect(params).await?;

    for warning in session.active_user_warnings() {
        eprintln!("warning: {}", warning);
    }

    let result = match job {
        Job::Batch(batch) => run_batch(&session, batch, args.report.as_deref()).await,
        Job::Exec(command) => run_exec(&session, &command).await,
        Job::Terminal => run_terminal(&session).await,
        Job::Monitor(query) => run_monitor(&session, query, config).await,
        Job::Backup(path) => run_backup(&session, &path, config).await,
        Job::SystemInfo(path) => run_system_info(&session, path, config).await,
    };

    manager.disconnect().await;
    result
}

async fn run_decrypt(source: &Path, config: &Config) -> Result<ExitCode, BoxError> {
    let outcome = config.decryptor()?.decrypt(source).await?;
    println!(
        "Decrypted {} into {}",
        outcome.source.display(),
        outcome.output_dir.display()
    );
    Ok(ExitCode::SUCCESS)
}

async fn read_password() -> Result<Zeroizing<String>, BoxError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }

    let password = tokio::task::spawn_blocking(|| -> std::io::Result<Zeroizing<String>> {
        eprint!("Password: ");
        std::io::stderr().flush()?;
        let mut line = Zeroizing::new(String::new());
        std::io::stdin().read_line(&mut line)?;
        Ok(Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string()))
    })
    .await??;
    Ok(password)
}

async fn run_batch(
    session: &Arc<SessionHandle>,
    batch: CommandBatch,
    report: Option<&Path>,
) -> Result<ExitCode, BoxError> {
    let (handle, mut events) = BatchRunner::new(Arc::clone(session)).spawn(batch)?;
    let cancel = handle.cancel_flag();

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(BatchEvent::CommandFinished(result)) => {
                    let mark = if result.succeeded { "ok" } else { "FAILED" };
                    eprintln!("[{}] {}", mark, result.command);
                }
                Some(BatchEvent::Progress { completed, total }) => {
                    eprintln!("{}/{}", completed, total);
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("interrupt received, cancelling batch");
                interrupted = true;
                cancel.cancel();
            }
        }
    }

    let outcome = handle.join().await?;
    println!("{}", outcome.render_text());

    if let Some(report) = report {
        outcome.write_report(report)?;
        info!(path = %report.display(), "report written");
    }

    if outcome.failed() > 0 || outcome.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_exec(session: &Arc<SessionHandle>, command: &Command) -> Result<ExitCode, BoxError> {
    let output = session.send(command).await?;
    println!("{}", output);
    Ok(ExitCode::SUCCESS)
}

async fn run_terminal(session: &Arc<SessionHandle>) -> Result<ExitCode, BoxError> {
    // Never joined: the process exits while this thread waits on stdin.
    let (tx, mut lines) = mpsc::channel::<String>(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut terminal = Terminal::new(Arc::clone(session));
    let mut failures = 0usize;
    eprintln!("connected to {} ('history' lists commands, 'quit' leaves)", session.host());

    while let Some(line) = lines.recv().await {
        match terminal.submit(&line).await {
            TerminalReply::Output(output) => println!("{}", output),
            TerminalReply::Failed(e) => {
                failures += 1;
                eprintln!("error: {}", e);
            }
            TerminalReply::History(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    println!("{:>3}  {}", i + 1, entry);
                }
            }
            TerminalReply::Quit => break,
            TerminalReply::Nothing => {}
        }
        if !session.state().is_connected() {
            eprintln!("session lost");
            return Ok(ExitCode::FAILURE);
        }
    }

    if failures > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn run_monitor(
    session: &Arc<SessionHandle>,
    query: MonitorQuery,
    config: &Config,
) -> Result<ExitCode, BoxError> {
    let (monitor, mut events) = Monitor::new(Arc::clone(session));
    let mut states = monitor.subscribe();
    monitor.start(query, config.monitor_interval()).await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(MonitorEvent::Updated { output, .. }) => {
                    println!("{}", output);
                    println!("{}", "-".repeat(80));
                }
                Some(MonitorEvent::Error { message, .. }) => eprintln!("error: {}", message),
                Some(MonitorEvent::Started { query }) => {
                    eprintln!("monitoring {} (Ctrl-C to stop)", query);
                }
                Some(MonitorEvent::Stopped { .. }) | None => break,
            },
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == MonitorState::Stopped {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                monitor.stop().await;
                break;
            }
        }
    }

    if session.state().is_connected() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("session lost");
        Ok(ExitCode::FAILURE)
    }
}

async fn run_backup(
    session: &Arc<SessionHandle>,
    path: &Path,
    config: &Config,
) -> Result<ExitCode, BoxError> {
    let exports = ExportCoordinator::new(Arc::clone(session), config.decryptor()?);
    let task = exports.export_backup(path).await?;
    println!(
        "Backup written to {} ({} bytes)",
        task.destination.display(),
        task.bytes_written
    );
    Ok(ExitCode::SUCCESS)
}

async fn run_system_info(
    session: &Arc<SessionHandle>,
    path: Option<PathBuf>,
    config: &Config,
) -> Result<ExitCode, BoxError> {
    let exports = ExportCoordinator::new(Arc::clone(session), config.decryptor()?);
    let path = match path {
        Some(path) => path,
        None => PathBuf::from(system_info_file_name(&exports.system_name().await?)),
    };
    let task = exports.export_system_info(&path).await?;
    println!(
        "System information written to {} ({} bytes)",
        task.destination.display(),
        task.bytes_written
    );
    Ok(ExitCode::SUCCESS)
}
