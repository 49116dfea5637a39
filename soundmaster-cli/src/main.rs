mod cli;
mod error;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use soundmaster_adb::{AdbConfig, MdnsBrowser, ShellExecutor};
use soundmaster_core::models::shell::{get_play_audio, reports_denied, set_play_audio};
use soundmaster_core::{ApplicationId, ControlPlane, JsonFilePreferences, MediaKey};

use crate::cli::{Cli, Command, ConnectArgs, GlobalOpts, PlaybackMode};
use crate::error::CliError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let prefs = Arc::new(JsonFilePreferences::open(prefs_path(&cli.global)?)?);
    log::debug!("Preferences at {}", prefs.path().display());
    let config = load_config(cli.global.config.as_deref())?;
    let executor = ShellExecutor::new(config, prefs, Arc::new(MdnsBrowser::new()))?;

    match cli.command {
        Command::ImportKey { path } => {
            let bytes = std::fs::read(&path).map_err(|source| CliError::Read { path, source })?;
            executor.import_key(&bytes)?;
            println!("{}", executor.fingerprint());
            Ok(())
        }
        Command::Key => {
            println!("fingerprint: {}", executor.fingerprint());
            println!("{}", executor.public_key_text());
            Ok(())
        }
        Command::Discover { timeout } => discover(&executor, Duration::from_secs(timeout)),
        Command::Connect(args) => connect(&executor, &args),
        Command::Shell { command } => {
            let output = executor.execute(&command.join(" "))?;
            print!("{output}");
            Ok(())
        }
        Command::Playback { app, mode } => {
            let app = ApplicationId::parse(&app)?;
            let command = match mode {
                PlaybackMode::Allow => set_play_audio(&app, true),
                PlaybackMode::Deny => set_play_audio(&app, false),
                PlaybackMode::Query => {
                    let output = executor.execute(&get_play_audio(&app))?;
                    println!("{}", if reports_denied(&output) { "deny" } else { "allow" });
                    return Ok(());
                }
            };
            executor.execute(&command)?;
            Ok(())
        }
        Command::MediaKey { key } => {
            executor.execute(&MediaKey::from(key).command())?;
            Ok(())
        }
        Command::Status => {
            let connected = match executor.cached_port() {
                Some(port) => executor.connect(port),
                None => false,
            };
            let status = serde_json::json!({
                "set_up": executor.is_set_up(),
                "cached_port": executor.cached_port(),
                "connected": connected,
                "fingerprint": executor.fingerprint(),
            });
            println!("{}", serde_json::to_string_pretty(&status).map_err(|e| CliError::Config(e.to_string()))?);
            Ok(())
        }
        Command::Forget => {
            executor.clear_pairing()?;
            Ok(())
        }
    }
}

fn prefs_path(global: &GlobalOpts) -> Result<PathBuf, CliError> {
    if let Some(path) = &global.prefs {
        return Ok(path.clone());
    }
    dirs_next::config_dir()
        .map(|dir| dir.join("soundmaster").join("preferences.json"))
        .ok_or_else(|| CliError::Config("no config directory; pass --prefs".into()))
}

fn load_config(path: Option<&Path>) -> Result<AdbConfig, CliError> {
    let Some(path) = path else {
        return Ok(AdbConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AdbConfig = serde_json::from_str(&text).map_err(|e| CliError::Config(e.to_string()))?;
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

fn discover(executor: &ShellExecutor, timeout: Duration) -> Result<(), CliError> {
    let (tx, rx) = mpsc::channel();
    let handle = executor.discover_port(move |port| {
        let _ = tx.send(port);
    })?;

    let deadline = Instant::now() + timeout;
    let mut seen = BTreeSet::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(port) => {
                if seen.insert(port) {
                    println!("{port}");
                }
            }
            Err(_) => break,
        }
    }
    handle.stop();

    if seen.is_empty() {
        return Err(CliError::NotFound(format!(
            "no daemon found within {}s; was `adb tcpip` run on the device?",
            timeout.as_secs()
        )));
    }
    Ok(())
}

fn connect(executor: &ShellExecutor, args: &ConnectArgs) -> Result<(), CliError> {
    let connected = match args.port {
        Some(port) => executor.connect(port),
        None => {
            let handle = executor.auto_connect()?;
            let deadline = Instant::now() + Duration::from_secs(args.timeout);
            while !executor.is_connected() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(100));
            }
            handle.stop();
            executor.is_connected()
        }
    };

    if !connected {
        return Err(CliError::Connection(match args.port {
            Some(port) => format!("port {port} refused or rejected our key"),
            None => "no reachable daemon found".into(),
        }));
    }
    executor.mark_as_paired()?;
    if let Some(port) = executor.cached_port() {
        println!("connected on port {port}");
    }
    Ok(())
}
