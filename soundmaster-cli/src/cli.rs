//! Clap derive structures for the `soundmaster` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use soundmaster_core::MediaKey;

/// soundmaster -- drive the ADB control plane from a terminal
#[derive(Debug, Parser)]
#[command(
    name = "soundmaster",
    version,
    about = "Pair with adbd and run audio-permission commands",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Preference file (defaults to the platform config dir)
    #[arg(long, env = "SOUNDMASTER_PREFS", global = true)]
    pub prefs: Option<PathBuf>,

    /// JSON file with ADB settings (host, identity, timeouts)
    #[arg(long, env = "SOUNDMASTER_ADB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import an RSA private key (PKCS#8 or PKCS#1, PEM or DER)
    ImportKey {
        /// Path to the key file
        path: PathBuf,
    },

    /// Show the client key's fingerprint and public key
    Key,

    /// Browse for the daemon port and print candidates
    Discover {
        /// Seconds to browse before giving up
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Connect to the daemon and mark the device as paired
    Connect(ConnectArgs),

    /// Run a shell command on the device
    Shell {
        /// Command line, passed through verbatim
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Allow or deny an application's direct audio playback
    Playback {
        /// Application id, e.g. com.example.player
        app: String,
        #[arg(value_enum)]
        mode: PlaybackMode,
    },

    /// Send a media key event
    MediaKey {
        #[arg(value_enum)]
        key: MediaKeyArg,
    },

    /// Show pairing and connection status
    Status,

    /// Forget the pairing and the cached daemon port
    Forget,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Daemon port; discovered over mDNS when omitted
    pub port: Option<u16>,

    /// Seconds to wait for discovery to produce a connection
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PlaybackMode {
    Allow,
    Deny,
    /// Print the current mode
    Query,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MediaKeyArg {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
}

impl From<MediaKeyArg> for MediaKey {
    fn from(arg: MediaKeyArg) -> Self {
        match arg {
            MediaKeyArg::Play => Self::Play,
            MediaKeyArg::Pause => Self::Pause,
            MediaKeyArg::PlayPause => Self::PlayPause,
            MediaKeyArg::Stop => Self::Stop,
            MediaKeyArg::Next => Self::Next,
            MediaKeyArg::Previous => Self::Previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shell_keeps_hyphenated_arguments() {
        let cli = Cli::try_parse_from(["soundmaster", "shell", "pm", "list", "packages", "-3"]).unwrap();
        match cli.command {
            Command::Shell { command } => assert_eq!(command, ["pm", "list", "packages", "-3"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["soundmaster", "status", "-vv", "--prefs", "/tmp/p.json"]).unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.prefs, Some(PathBuf::from("/tmp/p.json")));
    }

    #[test]
    fn connect_port_is_optional() {
        let cli = Cli::try_parse_from(["soundmaster", "connect"]).unwrap();
        assert!(matches!(cli.command, Command::Connect(ConnectArgs { port: None, .. })));
        assert!(Cli::try_parse_from(["soundmaster", "connect", "70000"]).is_err());
    }
}
