use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("override key cannot be empty: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "opn",
    version,
    about = "OPN Tasks: receive, complete and track volunteer donation tasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in with an identification number and display name
    Login {
        #[arg(long)]
        idn: String,
        #[arg(long = "name")]
        user_name: String,
    },
    /// Receive (or show) the current task
    Task,
    /// Mark the current task as done
    Complete {
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Give up the current task
    Cancel {
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// List completed tasks
    Completed,
    /// Show the volunteer ranking
    Ranking,
    /// Forget the stored session
    Logout {
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show who is logged in
    Whoami,
    /// Interactive session keeping all views in memory
    Shell,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login_with_global_overrides() {
        let cli = GlobalCli::try_parse_from([
            "opn",
            "-vv",
            "login",
            "--idn",
            "123",
            "--name",
            "Ana",
            "--rc",
            "api.url=http://localhost:5000",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Some(Command::Login {
                idn: "123".to_string(),
                user_name: "Ana".to_string(),
            })
        );
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "api.url");
        assert_eq!(cli.rc_overrides[0].value, "http://localhost:5000");
    }

    #[test]
    fn confirmation_flag_and_default_command() {
        let cli = GlobalCli::try_parse_from(["opn", "cancel", "-y"]).expect("parse");
        assert_eq!(cli.command, Some(Command::Cancel { yes: true }));

        let bare = GlobalCli::try_parse_from(["opn"]).expect("parse");
        assert_eq!(bare.command, None);
    }

    #[test]
    fn key_val_requires_separator() {
        assert!("api.url".parse::<KeyVal>().is_err());
        assert!("=x".parse::<KeyVal>().is_err());
    }
}
