use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::calendar::ViewMode;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

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
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "shukin",
    version,
    about = "Shukin: track collection events, participants and expenses",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List events with their totals.
    List,
    /// Show one event with participants, expenses and totals.
    Show { id: String },
    /// Create an event.
    Add {
        name: String,
        #[command(flatten)]
        fields: EventFields,
    },
    /// Change an event's fields.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: EventFields,
        #[arg(long = "clear-start")]
        clear_start: bool,
        #[arg(long = "clear-end")]
        clear_end: bool,
    },
    Delete { id: String },
    /// Move an event to a new position in the list (0-based).
    Move { id: String, index: usize },
    #[command(subcommand)]
    Participant(ParticipantCommand),
    #[command(subcommand)]
    Expense(ExpenseCommand),
    /// Draw the calendar (premium).
    Calendar {
        #[arg(long)]
        view: Option<ViewMode>,
        #[arg(long)]
        date: Option<String>,
        /// Steps to move from the reference date in units of the view.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i32,
    },
    Plan {
        #[command(subcommand)]
        action: Option<PlanCommand>,
    },
    /// Open a screen by path, e.g. `/events/<id>` or `/plans`.
    Open { path: String },
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommand>,
    },
    /// How to use shukin.
    Help,
    Version,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    #[arg(long)]
    pub description: Option<String>,
    /// Collection start (`today`, `+3d`, `2025-03-25`, `2025/3/25`).
    #[arg(long)]
    pub start: Option<String>,
    #[arg(long)]
    pub end: Option<String>,
    /// Creation date shown in the list.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ParticipantCommand {
    Add {
        event: String,
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        owed: f64,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    Edit {
        event: String,
        participant: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long = "clear-contact")]
        clear_contact: bool,
        #[arg(long, allow_negative_numbers = true)]
        owed: Option<f64>,
        /// Amount received so far; leaves the paid flag alone.
        #[arg(long, allow_negative_numbers = true)]
        paid: Option<f64>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long = "clear-due")]
        clear_due: bool,
    },
    /// Mark paid; the paid amount becomes the owed amount.
    Paid { event: String, participant: String },
    /// Mark unpaid; the paid amount is reset.
    Unpaid { event: String, participant: String },
    Remove { event: String, participant: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ExpenseCommand {
    Add {
        event: String,
        description: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
        #[arg(long)]
        remarks: Option<String>,
    },
    Edit {
        event: String,
        expense: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        amount: Option<f64>,
        #[arg(long)]
        remarks: Option<String>,
        #[arg(long = "clear-remarks")]
        clear_remarks: bool,
    },
    Paid { event: String, expense: String },
    Unpaid { event: String, expense: String },
    Remove { event: String, expense: String },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanCommand {
    Show,
    Upgrade,
    Downgrade,
    Restore,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeCommand {
    Show,
    Toggle,
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
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls `rc.key=value` and `rc.key:value` arguments out before clap sees them.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, ParticipantCommand, PlanCommand, preprocess_args};
    use crate::calendar::ViewMode;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "shukin",
            "rc.color=off",
            "list",
            "rc.calendar.stack_slots:5",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["shukin", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.calendar.stack_slots".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn no_subcommand_parses() {
        let cli = GlobalCli::try_parse_from(["shukin", "-vv"]).expect("parse");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn calendar_accepts_negative_offset() {
        let cli = GlobalCli::try_parse_from([
            "shukin", "calendar", "--view", "week", "--offset", "-2",
        ])
        .expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Calendar {
                view: Some(ViewMode::Week),
                date: None,
                offset: -2,
            })
        );
    }

    #[test]
    fn participant_add_requires_amount() {
        let err = GlobalCli::try_parse_from(["shukin", "participant", "add", "abcd", "Hanako"])
            .expect_err("missing --owed");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn nested_subcommands_and_global_flags() {
        let cli = GlobalCli::try_parse_from([
            "shukin",
            "participant",
            "add",
            "abcd",
            "Hanako",
            "--owed",
            "5000",
            "--rc",
            "color=off",
        ])
        .expect("parse");
        assert_eq!(cli.rc_overrides.len(), 1);
        assert!(matches!(
            cli.command,
            Some(Command::Participant(ParticipantCommand::Add { owed, .. })) if owed == 5000.0
        ));

        let cli = GlobalCli::try_parse_from(["shukin", "plan", "upgrade"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Plan {
                action: Some(PlanCommand::Upgrade)
            })
        );
    }
}
