//! CLI command definitions for the `inchat` binary.
//!
//! Uses clap derive macros for argument parsing. Account commands sit at the
//! top level; everything that acts on a channel lives under `inchat channel`.

pub mod account;
pub mod channel;

use clap::{Parser, Subcommand};

/// A small multi-user chat forum.
#[derive(Parser)]
#[command(name = "inchat", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter matching the verbosity flags.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,inchat=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and log in.
    Register {
        username: String,

        /// Password (prompted for when omitted).
        #[arg(long, env = "INCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log in to an existing account.
    Login {
        username: String,

        /// Password (prompted for when omitted).
        #[arg(long, env = "INCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the current session.
    Logout,

    /// Show the logged-in account and its channels.
    Whoami,

    /// Channel operations (create, join, post, watch, ...).
    #[command(alias = "ch")]
    Channel {
        #[command(subcommand)]
        action: channel::ChannelCommand,
    },
}
