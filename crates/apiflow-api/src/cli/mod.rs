//! CLI command definitions for the `apiflow` binary.
//!
//! Uses clap derive macros for argument parsing. Every command except
//! `completions` reads the server configuration and opens the database.

pub mod request;
pub mod snapshot;
pub mod token;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use apiflow_types::id::{ExampleId, FlowId, WorkspaceId};

/// API collections and request flows over a local SQLite store.
#[derive(Parser)]
#[command(name = "apiflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter directives used when `RUST_LOG` is unset.
    pub fn log_directives(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info,tower_http=info",
            1 => "debug,sqlx=info",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on; overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Write a workspace snapshot as JSON.
    Export {
        /// Workspace to export.
        #[arg(short, long)]
        workspace: WorkspaceId,

        /// Output file; stdout when omitted.
        #[arg(short, long = "out")]
        output: Option<PathBuf>,

        /// Restrict to these flows and their dependencies.
        #[arg(long = "flow")]
        flows: Vec<FlowId>,

        /// Restrict to these examples and their dependencies.
        #[arg(long = "example")]
        examples: Vec<ExampleId>,
    },

    /// Load a workspace snapshot.
    Import {
        /// Snapshot file.
        file: PathBuf,

        /// Assign fresh ids when the workspace already exists.
        #[arg(long)]
        remap: bool,

        /// Add this user (by email) as owner of the imported workspace.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Print a resolved example as a curl command line.
    Curl {
        /// Example to render.
        example: ExampleId,
    },

    /// Issue a session token, creating the user on first use.
    Token {
        /// User email.
        #[arg(long)]
        email: String,

        /// Display name for a new user; defaults to the email's local part.
        #[arg(long)]
        name: Option<String>,

        /// Token lifetime in hours.
        #[arg(long, default_value = "720")]
        ttl_hours: i64,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
