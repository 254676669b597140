mod commands;
mod config;
mod remote;
mod render;
mod session;
mod utils;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::new::NewEventArgs;
use crate::config::ClientConfig;
use crate::session::Session;

#[derive(Parser)]
#[command(name = "rendezvous")]
#[command(about = "Browse events, manage invitations and join requests, and sync with the server")]
struct Cli {
    /// Log reconciliation and sync details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch events and requests from the server
    Sync,
    /// List cached events with your relationship to each
    Events {
        /// Include events that are over
        #[arg(long)]
        past: bool,
    },
    /// List cached invitations and join requests
    Requests {
        /// Only show requests still waiting for an answer
        #[arg(long)]
        pending: bool,
    },
    /// Show the dates an event takes place on
    Occurrences {
        event: String,

        /// Months either side of today
        #[arg(short, long)]
        months: Option<u32>,

        /// Show occurrences from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show occurrences until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Create an event you organize
    New {
        title: String,

        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Start time (HH:MM)
        #[arg(short, long)]
        time: Option<String>,

        /// Participant limit
        #[arg(short, long, default_value_t = 10)]
        max: u32,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        location: Option<String>,
    },
    /// Ask to join an event
    Join { event: String },
    /// Invite someone to an event you organize
    Invite { event: String, user: String },
    /// Answer an invitation or a join request
    Respond {
        request: String,

        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        accept: bool,

        #[arg(long)]
        reject: bool,
    },
    /// Withdraw your pending join request
    Cancel { event: String },
    /// Stop participating in an event
    Leave { event: String },
    /// Cancel an event you organize
    Delete { event: String },
    /// Apply push events read from stdin as newline-delimited JSON
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ClientConfig::load()?;
    let session = Session::open(&config)?;

    let result = run(&session, cli.command).await;

    // Local changes are kept even when the server refused the last step.
    session.save()?;
    result
}

async fn run(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Sync => commands::sync::run(session).await,
        Commands::Events { past } => commands::events::run(session, past),
        Commands::Requests { pending } => commands::requests::run(session, pending),
        Commands::Occurrences {
            event,
            months,
            from,
            to,
        } => commands::occurrences::run(session, &event, months, from.as_deref(), to.as_deref()),
        Commands::New {
            title,
            date,
            time,
            max,
            description,
            location,
        } => {
            let args = NewEventArgs {
                title,
                date: parse_date(&date)?,
                time: time.as_deref().map(parse_time).transpose()?,
                max,
                description,
                location,
            };
            commands::new::run(session, args).await
        }
        Commands::Join { event } => commands::membership::join(session, &event).await,
        Commands::Invite { event, user } => {
            commands::membership::invite(session, &event, &user).await
        }
        Commands::Respond {
            request,
            accept,
            reject,
        } => commands::membership::respond(session, &request, accept && !reject).await,
        Commands::Cancel { event } => commands::membership::cancel(session, &event).await,
        Commands::Leave { event } => commands::membership::leave(session, &event).await,
        Commands::Delete { event } => commands::delete::run(session, &event).await,
        Commands::Watch => commands::watch::run(session).await,
    }
}

/// `RUST_LOG` takes precedence; otherwise warnings only, or debug with `-v`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "rendezvous_core=debug,rendezvous=debug" } else { "warn" };
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .with_context(|| format!("Invalid time '{}', expected HH:MM", s))
}
