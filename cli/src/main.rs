mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_add, cmd_delete, cmd_done, cmd_edit, cmd_list, cmd_remote_clear, cmd_remote_set,
    cmd_remote_show, cmd_show, cmd_skip, cmd_status, cmd_sync,
};
use crate::config::Config;
use crate::remote::RemoteClient;
use ritual_core::service::HabitService;

#[derive(Parser)]
#[command(
    name = "ritual",
    version,
    about = "A simple habit tracker CLI",
    long_about = "\n\n  ██████╗ ██╗████████╗██╗   ██╗ █████╗ ██╗
  ██╔══██╗██║╚══██╔══╝██║   ██║██╔══██╗██║
  ██████╔╝██║   ██║   ██║   ██║███████║██║
  ██╔══██╗██║   ██║   ██║   ██║██╔══██║██║
  ██║  ██║██║   ██║   ╚██████╔╝██║  ██║███████╗
  ╚═╝  ╚═╝╚═╝   ╚═╝    ╚═════╝ ╚═╝  ╚═╝╚══════╝
        small steps, every day.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new habit
    Add {
        /// Habit name
        name: String,
        /// Display color (#RRGGBB, default: preset green)
        #[arg(short, long)]
        color: Option<String>,
        /// Daily reminder time (HH:MM, stored only)
        #[arg(long)]
        reminder: Option<String>,
        /// Sub-condition to track per day (repeatable, order matters)
        #[arg(short = 'C', long = "condition")]
        conditions: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List habits with today's status and streaks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a habit done for a day
    Done {
        /// Habit name, name prefix, or ID
        habit: String,
        /// Day to record (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Conditions met, as 1-based indices (e.g. "1,3")
        #[arg(long)]
        met: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a habit's completion for a day
    Skip {
        /// Habit name, name prefix, or ID
        habit: String,
        /// Day to clear (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one habit: conditions, streaks, and recent activity
    Show {
        /// Habit name, name prefix, or ID
        habit: String,
        /// How many days of activity to display
        #[arg(long, default_value = "30")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a habit (name, color, reminder, conditions)
    Edit {
        /// Habit name, name prefix, or ID
        habit: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New display color (#RRGGBB)
        #[arg(long)]
        color: Option<String>,
        /// New reminder time (HH:MM)
        #[arg(long)]
        reminder: Option<String>,
        /// Remove the reminder
        #[arg(long, conflicts_with = "reminder")]
        no_reminder: bool,
        /// Replacement condition list (repeatable, order matters)
        #[arg(short = 'C', long = "condition")]
        conditions: Vec<String>,
        /// Remove all conditions
        #[arg(long, conflicts_with = "conditions")]
        clear_conditions: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a habit and all of its history
    Delete {
        /// Habit name, name prefix, or ID
        habit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued offline entries to the remote server
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show remote reachability and the offline queue
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the remote server this device syncs against
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Set the remote server URL (and optionally its API key)
    Set {
        /// Server URL, e.g. http://192.168.1.10:8080
        url: String,
        /// API key the server printed on first start
        #[arg(long)]
        key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the configured remote
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the remote; the local database becomes authoritative
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn remote_client(config: &Config) -> Option<RemoteClient> {
    config
        .remote_url()
        .map(|url| RemoteClient::new(&url, config.remote_key()))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = HabitService::new(&config.db_path)?;

    match cli.command {
        Commands::Add {
            name,
            color,
            reminder,
            conditions,
            json,
        } => cmd_add(&svc, &name, color, reminder, conditions, json),
        Commands::List { json } => cmd_list(&svc, json),
        Commands::Done {
            habit,
            date,
            met,
            json,
        } => cmd_done(svc, remote_client(&config), &habit, date, met, json).await,
        Commands::Skip { habit, date, json } => {
            cmd_skip(svc, remote_client(&config), &habit, date, json).await
        }
        Commands::Show { habit, days, json } => cmd_show(&svc, &habit, days, json),
        Commands::Edit {
            habit,
            name,
            color,
            reminder,
            no_reminder,
            conditions,
            clear_conditions,
            json,
        } => cmd_edit(
            &svc,
            &habit,
            name,
            color,
            reminder,
            no_reminder,
            conditions,
            clear_conditions,
            json,
        ),
        Commands::Delete { habit, json } => cmd_delete(&svc, &habit, json),
        Commands::Sync { json } => cmd_sync(svc, &config, json).await,
        Commands::Status { json } => cmd_status(&svc, &config, json).await,
        Commands::Remote { command } => match command {
            RemoteCommands::Set { url, key, json } => cmd_remote_set(&config, &url, key, json),
            RemoteCommands::Show { json } => cmd_remote_show(&config, json),
            RemoteCommands::Clear { json } => cmd_remote_clear(&config, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}
