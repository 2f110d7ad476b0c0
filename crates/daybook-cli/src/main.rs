mod cmd_queue;
mod cmd_report;
mod cmd_run;
mod cmd_serve;
mod cmd_trigger;
mod cmd_worker;
mod wiring;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daybook", version, about = "Daily commit reports for a tracked GitHub user")]
struct Cli {
    /// Config file (default: $DAYBOOK_CONFIG, then ./daybook.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides serve.bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port (overrides serve.port)
        #[arg(long)]
        port: Option<u16>,
        /// Also consume the queue in this process
        #[arg(long)]
        worker: bool,
        /// Also run the daily trigger from schedule.daily_at
        #[arg(long)]
        schedule: bool,
    },
    /// Consume the job queue until Ctrl-C
    Worker,
    /// Queue a report wave for a date
    Trigger {
        /// Report date, YYYY-MM-DD (default: today in schedule.utc_offset)
        #[arg(long)]
        date: Option<String>,
    },
    /// Build a report in a single process, without the shared store or queue
    Run {
        /// Report date, YYYY-MM-DD (default: today in schedule.utc_offset)
        #[arg(long)]
        date: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored report
    Report {
        /// Report date, YYYY-MM-DD
        date: String,
        /// Show the prose summary instead of the commit list
        #[arg(long)]
        summary: bool,
        /// Print the raw report JSON
        #[arg(long)]
        json: bool,
    },
    /// Show progress of a report wave
    Progress {
        /// Report date, YYYY-MM-DD
        date: String,
    },
    /// Show queue depth and dead-lettered jobs
    Queue,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config_path = wiring::config_path(cli.config, |key| std::env::var(key).ok());

    match cli.cmd {
        Command::Serve {
            bind,
            port,
            worker,
            schedule,
        } => cmd_serve::execute(&config_path, bind, port, worker, schedule),
        Command::Worker => cmd_worker::execute(&config_path),
        Command::Trigger { date } => cmd_trigger::execute(&config_path, date.as_deref()),
        Command::Run { date, json } => cmd_run::execute(&config_path, date.as_deref(), json),
        Command::Report {
            date,
            summary,
            json,
        } => cmd_report::execute(&config_path, &date, summary, json),
        Command::Progress { date } => cmd_report::progress(&config_path, &date),
        Command::Queue => cmd_queue::execute(&config_path),
    }
}
