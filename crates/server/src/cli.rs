//! CLI argument parsing and subcommand dispatch.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use logwarden_core::{Config, JobName};
use logwarden_rules::CadenceTable;

use crate::startup::build_app_state;

/// Log monitoring scheduler, detector and issue tracker.
#[derive(Parser, Debug)]
#[command(name = "logwarden", version, about = "Log monitoring scheduler and issue tracker")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (and the minute tick loop unless disabled)
    Serve {
        /// Do not run the tick loop in this process
        #[arg(long)]
        no_tick: bool,
    },
    /// Run one scheduler tick and print the summary
    Tick {
        /// Evaluate the cadence at this instant instead of now (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Run a single job in-process and print its report
    Run {
        /// Job name, e.g. detect-issues
        job: JobName,
        /// JSON file passed as the job payload (analyze-e2e-results)
        #[arg(long)]
        payload: Option<PathBuf>,
    },
    /// List the jobs due at a given minute
    Due {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// List the next scheduled runs
    Upcoming {
        /// Number of runs to list
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn cadence(config: &Config) -> anyhow::Result<CadenceTable> {
    Ok(CadenceTable::standard(config.scheduler.offset()?)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run every subcommand except `serve`, which the caller owns.
pub async fn dispatch(config: Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve { .. } => anyhow::bail!("serve runs from main"),
        Command::Tick { at } => {
            let state = build_app_state(config).await?;
            let summary = state
                .dispatcher
                .tick(&state.cadence, at.unwrap_or_else(Utc::now))
                .await;
            print_json(&summary)
        }
        Command::Run { job, payload } => {
            let payload = match payload {
                Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(&path)?)?),
                None => None,
            };
            let state = build_app_state(config).await?;
            let report = state.jobs.run(job, payload, Utc::now()).await;
            print_json(&report)?;
            if !report.success {
                anyhow::bail!("{job} failed");
            }
            Ok(())
        }
        Command::Due { at } => {
            let table = cadence(&config)?;
            let at = at.unwrap_or_else(Utc::now);
            let due = table.due(at);
            if due.is_empty() {
                println!("{}: nothing due", at.to_rfc3339());
            }
            for job in due {
                println!("{job}");
            }
            Ok(())
        }
        Command::Upcoming { count, at } => {
            let table = cadence(&config)?;
            let offset = table.offset();
            for (when, job) in table.upcoming(at.unwrap_or_else(Utc::now), count) {
                println!("{}  {}", when.with_timezone(&offset).format("%Y-%m-%d %H:%M %:z"), job);
            }
            Ok(())
        }
    }
}
