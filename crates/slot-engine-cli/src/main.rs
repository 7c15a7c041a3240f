//! `slots`: availability and appointment slots from a JSON scenario.
//!
//! A scenario bundles an appointment type, its resources, and the records a
//! store would hold:
//!
//! ```json
//! {
//!   "appointment": { "name": "consult", "timezone": "Europe/Brussels", "slots": [...] },
//!   "resources": [{ "id": "alice", "timezone": "Europe/Brussels" }],
//!   "store": { "templates": {...}, "leaves": [...], "events": {...} }
//! }
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use slot_engine::timezone::parse_rfc3339;
use slot_engine::{
    AppointmentType, AvailabilityEngine, InMemoryStore, IntervalSet, Resource,
    ResourceAvailability, SlotGenerator, Window, WorkHours, WorkSummary,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compute resource availability and bookable appointment slots
#[derive(Parser, Debug)]
#[command(name = "slots")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); logs go to stderr
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bookable slots, grouped by month, week, and day
    Slots {
        /// Scenario file (reads stdin when omitted)
        input: Option<PathBuf>,
        /// Timezone the slots are presented in
        #[arg(long, default_value = "UTC")]
        tz: String,
        /// Reference "now" as RFC 3339 (defaults to the current time)
        #[arg(long)]
        now: Option<String>,
        /// Party size every slot must seat
        #[arg(long, default_value_t = 1)]
        capacity: u32,
    },
    /// Work, leave, busy, and free intervals per resource
    Availability {
        /// Scenario file (reads stdin when omitted)
        input: Option<PathBuf>,
        /// Window start, RFC 3339
        #[arg(long)]
        from: String,
        /// Window end, RFC 3339
        #[arg(long)]
        to: String,
        /// Treat the whole window as working time
        #[arg(long)]
        ignore_work_hours: bool,
    },
}

#[derive(Debug, Deserialize)]
struct Scenario {
    appointment: Option<AppointmentType>,
    resources: Vec<Resource>,
    #[serde(default)]
    store: InMemoryStore,
}

#[derive(Serialize)]
struct AvailabilityReport<'a> {
    #[serde(flatten)]
    availability: &'a ResourceAvailability,
    unavailable: IntervalSet,
    summary: WorkSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = match &cli.command {
        Command::Slots {
            input,
            tz,
            now,
            capacity,
        } => {
            let scenario = load_scenario(input.as_deref())?;
            let Some(appointment) = &scenario.appointment else {
                bail!("scenario has no appointment type");
            };
            let now = match now {
                Some(s) => parse_rfc3339(s)?,
                None => Utc::now(),
            };
            info!(appointment = %appointment.name, %now, capacity, "computing slots");
            let grouped = SlotGenerator::new(appointment, &scenario.store)
                .asking(*capacity)
                .grouped(&scenario.resources, tz, now)
                .with_context(|| format!("computing slots for '{}'", appointment.name))?;
            to_json(&grouped, cli.pretty)?
        }
        Command::Availability {
            input,
            from,
            to,
            ignore_work_hours,
        } => {
            let scenario = load_scenario(input.as_deref())?;
            let window = Window::new(parse_rfc3339(from)?, parse_rfc3339(to)?);
            let mode = if *ignore_work_hours {
                WorkHours::Ignored
            } else {
                WorkHours::Enforced
            };
            let availability = AvailabilityEngine::new(&scenario.store)
                .compute(&scenario.resources, &window, mode)
                .context("computing availability")?;
            let reports: Vec<AvailabilityReport> = availability
                .iter()
                .map(|a| AvailabilityReport {
                    availability: a,
                    unavailable: a.unavailable(),
                    summary: a.work_summary(),
                })
                .collect();
            to_json(&reports, cli.pretty)?
        }
    };

    println!("{output}");
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_scenario(path: Option<&Path>) -> Result<Scenario> {
    let text = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading scenario from stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("parsing scenario JSON")
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
