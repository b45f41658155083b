//! Pipeline CLI: run the scrape pipeline for a date, a range, or on a
//! daily schedule, without the HTTP server.

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use metal_albums_backend::{build_state, AppConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pipeline", about = "Daily album scrape pipeline")]
struct Cli {
    /// Run once for a specific date (DD-MM-YYYY)
    #[arg(long, value_parser = parse_cli_date)]
    date: Option<NaiveDate>,

    /// Start of a date range (DD-MM-YYYY); requires --end-date
    #[arg(long, value_parser = parse_cli_date)]
    start_date: Option<NaiveDate>,

    /// End of a date range (DD-MM-YYYY); requires --start-date
    #[arg(long, value_parser = parse_cli_date)]
    end_date: Option<NaiveDate>,

    /// Run once for yesterday's date
    #[arg(long)]
    yesterday: bool,

    /// Run once for today's date
    #[arg(long)]
    today: bool,

    /// Run as a continuous daily scheduler
    #[arg(long)]
    scheduler: bool,

    /// Daily execution time for the scheduler (HH:MM)
    #[arg(long, default_value = "02:00")]
    time: String,

    /// Skip downloading album covers
    #[arg(long)]
    no_covers: bool,

    /// Show what would be done without executing
    #[arg(long)]
    dry_run: bool,
}

fn parse_cli_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .map_err(|_| format!("Invalid date: {} (expected DD-MM-YYYY)", raw))
}

enum Mode {
    Single(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Scheduler(NaiveTime),
}

fn resolve_mode(cli: &Cli) -> Result<Mode, String> {
    let manual_modes = [
        cli.date.is_some(),
        cli.start_date.is_some() || cli.end_date.is_some(),
        cli.yesterday,
        cli.today,
    ];
    if manual_modes.iter().filter(|m| **m).count() > 1 {
        return Err("Please specify only one execution mode".to_string());
    }

    if let Some(date) = cli.date {
        return Ok(Mode::Single(date));
    }
    if cli.start_date.is_some() || cli.end_date.is_some() {
        let (Some(start), Some(end)) = (cli.start_date, cli.end_date) else {
            return Err("Both --start-date and --end-date are required for a range".to_string());
        };
        if start > end {
            return Err("Start date must be before or equal to end date".to_string());
        }
        return Ok(Mode::Range(start, end));
    }
    if cli.yesterday {
        return Ok(Mode::Single(Utc::now().date_naive() - Duration::days(1)));
    }
    if cli.today {
        return Ok(Mode::Single(Utc::now().date_naive()));
    }

    let at = NaiveTime::parse_from_str(&cli.time, "%H:%M")
        .map_err(|_| format!("Invalid time format: {} (expected HH:MM)", cli.time))?;
    Ok(Mode::Scheduler(at))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metal_albums_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mode = match resolve_mode(&cli) {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };
    let with_covers = !cli.no_covers;

    if cli.dry_run {
        match mode {
            Mode::Single(date) => println!("DRY RUN: would process {}", date),
            Mode::Range(start, end) => {
                println!("DRY RUN: would process range {} to {}", start, end)
            }
            Mode::Scheduler(at) => println!("DRY RUN: would start scheduler, daily at {}", at),
        }
        return Ok(());
    }

    let state = build_state(AppConfig::from_env()?).await?;
    state.downloads.start_workers();

    let exit_code = match mode {
        Mode::Single(date) => {
            let result = state.orchestrator.run_for_date(date, with_covers).await?;
            if result.success {
                println!(
                    "SUCCESS: {} albums for {} in {:.1}s",
                    result.albums_scraped, date, result.duration_seconds
                );
                0
            } else {
                println!(
                    "FAILED: {} ({})",
                    date,
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
                1
            }
        }
        Mode::Range(start, end) => {
            let results = state.orchestrator.run_range(start, end, with_covers).await?;
            let successful = results.iter().filter(|r| r.success).count();
            println!("BATCH COMPLETE: {}/{} dates successful", successful, results.len());
            for failed in results.iter().filter(|r| !r.success) {
                println!("  failed: {}", failed.date);
            }
            if successful == results.len() {
                0
            } else {
                1
            }
        }
        Mode::Scheduler(at) => {
            state.orchestrator.run_daily_schedule(at, with_covers).await;
            0
        }
    };

    state.downloads.stop_workers().await;
    std::process::exit(exit_code);
}
