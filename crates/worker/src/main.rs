use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use stockbell_core::config::{EngineConfig, Settings};
use stockbell_core::scoring::AnalysisType;
use stockbell_core::time::TimeSlot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "stockbell_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score, classify and deliver one time slot.
    Run {
        /// Slot to run (e.g. morning_scan). Defaults to the latest slot due now (TST).
        #[arg(long)]
        slot: Option<TimeSlot>,

        /// Market as-of date (YYYY-MM-DD). Defaults to the latest TWSE business day.
        #[arg(long)]
        as_of_date: Option<String>,

        /// Overrides the slot's default weighting (short_term, long_term, mixed).
        #[arg(long)]
        analysis_type: Option<AnalysisType>,

        /// Read snapshots from this JSON feed instead of the HTTP provider.
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Analyse and persist, but print the report instead of delivering it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Send a liveness message unless one went out within the heartbeat interval.
    Heartbeat,

    /// Re-deliver notifications that every channel rejected earlier.
    RetryUndelivered {
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },

    /// Print the persisted delivery health as JSON.
    Status,
}

/// Analysis and delivery both succeeded, or there was nothing to do.
const EXIT_OK: u8 = 0;
/// Analysis or setup failed.
const EXIT_FAILED: u8 = 1;
/// Analysis succeeded but no channel accepted the notification.
const EXIT_DELIVERY_DEGRADED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = match parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(code) => return ExitCode::from(code),
    };

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(err) => {
            eprintln!("invalid settings: {err:#}");
            return ExitCode::from(EXIT_FAILED);
        }
    };
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let name = args.command.name();
    match dispatch(args.command, &settings).await {
        Ok(commands::Completion::Done) => ExitCode::from(EXIT_OK),
        Ok(commands::Completion::DeliveryDegraded) => ExitCode::from(EXIT_DELIVERY_DEGRADED),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(command = name, error = %format!("{err:#}"), "worker run failed");
            commands::notify_failure(&settings, name, &err).await;
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Parses the command line. Usage errors map to [`EXIT_FAILED`] so they never read as a
/// degraded delivery; `--help` exits cleanly.
fn parse_args<I, T>(argv: I) -> Result<Args, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|err| {
        // Nothing useful to do if stderr is gone.
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
            _ => EXIT_FAILED,
        }
    })
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Run { .. } => "run",
            Command::Heartbeat => "heartbeat",
            Command::RetryUndelivered { .. } => "retry-undelivered",
            Command::Status => "status",
        }
    }
}

async fn dispatch(command: Command, settings: &Settings) -> anyhow::Result<commands::Completion> {
    let config = EngineConfig::load_or_default(settings.config_path.as_deref())?;

    match command {
        Command::Run {
            slot,
            as_of_date,
            analysis_type,
            snapshots,
            dry_run,
        } => {
            commands::run(
                settings,
                &config,
                commands::RunArgs {
                    slot,
                    as_of_date,
                    analysis_type,
                    snapshots,
                    dry_run,
                },
            )
            .await
        }
        Command::Heartbeat => commands::heartbeat(settings, &config).await,
        Command::RetryUndelivered { max_retries } => {
            commands::retry_undelivered(settings, &config, max_retries).await
        }
        Command::Status => commands::status(settings, &config).await,
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_arguments_exit_as_failures() {
        assert_eq!(
            parse_args(["stockbell_worker", "run", "--slot", "lunch_scan"]).unwrap_err(),
            EXIT_FAILED
        );
        assert_eq!(parse_args(["stockbell_worker", "bogus"]).unwrap_err(), EXIT_FAILED);
        assert_eq!(parse_args(["stockbell_worker"]).unwrap_err(), EXIT_FAILED);
        assert_ne!(EXIT_FAILED, EXIT_DELIVERY_DEGRADED);
    }

    #[test]
    fn help_exits_cleanly() {
        assert_eq!(parse_args(["stockbell_worker", "--help"]).unwrap_err(), EXIT_OK);
    }

    #[test]
    fn run_arguments_parse() {
        let args = parse_args([
            "stockbell_worker",
            "run",
            "--slot",
            "morning_scan",
            "--analysis-type",
            "long_term",
            "--dry-run",
        ])
        .unwrap();
        match args.command {
            Command::Run {
                slot,
                analysis_type,
                dry_run,
                ..
            } => {
                assert_eq!(slot, Some(TimeSlot::MorningScan));
                assert_eq!(analysis_type, Some(AnalysisType::LongTerm));
                assert!(dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(
            parse_args(["stockbell_worker", "retry-undelivered"]).unwrap().command.name(),
            "retry-undelivered"
        );
    }
}
