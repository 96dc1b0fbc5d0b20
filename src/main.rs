//! Cadence - session orchestration for long-running device automation
//!
//! Runs interaction campaigns on an Android device in bounded sessions with
//! randomized limits, working hours and crash recovery.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use cadence::config::CampaignConfig;
use cadence::device::AdbDevice;
use cadence::jobs::JobRegistry;
use cadence::r#loop::{RunOutcome, SessionLoop};
use cadence::session::{Interrupts, SessionHistory, StdinResume};
use cadence::storage::lists::load_username_list;
use cadence::storage::InteractionStore;
use cadence::{logging, Account, AggregateStats, CadenceError, Result};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version)]
#[command(about = "Session orchestration for long-running device automation campaigns", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding one sub-directory per account
    #[arg(long, global = true, default_value = "accounts", env = "CADENCE_ACCOUNTS_DIR")]
    accounts_dir: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session loop for the account in a campaign configuration
    Run {
        /// Campaign configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show aggregate statistics over an account's sessions
    Report {
        /// Account username
        #[arg(short, long)]
        account: String,

        /// Only the most recent N sessions
        #[arg(short, long)]
        last: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit the interaction store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Show or validate a campaign configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Record counts by following status
    Stats {
        /// Account username
        #[arg(short, long)]
        account: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the users listed in a file (one per line) from the store
    Forget {
        /// Account username
        #[arg(short, long)]
        account: String,

        /// File with one username per line
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Campaign configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Campaign configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Process status for a numeric exit code.
fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            exit_status(e.exit_code())
        }
    }
}

/// Validate, then drive the session loop.
///
/// The run log guard lives in this frame, so the log file is flushed before
/// the process reports its status.
async fn run_campaign(accounts_dir: &Path, config_path: &Path, verbose: bool) -> Result<ExitCode> {
    let config = CampaignConfig::load(config_path)?;
    let report = config.validate();
    if !report.is_valid() {
        eprintln!("{}", report.verbose_report());
        return Ok(exit_status(report.exit_code()));
    }

    let account = config.account(accounts_dir);
    account.ensure_dir()?;
    let (writer, _log_guard) = logging::create_run_log_writer(&account.logs_dir())?;
    logging::init(verbose, Some(writer))?;

    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }

    let _lock = account.lock()?;
    let device = AdbDevice::new(&config.device, &config.app_id, config.device_id.clone())?;
    let jobs = JobRegistry::from_config(&config)?;

    let interrupts = Interrupts::new();
    let _listener = interrupts.listen();

    let mut session_loop = SessionLoop::new(
        config,
        account,
        Arc::new(device),
        jobs,
        interrupts,
        Arc::new(StdinResume),
    )?;

    let outcome = match session_loop.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            return Err(e);
        }
    };
    match outcome {
        RunOutcome::Completed => {
            println!("\n{} All sessions finished", "Done:".green().bold());
        }
        RunOutcome::Stopped(reason) => {
            tracing::info!("Run stopped: {}", reason);
            println!("\n{} {}", "Stopped:".yellow().bold(), reason);
        }
    }
    Ok(exit_status(outcome.exit_code()))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run { config } => {
            return run_campaign(&cli.accounts_dir, &config, cli.verbose).await;
        }

        Commands::Report {
            account,
            last,
            json,
        } => {
            logging::init(cli.verbose, None)?;
            let account = Account::new(&cli.accounts_dir, account);
            let history = SessionHistory::load(&account)?;
            let sessions = match last {
                Some(n) => history.last(n),
                None => history.sessions(),
            };
            let stats = AggregateStats::from_sessions(sessions);

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                stats.print(&format!("@{}", account.username()));
            }
        }

        Commands::Store { action } => {
            logging::init(cli.verbose, None)?;
            match action {
                StoreAction::Stats { account, json } => {
                    let account = Account::new(&cli.accounts_dir, account);
                    let store = InteractionStore::load(&account)?;
                    let stats = store.stats();

                    if json {
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    } else {
                        println!("\n{} @{}", "Store:".cyan().bold(), account.username());
                        println!("{}", "─".repeat(40));
                        println!("   Interacted users: {}", stats.total);
                        for (status, count) in &stats.by_status {
                            println!("   {}: {}", status, count);
                        }
                        println!("   Welcomed: {}", stats.welcomed);
                        println!("   Interacted in the last day: {}", stats.last_day);
                        println!(
                            "   Filter history: {} ({} skipped)",
                            stats.filtered, stats.skipped
                        );
                    }
                }

                StoreAction::Forget { account, file } => {
                    let account = Account::new(&cli.accounts_dir, account);
                    if !file.is_file() {
                        return Err(CadenceError::MissingFile { path: file });
                    }
                    let _lock = account.lock()?;
                    let mut usernames: Vec<String> = load_username_list(&file)?.into_iter().collect();
                    usernames.sort();

                    let mut store = InteractionStore::load(&account)?;
                    let removed = store.forget(&usernames)?;
                    println!(
                        "{} Removed {} of {} listed users",
                        "OK".green().bold(),
                        removed,
                        usernames.len()
                    );
                }
            }
        }

        Commands::Config { action } => {
            logging::init(cli.verbose, None)?;
            match action {
                ConfigAction::Show { config, json } => {
                    let config = CampaignConfig::load(&config)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&config)?);
                    } else {
                        println!("{}", config.to_toml()?);
                    }
                }

                ConfigAction::Validate { config: path } => {
                    let config = CampaignConfig::load(&path)?;
                    let report = config.validate();
                    if report.is_valid() {
                        println!("{} {} is valid", "OK".green().bold(), path.display());
                        if !report.warnings.is_empty() {
                            println!("{}", report.verbose_report());
                        }
                    } else {
                        eprintln!("{}", report.verbose_report());
                        return Ok(exit_status(report.exit_code()));
                    }
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
