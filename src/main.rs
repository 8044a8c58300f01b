use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use sculpt::{
    AppError, OutputFmt, Tracker,
    config::{Config, config_path},
    db, logging,
    notify::{Notification, NotificationKind},
};

use cli::{Cli, Commands};

mod cli;
mod commands;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let fmt = OutputFmt::from_flag(cli.json);
    let cfg_path = config_path()?;
    let cfg = Config::load(&cfg_path)?;
    logging::init(cfg.log_level());

    if let Commands::Config(cmd) = cli.cmd {
        return commands::config::handle(cmd, &cfg_path, cfg);
    }

    let db_path = cfg.db_path()?;
    assert!(!db_path.is_empty(), "database path must not be empty");
    let pool = db::open(&db_path).await?;
    let tracker = Tracker::new(pool, cfg.user());

    let res = match cli.cmd {
        Commands::Mesocycle(cmd) => commands::mesocycle::handle(cmd, &tracker, fmt).await,
        Commands::Plan(cmd) => commands::plan::handle(cmd, &tracker, fmt).await,
        Commands::Day(cmd) => commands::day::handle(cmd, &tracker, fmt).await,
        Commands::Calendar { mesocycle } => commands::calendar::handle(mesocycle, &tracker, fmt).await,
        Commands::Exercise(cmd) => commands::exercise::handle(cmd, &tracker, fmt).await,
        Commands::Config(_) => unreachable!("handled before opening the database"),
    };

    // A flashed message is shown once, after the command's own output. A
    // rejected action flashes the same text it fails with; print it once.
    if let Some(note) = tracker.take_notification().await? {
        let duplicate = res.as_ref().is_err_and(|e| e.to_string() == note.message);
        if !duplicate {
            print_notification(&note, fmt);
        }
    }
    res
}

fn print_notification(note: &Notification, fmt: OutputFmt) {
    let tag = match note.kind {
        NotificationKind::Success => "ok:".green().bold(),
        NotificationKind::Error => "error:".red().bold(),
    };
    // Stdout belongs to the JSON document.
    match fmt {
        OutputFmt::Json => eprintln!("{tag} {}", note.message),
        OutputFmt::Text => println!("{tag} {}", note.message),
    }
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<AppError>() {
        Some(AppError::Validation(errs)) => {
            for (field, msg) in errs.iter() {
                eprintln!("{} {}: {}", "error:".red().bold(), field.yellow(), msg);
            }
        }
        Some(AppError::Conflict { field, message }) => {
            eprintln!("{} {}: {}", "error:".red().bold(), field.yellow(), message);
        }
        Some(AppError::NotFound) => eprintln!("{} not found", "error:".red().bold()),
        _ => eprintln!("{} {e:#}", "error:".red().bold()),
    }
}
