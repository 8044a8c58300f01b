use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use sculpt::{
    AppError, OutputFmt, Tracker,
    import::import_exercises,
    models::Exercise,
    store::exercises,
    types::{ALLOWED_MUSCLES, ExerciseImport, emit},
    utils::print_columns,
};

use crate::cli::ExerciseCmd;

fn pretty_list(list: &[Exercise]) {
    println!("{}", "Exercises:".cyan().bold());
    if list.is_empty() {
        println!("{}", "  (no exercises found)".dimmed());
        return;
    }

    let idx_w = list.len().to_string().len();
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (i, ex) in list.iter().enumerate() {
        left.push(format!(
            " {} • {} ({})",
            format!("{:>idx_w$}", i + 1).yellow(),
            ex.name.bold(),
            ex.muscle_groups.join(", ").yellow()
        ));
        right.push(if ex.shared {
            "shared".dimmed().to_string()
        } else {
            "yours".green().to_string()
        });
    }
    print_columns(left, right, &"|".blue().to_string());
}

pub async fn handle(cmd: ExerciseCmd, tracker: &Tracker, fmt: OutputFmt) -> Result<()> {
    match cmd {
        ExerciseCmd::Add { name, muscle } => {
            let mut tx = tracker.pool().begin().await?;
            match exercises::create(&mut tx, tracker.user(), &name, &muscle).await {
                Ok(ex) => {
                    tx.commit().await?;
                    emit(fmt, &ex, || {
                        println!("{} Exercise \"{}\" added", "info:".blue().bold(), ex.name)
                    });
                }
                Err(AppError::Validation(errs)) if errs.get("name").is_some_and(|m| m.contains("already exists")) => {
                    tx.rollback().await?;
                    println!(
                        "{} Exercise \"{}\" already exists – use `ex list` to view all exercises",
                        "warning:".yellow().bold(),
                        name
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        ExerciseCmd::Import { file } => {
            let path = Path::new(&file);
            let toml_str = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Could not read file: `{file}`"))?;
            let list: ExerciseImport =
                toml::from_str(&toml_str).context("Failed to parse TOML: Expected `[[exercise]] entries`")?;

            if list.exercise.is_empty() {
                println!("{}", "warning: no [[exercise]] entries found".yellow().bold());
                return Ok(());
            }

            let mut tx = tracker.pool().begin().await?;
            let report = import_exercises(&mut tx, tracker.user(), &list).await?;
            tx.commit().await?;

            for name in &report.inserted {
                println!("{} `{}`", "ok:".green().bold(), name);
            }
            for (name, reason) in &report.skipped {
                println!("{} `{}` skipped – {}", "warning:".yellow().bold(), name, reason);
            }
            println!(
                "\n{} {} inserted, {} skipped",
                "Summary:".cyan().bold(),
                report.inserted.len(),
                report.skipped.len()
            );

            if report.skipped.iter().any(|(_, reason)| reason.contains("muscle_groups")) {
                let allowed = ALLOWED_MUSCLES.iter().copied().collect::<Vec<_>>().join(", ");
                println!();
                println!("{} {}", "Allowed muscles:".cyan().bold(), allowed);
                println!(
                    "{} Muscle names are case-insensitive (e.g. `chest` == `CHEST` == `Chest`)",
                    "Note:".blue().bold()
                );
            }
        }

        ExerciseCmd::List { query } => {
            let mut conn = tracker.pool().acquire().await?;
            let list = exercises::search(&mut conn, tracker.user(), query.as_deref().unwrap_or("")).await?;
            emit(fmt, &list, || pretty_list(&list));
        }

        ExerciseCmd::Delete { exercises: keys } => {
            let mut tx = tracker.pool().begin().await?;
            let mut found = Vec::with_capacity(keys.len());
            for key in &keys {
                match exercises::resolve(&mut *tx, tracker.user(), key).await {
                    Ok(ex) => found.push(ex),
                    Err(AppError::NotFound) => {
                        println!("{} no such exercise `{}`", "error:".red().bold(), key);
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            let ids: Vec<String> = found.iter().map(|e| e.id.clone()).collect();
            let deleted = exercises::delete_many(&mut tx, tracker.user(), &ids).await?;
            tx.commit().await?;

            let names = found.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(", ");
            emit(fmt, &serde_json::json!({ "deleted": deleted }), || {
                println!("{} deleted {}", "ok:".green().bold(), names)
            });
        }
    }
    Ok(())
}
