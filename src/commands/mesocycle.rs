use std::fs::read_to_string;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use sculpt::{
    AppError, OutputFmt, Tracker,
    calendar::default_rest_days,
    import::{self, PlanFile, PlanRejected},
    models::{Mesocycle, MesocycleState, TrainingDay, TrainingDayExercise},
    store::mesocycles::{self, NewMesocycle},
    types::emit,
    utils::{format_weight, parse_date, print_columns, today},
};

use crate::{cli::MesocycleCmd, commands::mesocycle_or_active};

#[derive(Serialize)]
struct MesoJson {
    idx: usize,
    #[serde(flatten)]
    mesocycle: Mesocycle,
}

#[derive(Serialize)]
struct PlanDayJson<'a> {
    #[serde(flatten)]
    day: &'a TrainingDay,
    exercises: &'a [TrainingDayExercise],
}

fn state_tag(state: MesocycleState) -> colored::ColoredString {
    match state {
        MesocycleState::Draft => "draft".dimmed(),
        MesocycleState::Active => "active".green().bold(),
        MesocycleState::Completed => "completed".blue(),
    }
}

fn pretty_list(rows: &[MesoJson]) {
    if rows.is_empty() {
        println!("{}", "  (no mesocycles found)".dimmed());
        return;
    }
    println!("{}", "Mesocycles:".cyan().bold());

    let idx_w = rows.iter().map(|r| r.idx.to_string().len()).max().unwrap_or(1);
    let mut left = Vec::new();
    let mut right = Vec::new();
    for r in rows {
        let m = &r.mesocycle;
        let goal = if m.goal.is_empty() {
            String::new()
        } else {
            format!("– {}", m.goal).dimmed().to_string()
        };
        left.push(format!(
            " {} • {} {}",
            format!("{:>idx_w$}", r.idx).yellow(),
            m.name.bold(),
            goal
        ));
        let started = m
            .start_date
            .map(|d| format!(", started {d}"))
            .unwrap_or_default();
        right.push(format!(
            "{} · {}w × {} days{}",
            state_tag(m.state),
            m.duration_in_weeks,
            m.training_days_per_week,
            started.dimmed()
        ));
    }
    print_columns(left, right, &"|".blue().to_string());
}

/// Template days with their exercises and set targets.
pub fn pretty_plan(meso: &Mesocycle, plan: &[(TrainingDay, Vec<TrainingDayExercise>)]) {
    println!(
        "{} {} ({})",
        "Mesocycle:".cyan().bold(),
        meso.name.bold(),
        state_tag(meso.state)
    );
    let rest = meso.rest_day_offsets();
    println!(
        "  {} weeks, {}-day microcycle, rest offsets: {}",
        meso.duration_in_weeks,
        meso.microcycle_length,
        if rest.is_empty() { "none".to_string() } else { meso.rest_days.replace(',', ", ") }
    );

    for (day, exercises) in plan {
        println!("\n{} {}", format!("Day {}", day.number).yellow().bold(), day.label.bold());
        if exercises.is_empty() {
            println!("{}", "  (no exercises)".dimmed());
        }
        print_exercises(exercises);
    }
}

pub fn print_exercises(exercises: &[TrainingDayExercise]) {
    for (i, ex) in exercises.iter().enumerate() {
        let connector = if i + 1 == exercises.len() { "└─" } else { "├─" };
        let notes = ex
            .notes
            .as_deref()
            .map(|n| format!(" – {n}").dimmed().to_string())
            .unwrap_or_default();
        let targets = ex
            .sets
            .iter()
            .map(|s| {
                let weight = s.weight.map(|w| format!(" @ {}kg", format_weight(w))).unwrap_or_default();
                format!("{}-{} RIR {}{}", s.rep_range_lower, s.rep_range_upper, s.rir, weight)
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {} {} {}{}",
            connector,
            format!("{}.", ex.number).yellow(),
            ex.exercise_name.bold(),
            notes
        );
        println!("       {} sets: {}", ex.sets.len(), targets.dimmed());
    }
}

pub async fn handle(cmd: MesocycleCmd, tracker: &Tracker, fmt: OutputFmt) -> Result<()> {
    match cmd {
        MesocycleCmd::New {
            name,
            weeks,
            days,
            goal,
            rest_days,
            labels,
        } => {
            let rest_days = if rest_days.is_empty() {
                default_rest_days(days)
            } else {
                rest_days
            };
            let meso = tracker
                .create_mesocycle(&NewMesocycle {
                    name,
                    goal,
                    duration_in_weeks: weeks,
                    training_days_per_week: days,
                    rest_days,
                    labels,
                })
                .await?;
            emit(fmt, &meso, || {
                println!("{} created draft `{}`", "ok:".green().bold(), meso.name);
                println!(
                    "{} add exercises with `sculpt plan add-ex \"{}\" <DAY> <EXERCISE>`",
                    "hint:".blue().bold(),
                    meso.name
                );
            });
        }

        MesocycleCmd::List => {
            let rows: Vec<MesoJson> = mesocycles::list(tracker.pool(), tracker.user())
                .await?
                .into_iter()
                .enumerate()
                .map(|(i, mesocycle)| MesoJson { idx: i + 1, mesocycle })
                .collect();
            emit(fmt, &rows, || pretty_list(&rows));
        }

        MesocycleCmd::Show { mesocycle } => {
            let meso = tracker.mesocycle(&mesocycle).await?;
            let plan = tracker.plan(&meso.id).await?;
            let json: Vec<PlanDayJson> = plan
                .iter()
                .map(|(day, exercises)| PlanDayJson { day, exercises })
                .collect();
            emit(fmt, &json, || pretty_plan(&meso, &plan));
        }

        MesocycleCmd::Import { files } => {
            if files.is_empty() {
                println!("{} no plan file provided", "warning:".yellow().bold());
            }
            for f in files {
                import_single_plan(tracker, &f).await?;
            }
        }

        MesocycleCmd::Start { mesocycle, date } => {
            let today = today();
            let start = match date {
                Some(d) => parse_date(&d, today)?,
                None => today,
            };
            let meso = tracker.mesocycle(&mesocycle).await?;
            let run = tracker.start(&meso.id, start).await?;
            let meso = tracker.mesocycle(&meso.id).await?;
            let end = meso.schedule().transpose()?.map(|s| s.end_date());
            emit(fmt, &run, || {
                if let Some(end) = end {
                    println!("  runs {} → {}", run.start_date, end);
                }
            });
        }

        MesocycleCmd::Stop { mesocycle } => {
            let meso = mesocycle_or_active(tracker, mesocycle.as_deref()).await?;
            let run = tracker.stop(&meso.id, today()).await?;
            emit(fmt, &run, || {
                if let Some(end) = run.end_date {
                    println!("  ran {} → {}", run.start_date, end);
                }
            });
        }

        MesocycleCmd::History { mesocycle } => {
            let meso = tracker.mesocycle(&mesocycle).await?;
            let runs = mesocycles::history(tracker.pool(), &meso.id).await?;
            emit(fmt, &runs, || {
                println!("{} {}", "Runs of".cyan().bold(), meso.name.bold());
                if runs.is_empty() {
                    println!("{}", "  (never started)".dimmed());
                }
                let mut left = Vec::new();
                let mut right = Vec::new();
                for run in &runs {
                    let end = match run.end_date {
                        Some(end) => end.to_string(),
                        None => "running".green().to_string(),
                    };
                    left.push(format!("  {} → {}", run.start_date, end));
                    right.push(format!("{}/{} days trained", run.days_completed, run.days_total));
                }
                print_columns(left, right, &"|".blue().to_string());
            });
        }
    }
    Ok(())
}

async fn import_single_plan(tracker: &Tracker, file: &str) -> Result<()> {
    let toml_str = match read_to_string(file) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("{} cannot open file `{}` – file not found", "error:".red().bold(), file);
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("reading `{file}`")),
    };
    let plan = PlanFile::parse(&toml_str).with_context(|| format!("parsing `{file}`"))?;

    let mut tx = tracker.pool().begin().await?;
    match import::import_plan(&mut tx, tracker.user(), &plan).await {
        Ok(meso) => {
            tx.commit().await?;
            println!("{} `{}`", "ok:".green().bold(), meso.name);
        }
        Err(PlanRejected::MissingExercises(missing)) => {
            tx.rollback().await?;
            println!(
                "{} cannot import plan `{}` – missing exercises: {}",
                "warning:".yellow().bold(),
                plan.name,
                missing.join(", ")
            );
        }
        Err(PlanRejected::Invalid(AppError::Validation(errs))) if errs.get("name").is_some() => {
            tx.rollback().await?;
            println!(
                "{} plan `{}` – {} – skipping",
                "warning:".yellow().bold(),
                plan.name,
                errs.get("name").unwrap_or_default()
            );
        }
        Err(PlanRejected::Invalid(e)) => {
            tx.rollback().await?;
            return Err(e).with_context(|| format!("importing `{file}`"));
        }
    }
    Ok(())
}
