use anyhow::Result;
use colored::Colorize;
use sculpt::{
    OutputFmt, Tracker,
    calendar::{OutOfRange, Resolution},
    progress::SetPerformance,
    session::{SessionState, TrainingDayState},
    tracker::{DayAction, DayView},
    types::emit,
    utils::{format_weight, parse_date, print_columns, today},
};

use crate::{
    cli::{DayArgs, DayCmd},
    commands::mesocycle_or_active,
};

fn state_line(view: &DayView) -> String {
    match view.session {
        SessionState::NotStarted => match view.resolution {
            Some(Resolution::OutOfRange(OutOfRange::BeforeStart { starts })) => {
                format!("The mesocycle starts on {starts}.").dimmed().to_string()
            }
            Some(Resolution::OutOfRange(OutOfRange::AfterEnd { ended })) => {
                format!("The mesocycle ended on {ended}.").dimmed().to_string()
            }
            _ => "No active mesocycle.".dimmed().to_string(),
        },
        SessionState::RestDay { .. } => "Rest day.".blue().to_string(),
        SessionState::MesocycleCompleted => "Mesocycle completed (read-only).".blue().to_string(),
        SessionState::TrainingDay { day, .. } => match day {
            TrainingDayState::Planned => "planned".dimmed().to_string(),
            TrainingDayState::InProgress => "in progress".yellow().to_string(),
            TrainingDayState::ReadyToFinish => "ready to finish".green().to_string(),
            TrainingDayState::Completed => "completed".green().bold().to_string(),
            TrainingDayState::CompletedEditable => "completed (editing)".yellow().bold().to_string(),
        },
    }
}

fn performance_tag(p: SetPerformance) -> String {
    match p {
        SetPerformance::Increased => "▲".green().to_string(),
        SetPerformance::Decreased => "▼".red().to_string(),
        SetPerformance::Same => "=".blue().to_string(),
        SetPerformance::NoData => String::new(),
    }
}

fn pretty_day(view: &DayView) {
    let mut header = format!("{}", view.date.format("%a %d %b %Y")).cyan().bold().to_string();
    if let Some(meso) = &view.mesocycle {
        header.push_str(&format!(" · {}", meso.name.bold()));
    }
    if let Some(day) = view.resolution.as_ref().and_then(Resolution::day) {
        header.push_str(&format!(" · week {} day {}", day.microcycle_number, day.day_number).dimmed().to_string());
    }
    println!("{header}");

    if let Some(day) = &view.day {
        let future = if view.is_future_session { " (upcoming)".dimmed().to_string() } else { String::new() };
        println!("{} {}{}", day.label.bold(), state_line(view), future);
    } else {
        println!("{}", state_line(view));
    }

    for ex in &view.exercises {
        let notes = ex
            .notes
            .as_deref()
            .map(|n| format!(" – {n}").dimmed().to_string())
            .unwrap_or_default();
        println!("\n {} {}{}", format!("{}.", ex.number).yellow(), ex.name.bold(), notes);

        let mut left = Vec::new();
        let mut right = Vec::new();
        for s in &ex.sets {
            let set = &s.set;
            let weight = set
                .weight
                .map(|w| format!("{}kg", format_weight(w)))
                .unwrap_or_else(|| "–".to_string());
            let done = if set.completed {
                format!("{} × {}", set.reps_completed.unwrap_or(0), weight).green().to_string()
            } else {
                format!("{weight} × …")
            };
            let hint = if s.should_increase_weight { " ↑ add weight".yellow().to_string() } else { String::new() };
            left.push(format!(
                "   {} {}-{} RIR {}  {} {}{}",
                format!("{}", set.number).yellow(),
                set.rep_range_lower,
                set.rep_range_upper,
                set.rir,
                done,
                performance_tag(s.performance),
                hint
            ));
            right.push(
                s.previous
                    .as_ref()
                    .filter(|p| p.completed)
                    .map(|p| {
                        let w = p.weight.map(format_weight).unwrap_or_else(|| "–".into());
                        format!("last {} × {}kg", p.reps_completed.unwrap_or(0), w).dimmed().to_string()
                    })
                    .unwrap_or_default(),
            );
        }
        print_columns(left, right, &"|".blue().to_string());
    }

    if let (Some(summary), true) = (view.summary, view.completed) {
        println!(
            "\n{} {} sets · {}kg lifted · {} progressions",
            "Summary:".cyan().bold(),
            summary.sets,
            format_weight(summary.weight_lifted),
            summary.progressions
        );
    }
    if let Some(feedback) = view.day.as_ref().and_then(|d| d.feedback.as_deref()) {
        println!("{} {}", "Feedback:".cyan().bold(), feedback);
    }
    if view.can_finish && !view.completed {
        println!("\n{} finish with `sculpt day finish`", "hint:".blue().bold());
    }
}

fn split(cmd: DayCmd) -> (DayArgs, Option<DayAction>) {
    match cmd {
        DayCmd::Show { at } => (at, None),
        DayCmd::AddSet { exercise, at } => (at, Some(DayAction::AddSet { exercise })),
        DayCmd::RemoveSet { exercise, set, at } => (at, Some(DayAction::RemoveSet { exercise, set })),
        DayCmd::UpdateSet {
            exercise,
            set,
            targets,
            at,
        } => (
            at,
            Some(DayAction::UpdateSet {
                exercise,
                set,
                input: targets.into(),
            }),
        ),
        DayCmd::Log {
            exercise,
            set,
            reps,
            weight,
            at,
        } => (
            at,
            Some(DayAction::LogSet {
                exercise,
                set,
                reps,
                weight,
            }),
        ),
        DayCmd::Undo { exercise, set, at } => (at, Some(DayAction::ClearSet { exercise, set })),
        DayCmd::Finish { feedback, at } => (at, Some(DayAction::Finish { feedback })),
        DayCmd::Reopen { at } => (at, Some(DayAction::Reopen)),
    }
}

pub async fn handle(cmd: DayCmd, tracker: &Tracker, fmt: OutputFmt) -> Result<()> {
    let today = today();
    let (at, action) = split(cmd);
    let date = at.date.as_deref().map(|d| parse_date(d, today)).transpose()?;

    let view = match action {
        None => match at.mesocycle.as_deref() {
            Some(key) => {
                let meso = tracker.mesocycle(key).await?;
                tracker.day(Some(meso.id.as_str()), date, today).await?
            }
            None => tracker.day(None, date, today).await?,
        },
        Some(action) => {
            let meso = mesocycle_or_active(tracker, at.mesocycle.as_deref()).await?;
            tracker.apply(&meso.id, date, today, action).await?
        }
    };

    emit(fmt, &view, || pretty_day(&view));
    Ok(())
}
