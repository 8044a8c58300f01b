use anyhow::Result;
use colored::Colorize;
use sculpt::{
    OutputFmt, Tracker,
    store::sets::SetInput,
    tracker::PlanAction,
    types::emit,
};

use crate::{
    cli::{PlanCmd, TargetArgs},
    commands::mesocycle::print_exercises,
};

impl From<TargetArgs> for SetInput {
    fn from(t: TargetArgs) -> Self {
        Self {
            rep_range: t.reps,
            rir: t.rir,
            weight: t.weight,
            clear_weight: t.clear_weight,
        }
    }
}

pub async fn handle(cmd: PlanCmd, tracker: &Tracker, fmt: OutputFmt) -> Result<()> {
    let (mesocycle, day, action) = match cmd {
        PlanCmd::Label { mesocycle, day, label } => (mesocycle, day, PlanAction::Relabel { label }),
        PlanCmd::AddEx {
            mesocycle,
            day,
            exercise,
            sets,
        } => (mesocycle, day, PlanAction::AddExercise { exercise, sets }),
        PlanCmd::RemoveEx { mesocycle, day, exercise } => (mesocycle, day, PlanAction::RemoveExercise { exercise }),
        PlanCmd::Move { mesocycle, day, from, to } => (mesocycle, day, PlanAction::MoveExercise { from, to }),
        PlanCmd::Note {
            mesocycle,
            day,
            exercise,
            note,
        } => (mesocycle, day, PlanAction::Notes { exercise, notes: note }),
        PlanCmd::AddSet { mesocycle, day, exercise } => (mesocycle, day, PlanAction::AddSet { exercise }),
        PlanCmd::RemoveSet {
            mesocycle,
            day,
            exercise,
            set,
        } => (mesocycle, day, PlanAction::RemoveSet { exercise, set }),
        PlanCmd::UpdateSet {
            mesocycle,
            day,
            exercise,
            set,
            targets,
        } => (
            mesocycle,
            day,
            PlanAction::UpdateSet {
                exercise,
                set,
                input: targets.into(),
            },
        ),
    };

    let meso = tracker.mesocycle(&mesocycle).await?;
    let exercises = tracker.edit_plan(&meso.id, day, action).await?;
    emit(fmt, &exercises, || {
        println!("{} {} day {}", "ok:".green().bold(), meso.name.bold(), day);
        print_exercises(&exercises);
    });
    Ok(())
}
