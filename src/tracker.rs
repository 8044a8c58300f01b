//! Request-level operations: given a user, a mesocycle, an optional date and
//! an action, apply it in one transaction and return the day as it now looks.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::{
    calendar::{CalendarDay, Resolution, Schedule},
    db::DB,
    error::{AppError, Result},
    models::{ExerciseSet, Mesocycle, MesocycleRun, MesocycleState, TrainingDay, TrainingDayExercise},
    notify::{self, Notification, NotificationKind},
    progress::{self, SessionSummary, SetPerformance},
    session::{FinishKind, Mutation, SessionState, SetProgress, TrainingDayState},
    store::{
        days,
        mesocycles::{self, NewMesocycle},
        sets::{self, SetInput},
    },
};

/// Changes to the realized day a date resolves to. Exercises and sets are
/// addressed by their 1-based position.
#[derive(Debug, Clone)]
pub enum DayAction {
    AddSet { exercise: i64 },
    RemoveSet { exercise: i64, set: i64 },
    UpdateSet { exercise: i64, set: i64, input: SetInput },
    LogSet { exercise: i64, set: i64, reps: i64, weight: Option<f64> },
    ClearSet { exercise: i64, set: i64 },
    Finish { feedback: Option<String> },
    Reopen,
}

/// Changes to a template day; they shape every run started afterwards.
#[derive(Debug, Clone)]
pub enum PlanAction {
    Relabel { label: String },
    AddExercise { exercise: String, sets: i64 },
    RemoveExercise { exercise: i64 },
    MoveExercise { from: i64, to: i64 },
    Notes { exercise: i64, notes: Option<String> },
    AddSet { exercise: i64 },
    RemoveSet { exercise: i64, set: i64 },
    UpdateSet { exercise: i64, set: i64, input: SetInput },
}

#[derive(Debug, Clone, Serialize)]
pub struct SetView {
    #[serde(flatten)]
    pub set: ExerciseSet,
    pub previous: Option<ExerciseSet>,
    pub performance: SetPerformance,
    pub should_increase_weight: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseView {
    pub id: String,
    pub exercise_id: String,
    pub name: String,
    pub number: i64,
    pub notes: Option<String>,
    pub sets: Vec<SetView>,
}

impl ExerciseView {
    fn new(exercise: TrainingDayExercise, rank: usize, previous: &[TrainingDayExercise]) -> Self {
        let sets = exercise
            .sets
            .into_iter()
            .map(|set| {
                let prev = progress::previous_set(previous, &exercise.exercise_id, rank, set.number);
                SetView {
                    performance: progress::classify(prev, &set),
                    should_increase_weight: progress::should_increase_weight(prev, &set),
                    previous: prev.cloned(),
                    set,
                }
            })
            .collect();
        Self {
            id: exercise.id,
            exercise_id: exercise.exercise_id,
            name: exercise.exercise_name,
            number: exercise.number,
            notes: exercise.notes,
            sets,
        }
    }
}

/// Everything a client needs to render one date.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub mesocycle: Option<Mesocycle>,
    pub resolution: Option<Resolution>,
    pub session: SessionState,
    pub day: Option<TrainingDay>,
    pub progress: SetProgress,
    pub exercises: Vec<ExerciseView>,
    pub summary: Option<SessionSummary>,
    pub completed: bool,
    pub read_only: bool,
    pub is_future_session: bool,
    pub can_finish: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarCell {
    #[serde(flatten)]
    pub day: CalendarDay,
    pub training_day_number: Option<i64>,
    pub label: Option<String>,
    pub completed: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    pub mesocycle: Mesocycle,
    pub microcycle_length: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// First and last day of the final microcycle.
    pub last_microcycle: (NaiveDate, NaiveDate),
    pub days: Vec<CalendarCell>,
}

/// What the stored facts say about one date.
struct Context {
    mesocycle: Option<Mesocycle>,
    resolution: Option<Resolution>,
    state: SessionState,
    day: Option<TrainingDay>,
    progress: SetProgress,
}

impl Context {
    fn not_started(mesocycle: Option<Mesocycle>, resolution: Option<Resolution>) -> Self {
        Self {
            mesocycle,
            resolution,
            state: SessionState::NotStarted,
            day: None,
            progress: SetProgress::default(),
        }
    }

    fn day(&self) -> Result<&TrainingDay> {
        self.day
            .as_ref()
            .ok_or_else(|| AppError::invalid_state("There is no training day for that date."))
    }
}

async fn load(
    conn: &mut SqliteConnection,
    mesocycle: Option<Mesocycle>,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<Context> {
    let Some(meso) = mesocycle else {
        return Ok(Context::not_started(None, None));
    };
    let schedule = match (meso.state, meso.schedule()) {
        (MesocycleState::Draft, _) | (_, None) => return Ok(Context::not_started(Some(meso), None)),
        (_, Some(schedule)) => schedule?,
    };

    let resolution = schedule.resolve(date, today);
    let run = match meso.state {
        MesocycleState::Active => mesocycles::open_run(&mut *conn, &meso.id).await?,
        _ => mesocycles::last_run(&mut *conn, &meso.id).await?,
    };
    let slot = resolution.day().and_then(|d| d.training_day_number.map(|n| (d.microcycle_number, n)));
    let day = match (&run, slot) {
        (Some(run), Some((microcycle, number))) => days::occurrence(&mut *conn, &run.id, microcycle, number).await?,
        _ => None,
    };
    let progress = match &day {
        Some(d) => days::progress(&mut *conn, &d.id).await?,
        None => SetProgress::default(),
    };

    let state = match (meso.state, resolution) {
        (MesocycleState::Completed, _) => SessionState::MesocycleCompleted,
        (_, Resolution::OutOfRange(_)) => SessionState::NotStarted,
        (_, Resolution::Day(resolved)) => match &day {
            None if resolved.is_training_day() => {
                warn!(mesocycle = %meso.id, %date, "training day was never laid out");
                return Err(AppError::NotFound);
            }
            None => SessionState::RestDay {
                is_future_session: resolved.is_future_session,
            },
            Some(d) => SessionState::TrainingDay {
                day: TrainingDayState::derive(progress, d.completed, d.reopened),
                is_future_session: resolved.is_future_session,
            },
        },
    };

    Ok(Context {
        mesocycle: Some(meso),
        resolution: Some(resolution),
        state,
        day,
        progress,
    })
}

pub struct Tracker {
    pool: DB,
    user: String,
}

impl Tracker {
    pub fn new(pool: DB, user: impl Into<String>) -> Self {
        Self { pool, user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn pool(&self) -> &DB {
        &self.pool
    }

    /// Looks up one of the user's mesocycles by list index, id or name.
    pub async fn mesocycle(&self, key: &str) -> Result<Mesocycle> {
        let mut conn = self.pool.acquire().await?;
        mesocycles::resolve(&mut conn, &self.user, key).await
    }

    pub async fn create_mesocycle(&self, new: &NewMesocycle) -> Result<Mesocycle> {
        let mut tx = self.pool.begin().await?;
        let meso = mesocycles::create(&mut tx, &self.user, new).await?;
        tx.commit().await?;
        Ok(meso)
    }

    pub async fn start(&self, mesocycle_id: &str, start_date: NaiveDate) -> Result<MesocycleRun> {
        let mut tx = self.pool.begin().await?;
        let run = mesocycles::start(&mut tx, &self.user, mesocycle_id, start_date).await?;
        let meso = mesocycles::get(&mut *tx, &self.user, mesocycle_id).await?;
        notify::flash(
            &mut *tx,
            &self.user,
            NotificationKind::Success,
            &format!("Mesocycle \"{}\" started on {start_date}.", meso.name),
        )
        .await?;
        tx.commit().await?;
        Ok(run)
    }

    pub async fn stop(&self, mesocycle_id: &str, today: NaiveDate) -> Result<MesocycleRun> {
        let mut tx = self.pool.begin().await?;
        let run = mesocycles::stop(&mut tx, &self.user, mesocycle_id, today).await?;
        let meso = mesocycles::get(&mut *tx, &self.user, mesocycle_id).await?;
        notify::flash(
            &mut *tx,
            &self.user,
            NotificationKind::Success,
            &format!("Mesocycle \"{}\" stopped.", meso.name),
        )
        .await?;
        tx.commit().await?;
        info!(mesocycle = %mesocycle_id, "mesocycle stopped");
        Ok(run)
    }

    /// Completes the active mesocycle once its last day is behind `today`.
    pub async fn settle(&self, today: NaiveDate) -> Result<Option<Mesocycle>> {
        let mut tx = self.pool.begin().await?;
        let expired = mesocycles::settle_expired(&mut tx, &self.user, today).await?;
        if let Some(meso) = &expired {
            notify::flash(
                &mut *tx,
                &self.user,
                NotificationKind::Success,
                &format!("Mesocycle \"{}\" is complete.", meso.name),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(expired)
    }

    /// The pending notification, removed as it is returned.
    pub async fn take_notification(&self) -> Result<Option<Notification>> {
        notify::take(&self.pool, &self.user).await
    }

    /// The day `requested` (default `today`) of `mesocycle_id`, or of the
    /// active mesocycle when no id is given.
    pub async fn day(
        &self,
        mesocycle_id: Option<&str>,
        requested: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<DayView> {
        let expired = self.settle(today).await?;
        let date = requested.unwrap_or(today);
        let mut conn = self.pool.acquire().await?;

        let meso = match mesocycle_id {
            Some(id) => Some(mesocycles::get(&mut *conn, &self.user, id).await?),
            None => match mesocycles::active(&mut *conn, &self.user).await? {
                Some(m) => Some(m),
                None => expired,
            },
        };
        let ctx = load(&mut conn, meso, date, today).await?;
        view(&mut conn, ctx, date).await
    }

    /// Applies `action` to the day `requested` resolves to. Nothing is
    /// written unless the whole action succeeds; a rejected state change is
    /// also flashed as an error notification.
    pub async fn apply(
        &self,
        mesocycle_id: &str,
        requested: Option<NaiveDate>,
        today: NaiveDate,
        action: DayAction,
    ) -> Result<DayView> {
        self.settle(today).await?;
        let date = requested.unwrap_or(today);

        let mut tx = self.pool.begin().await?;
        match self.apply_in(&mut tx, mesocycle_id, date, today, &action).await {
            Ok(message) => {
                if let Some(message) = message {
                    notify::flash(&mut *tx, &self.user, NotificationKind::Success, &message).await?;
                }
                tx.commit().await?;
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                if let AppError::InvalidState(msg) = &err {
                    notify::flash(&self.pool, &self.user, NotificationKind::Error, msg).await?;
                }
                return Err(err);
            }
        }

        self.day(Some(mesocycle_id), Some(date), today).await
    }

    async fn apply_in(
        &self,
        conn: &mut SqliteConnection,
        mesocycle_id: &str,
        date: NaiveDate,
        today: NaiveDate,
        action: &DayAction,
    ) -> Result<Option<String>> {
        let meso = mesocycles::get(&mut *conn, &self.user, mesocycle_id).await?;
        let ctx = load(&mut *conn, Some(meso), date, today).await?;

        match action {
            DayAction::AddSet { exercise } => {
                ctx.state.permits(Mutation::AddSet)?;
                let row = days::exercise_at(&mut *conn, &ctx.day()?.id, *exercise).await?;
                sets::append(conn, &row.id).await?;
                Ok(None)
            }
            DayAction::RemoveSet { exercise, set } => {
                ctx.state.permits(Mutation::RemoveSet)?;
                let row = days::exercise_at(&mut *conn, &ctx.day()?.id, *exercise).await?;
                sets::remove(conn, &row.id, *set).await?;
                Ok(None)
            }
            DayAction::UpdateSet { exercise, set, input } => {
                let patch = input.validate()?;
                ctx.state.permits(Mutation::UpdateTargets)?;
                let row = days::exercise_at(&mut *conn, &ctx.day()?.id, *exercise).await?;
                let current = sets::find(&mut *conn, &row.id, *set).await?;
                sets::update_targets(conn, &current, &patch).await?;
                Ok(None)
            }
            DayAction::LogSet { exercise, set, reps, weight } => {
                sets::validate_log(*reps, *weight)?;
                ctx.state.permits(Mutation::LogSet)?;
                let row = days::exercise_at(&mut *conn, &ctx.day()?.id, *exercise).await?;
                let current = sets::find(&mut *conn, &row.id, *set).await?;
                sets::log(&mut *conn, &current.id, *reps, *weight).await?;
                Ok(None)
            }
            DayAction::ClearSet { exercise, set } => {
                ctx.state.permits(Mutation::LogSet)?;
                let row = days::exercise_at(&mut *conn, &ctx.day()?.id, *exercise).await?;
                let current = sets::find(&mut *conn, &row.id, *set).await?;
                sets::clear(&mut *conn, &current.id).await?;
                Ok(None)
            }
            DayAction::Finish { feedback } => {
                let (_, kind) = ctx.state.finish(ctx.progress)?;
                let day = ctx.day()?;
                let exercises = days::exercises(&mut *conn, &day.id).await?;
                let signature = days::set_count_signature(&exercises);
                if day.carried_set_counts.as_deref() != Some(signature.as_str()) {
                    days::carry_forward(&mut *conn, day, &exercises).await?;
                }
                days::mark_finished(&mut *conn, &day.id, feedback.as_deref(), &signature).await?;

                info!(day = %day.id, ?kind, "training session finished");
                Ok(Some(
                    match kind {
                        FinishKind::Finished => "Training session finished.",
                        FinishKind::Updated => "Training session updated.",
                    }
                    .to_string(),
                ))
            }
            DayAction::Reopen => {
                ctx.state.reopen()?;
                let day = ctx.day()?;
                days::reopen(&mut *conn, &day.id).await?;
                info!(day = %day.id, "training session reopened");
                Ok(Some("Training session reopened.".to_string()))
            }
        }
    }

    /// Edits template day `day_number` and returns its exercises afterwards.
    pub async fn edit_plan(
        &self,
        mesocycle_id: &str,
        day_number: i64,
        action: PlanAction,
    ) -> Result<Vec<TrainingDayExercise>> {
        let mut tx = self.pool.begin().await?;
        let meso = mesocycles::get(&mut *tx, &self.user, mesocycle_id).await?;
        if meso.state == MesocycleState::Completed {
            warn!(mesocycle = %meso.id, "plan edit rejected");
            return Err(AppError::invalid_state(
                "The mesocycle is completed and can no longer be edited.",
            ));
        }
        let template = days::template(&mut *tx, &meso.id, day_number).await?;

        match &action {
            PlanAction::Relabel { label } => days::relabel(&mut *tx, &template.id, label).await?,
            PlanAction::AddExercise { exercise, sets: count } => {
                if *count < 1 {
                    return Err(AppError::field("sets", "Add at least one set."));
                }
                let found = crate::store::exercises::resolve(&mut *tx, &self.user, exercise).await?;
                let row = days::add_exercise(&mut tx, &template.id, &found.id).await?;
                for _ in 0..*count {
                    sets::append(&mut tx, &row).await?;
                }
            }
            PlanAction::RemoveExercise { exercise } => {
                days::remove_exercise(&mut tx, &template.id, *exercise).await?;
            }
            PlanAction::MoveExercise { from, to } => {
                days::move_exercise(&mut tx, &template.id, *from, *to).await?;
            }
            PlanAction::Notes { exercise, notes } => {
                let row = days::exercise_at(&mut *tx, &template.id, *exercise).await?;
                days::set_notes(&mut *tx, &row.id, notes.as_deref()).await?;
            }
            PlanAction::AddSet { exercise } => {
                let row = days::exercise_at(&mut *tx, &template.id, *exercise).await?;
                sets::append(&mut tx, &row.id).await?;
            }
            PlanAction::RemoveSet { exercise, set } => {
                let row = days::exercise_at(&mut *tx, &template.id, *exercise).await?;
                sets::remove(&mut tx, &row.id, *set).await?;
            }
            PlanAction::UpdateSet { exercise, set, input } => {
                let patch = input.validate()?;
                let row = days::exercise_at(&mut *tx, &template.id, *exercise).await?;
                let current = sets::find(&mut *tx, &row.id, *set).await?;
                sets::update_targets(&mut tx, &current, &patch).await?;
            }
        }

        let exercises = days::exercises(&mut tx, &template.id).await?;
        tx.commit().await?;
        info!(mesocycle = %meso.id, day = day_number, ?action, "plan edited");
        Ok(exercises)
    }

    /// Template days of a mesocycle with their exercises.
    pub async fn plan(&self, mesocycle_id: &str) -> Result<Vec<(TrainingDay, Vec<TrainingDayExercise>)>> {
        let mut conn = self.pool.acquire().await?;
        let meso = mesocycles::get(&mut *conn, &self.user, mesocycle_id).await?;
        let mut out = Vec::new();
        for template in days::templates(&mut *conn, &meso.id).await? {
            let exercises = days::exercises(&mut conn, &template.id).await?;
            out.push((template, exercises));
        }
        Ok(out)
    }

    /// The whole plan of a started mesocycle as calendar cells.
    pub async fn calendar(&self, mesocycle_id: Option<&str>, today: NaiveDate) -> Result<CalendarView> {
        self.settle(today).await?;
        let mut conn = self.pool.acquire().await?;
        let meso = match mesocycle_id {
            Some(id) => mesocycles::get(&mut *conn, &self.user, id).await?,
            None => mesocycles::active(&mut *conn, &self.user)
                .await?
                .ok_or(AppError::NotFound)?,
        };
        let schedule: Schedule = meso
            .schedule()
            .ok_or_else(|| AppError::invalid_state("The mesocycle has not been started."))??;

        let run = match meso.state {
            MesocycleState::Active => mesocycles::open_run(&mut *conn, &meso.id).await?,
            _ => mesocycles::last_run(&mut *conn, &meso.id).await?,
        };
        let realized: HashMap<NaiveDate, TrainingDay> = match &run {
            Some(run) => days::occurrences_between(&mut *conn, &run.id, schedule.start_date, schedule.end_date())
                .await?
                .into_iter()
                .filter_map(|d| d.date.map(|date| (date, d)))
                .collect(),
            None => HashMap::new(),
        };

        let days = schedule
            .calendar_days(today)
            .into_iter()
            .map(|cell| {
                let realized = realized.get(&cell.date);
                CalendarCell {
                    training_day_number: realized.map(|d| d.number),
                    label: realized.map(|d| d.label.clone()),
                    completed: realized.is_some_and(|d| d.completed),
                    is_today: cell.date == today,
                    day: cell,
                }
            })
            .collect();

        Ok(CalendarView {
            microcycle_length: schedule.microcycle_length,
            start_date: schedule.start_date,
            end_date: schedule.end_date(),
            last_microcycle: schedule.microcycle_bounds(schedule.microcycle_count()),
            days,
            mesocycle: meso,
        })
    }
}

async fn view(conn: &mut SqliteConnection, ctx: Context, date: NaiveDate) -> Result<DayView> {
    let (exercises, previous) = match &ctx.day {
        Some(day) => {
            let exercises = days::exercises(&mut *conn, &day.id).await?;
            let previous = match days::previous_occurrence(&mut *conn, day).await? {
                Some(prev) => days::exercises(&mut *conn, &prev.id).await?,
                None => Vec::new(),
            };
            (exercises, previous)
        }
        None => (Vec::new(), Vec::new()),
    };

    let summary = ctx.day.as_ref().map(|_| progress::summarize(&exercises, &previous));
    let ranks = progress::occurrence_ranks(&exercises);
    let exercises = exercises
        .into_iter()
        .zip(ranks)
        .map(|(e, rank)| ExerciseView::new(e, rank, &previous))
        .collect();

    Ok(DayView {
        date,
        completed: ctx.state.is_completed(),
        read_only: ctx.state.is_read_only(),
        is_future_session: ctx.state.is_future_session(),
        can_finish: ctx.state.can_finish(ctx.progress),
        mesocycle: ctx.mesocycle,
        resolution: ctx.resolution,
        session: ctx.state,
        day: ctx.day,
        progress: ctx.progress,
        exercises,
        summary,
    })
}
