use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::calendar::Schedule;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MesocycleState {
    Draft,
    Active,
    Completed,
}

/// A named multi-week training plan.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Mesocycle {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub goal: String,
    pub duration_in_weeks: i64,
    pub training_days_per_week: i64,
    /// Training days plus rest days.
    pub microcycle_length: i64,
    /// Comma separated rest offsets, e.g. `3,4,5,6`.
    pub rest_days: String,
    pub state: MesocycleState,
    /// Set when the current (or last) run started.
    pub start_date: Option<NaiveDate>,
    pub created_at: String,
}

impl Mesocycle {
    pub fn rest_day_offsets(&self) -> Vec<i64> {
        parse_offsets(&self.rest_days)
    }

    /// Calendar for the run that started at `start_date`, if any.
    pub fn schedule(&self) -> Option<Result<Schedule>> {
        self.start_date.map(|start| {
            Schedule::new(
                start,
                self.duration_in_weeks,
                self.microcycle_length,
                &self.rest_day_offsets(),
            )
        })
    }
}

pub fn parse_offsets(csv: &str) -> Vec<i64> {
    csv.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

pub fn format_offsets(offsets: &[i64]) -> String {
    offsets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// One execution of a mesocycle. `end_date` is `None` while it runs.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MesocycleRun {
    pub id: String,
    pub mesocycle_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// A template slot of the microcycle pattern, or one realized occurrence of
/// it inside a run (then `run_id`, `template_id`, `microcycle_number` and
/// `date` are set).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrainingDay {
    pub id: String,
    pub mesocycle_id: String,
    pub number: i64,
    pub label: String,
    pub run_id: Option<String>,
    pub template_id: Option<String>,
    pub microcycle_number: Option<i64>,
    pub date: Option<NaiveDate>,
    pub completed: bool,
    pub reopened: bool,
    pub completed_at: Option<String>,
    pub feedback: Option<String>,
    #[serde(skip)]
    pub carried_set_counts: Option<String>,
}

impl TrainingDay {
    pub fn is_template(&self) -> bool {
        self.run_id.is_none()
    }
}

/// An exercise placed on a training day, with its sets.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TrainingDayExercise {
    pub id: String,
    pub training_day_id: String,
    pub exercise_id: String,
    pub exercise_name: String,
    pub number: i64,
    pub notes: Option<String>,
    #[sqlx(skip)]
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ExerciseSet {
    pub id: String,
    pub training_day_exercise_id: String,
    pub number: i64,
    pub rep_range_lower: i64,
    pub rep_range_upper: i64,
    pub rir: i64,
    /// `None` until a weight is decided.
    pub weight: Option<f64>,
    pub completed: bool,
    pub reps_completed: Option<i64>,
}

impl ExerciseSet {
    /// Weight times reps performed; an unweighted set counts as zero.
    pub fn volume(&self) -> f64 {
        self.weight.unwrap_or(0.0) * self.reps_completed.unwrap_or(0) as f64
    }
}

/// Values for a set about to be created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewSet {
    pub rep_range_lower: i64,
    pub rep_range_upper: i64,
    pub rir: i64,
    pub weight: Option<f64>,
}

impl NewSet {
    pub const DEFAULT_REP_RANGE: (i64, i64) = (5, 8);

    /// Copies the targets of `last`, or falls back to 5-8 reps at 0 RIR.
    pub fn following(last: Option<&ExerciseSet>) -> Self {
        match last {
            Some(s) => Self {
                rep_range_lower: s.rep_range_lower,
                rep_range_upper: s.rep_range_upper,
                rir: s.rir,
                weight: s.weight,
            },
            None => Self {
                rep_range_lower: Self::DEFAULT_REP_RANGE.0,
                rep_range_upper: Self::DEFAULT_REP_RANGE.1,
                rir: 0,
                weight: None,
            },
        }
    }
}

/// A catalog exercise. `user_id` is `None` for built-in ones.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Exercise {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub shared: bool,
    #[sqlx(skip)]
    pub muscle_groups: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(weight: Option<f64>, reps: Option<i64>) -> ExerciseSet {
        ExerciseSet {
            id: "s".into(),
            training_day_exercise_id: "e".into(),
            number: 1,
            rep_range_lower: 8,
            rep_range_upper: 12,
            rir: 2,
            weight,
            completed: reps.is_some(),
            reps_completed: reps,
        }
    }

    #[test]
    fn new_set_copies_last_targets() {
        let last = set(Some(60.0), None);
        let next = NewSet::following(Some(&last));
        assert_eq!(
            next,
            NewSet {
                rep_range_lower: 8,
                rep_range_upper: 12,
                rir: 2,
                weight: Some(60.0)
            }
        );
    }

    #[test]
    fn new_set_defaults_without_previous() {
        let next = NewSet::following(None);
        assert_eq!((next.rep_range_lower, next.rep_range_upper, next.rir), (5, 8, 0));
        assert_eq!(next.weight, None);
    }

    #[test]
    fn volume_treats_missing_values_as_zero() {
        assert_eq!(set(Some(100.0), Some(5)).volume(), 500.0);
        assert_eq!(set(None, Some(12)).volume(), 0.0);
    }

    #[test]
    fn offsets_round_trip_through_csv() {
        assert_eq!(parse_offsets("3, 4,5,6"), vec![3, 4, 5, 6]);
        assert_eq!(parse_offsets(""), Vec::<i64>::new());
        assert_eq!(format_offsets(&[6, 3]), "6,3");
    }
}
