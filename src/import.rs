//! TOML plans and exercise lists.
//!
//! A plan file describes a whole mesocycle:
//!
//! ```toml
//! name = "Push Pull Legs"
//! weeks = 5
//! rest_days = [1, 3, 5, 6]
//!
//! [[days]]
//! label = "Push"
//!
//! [[days.exercises]]
//! name = "Bench Press"
//! sets = 3
//! reps = "6-10"
//! rir = 2
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::{
    error::{AppError, FieldErrors, Result},
    models::Mesocycle,
    store::{
        days, exercises,
        mesocycles::{self, NewMesocycle},
        sets::{self, SetInput},
    },
    types::ExerciseImport,
};

#[derive(Debug, Deserialize)]
pub struct PlanFile {
    pub name: String,
    #[serde(default)]
    pub goal: String,
    pub weeks: i64,
    #[serde(default)]
    pub rest_days: Vec<i64>,
    pub days: Vec<PlanDay>,
}

#[derive(Debug, Deserialize)]
pub struct PlanDay {
    pub label: Option<String>,
    #[serde(default)]
    pub exercises: Vec<PlanExercise>,
}

#[derive(Debug, Deserialize)]
pub struct PlanExercise {
    pub name: String,
    pub sets: i64,
    pub reps: Option<String>,
    pub rir: Option<i64>,
    pub weight: Option<f64>,
    pub notes: Option<String>,
}

impl PlanFile {
    pub fn parse(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    fn exercise_names(&self) -> BTreeSet<&str> {
        self.days
            .iter()
            .flat_map(|d| d.exercises.iter().map(|e| e.name.as_str()))
            .collect()
    }
}

/// Why a plan was not imported.
#[derive(Debug)]
pub enum PlanRejected {
    /// Exercises that are not in the user's catalog.
    MissingExercises(Vec<String>),
    Invalid(AppError),
}

impl From<AppError> for PlanRejected {
    fn from(err: AppError) -> Self {
        Self::Invalid(err)
    }
}

/// Creates a draft mesocycle from `plan`. Either the whole plan lands or
/// nothing does, as long as `conn` is a transaction.
pub async fn import_plan(
    conn: &mut SqliteConnection,
    user: &str,
    plan: &PlanFile,
) -> std::result::Result<Mesocycle, PlanRejected> {
    let mut missing = Vec::new();
    let mut found = Vec::new();
    for name in plan.exercise_names() {
        match exercises::resolve(&mut *conn, user, name).await {
            Ok(ex) => found.push((name, ex.id)),
            Err(AppError::NotFound) => missing.push(name.to_string()),
            Err(e) => return Err(e.into()),
        }
    }
    if !missing.is_empty() {
        return Err(PlanRejected::MissingExercises(missing));
    }

    let mut errs = FieldErrors::new();
    for (d, day) in plan.days.iter().enumerate() {
        for ex in &day.exercises {
            if ex.sets < 1 {
                errs.insert(
                    format!("days[{d}].sets"),
                    format!("`{}` needs at least one set.", ex.name),
                );
            }
        }
    }
    errs.into_result()?;

    let meso = mesocycles::create(
        &mut *conn,
        user,
        &NewMesocycle {
            name: plan.name.clone(),
            goal: plan.goal.clone(),
            duration_in_weeks: plan.weeks,
            training_days_per_week: plan.days.len() as i64,
            rest_days: plan.rest_days.clone(),
            labels: plan.days.iter().map(|d| d.label.clone().unwrap_or_default()).collect(),
        },
    )
    .await?;

    for (d, day) in plan.days.iter().enumerate() {
        let template = days::template(&mut *conn, &meso.id, d as i64 + 1).await?;
        for ex in &day.exercises {
            let exercise_id = found
                .iter()
                .find(|(n, _)| *n == ex.name)
                .map(|(_, id)| id.as_str())
                .ok_or(AppError::NotFound)?;
            let row = days::add_exercise(&mut *conn, &template.id, exercise_id).await?;
            days::set_notes(&mut *conn, &row, ex.notes.as_deref()).await?;

            let patch = SetInput {
                rep_range: ex.reps.clone(),
                rir: ex.rir,
                weight: ex.weight,
                clear_weight: false,
            }
            .validate()?;
            for _ in 0..ex.sets {
                let set = sets::append(&mut *conn, &row).await?;
                sets::update_targets(&mut *conn, &set, &patch).await?;
            }
        }
    }

    info!(mesocycle = %meso.id, name = %meso.name, "plan imported");
    Ok(meso)
}

/// Outcome of an exercise list import.
#[derive(Debug, Default)]
pub struct ExerciseImportReport {
    pub inserted: Vec<String>,
    /// Name and reason for every entry left out.
    pub skipped: Vec<(String, String)>,
}

/// Adds every `[[exercise]]` entry it can. Duplicates and entries with
/// unknown muscles are skipped and reported.
pub async fn import_exercises(
    conn: &mut SqliteConnection,
    user: &str,
    list: &ExerciseImport,
) -> Result<ExerciseImportReport> {
    let mut report = ExerciseImportReport::default();
    for def in &list.exercise {
        match exercises::create(&mut *conn, user, &def.name, &def.muscles).await {
            Ok(ex) => report.inserted.push(ex.name),
            Err(AppError::Validation(errs)) => {
                report.skipped.push((def.name.clone(), errs.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{USER, setup_test_db};

    const PRESET: &str = include_str!("../presets/push-pull-legs.toml");

    #[tokio::test]
    async fn preset_imports_as_a_draft() {
        let pool = setup_test_db().await;
        let mut tx = pool.begin().await.unwrap();
        let plan = PlanFile::parse(PRESET).unwrap();

        let meso = import_plan(&mut tx, USER, &plan).await.unwrap();
        assert_eq!(meso.training_days_per_week, 3);
        assert_eq!(meso.rest_day_offsets(), vec![1, 3, 5, 6]);

        let push = days::template(&mut *tx, &meso.id, 1).await.unwrap();
        assert_eq!(push.label, "Push");
        let exercises = days::exercises(&mut tx, &push.id).await.unwrap();
        assert_eq!(exercises.len(), 4);
        let bench = &exercises[0].sets;
        assert_eq!(bench.len(), 3);
        assert!(bench.iter().all(|s| (s.rep_range_lower, s.rep_range_upper, s.rir) == (6, 10, 2)));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_exercises_reject_the_plan() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let plan = PlanFile::parse(
            r#"
            name = "Odd"
            weeks = 2
            [[days]]
            [[days.exercises]]
            name = "Underwater Basket Weaving"
            sets = 2
            "#,
        )
        .unwrap();

        match import_plan(&mut conn, USER, &plan).await {
            Err(PlanRejected::MissingExercises(names)) => {
                assert_eq!(names, vec!["Underwater Basket Weaving".to_string()])
            }
            other => panic!("expected missing exercises, got {other:?}"),
        }
        assert!(mesocycles::list(&mut *conn, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exercise_import_skips_bad_entries() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let list: ExerciseImport = toml::from_str(
            r#"
            [[exercise]]
            name = "Cable Fly"
            muscles = ["chest"]

            [[exercise]]
            name = "Neck Curl"
            muscles = ["neck"]

            [[exercise]]
            name = "cable fly"
            muscles = ["chest"]
            "#,
        )
        .unwrap();

        let report = import_exercises(&mut conn, USER, &list).await.unwrap();
        assert_eq!(report.inserted, vec!["Cable Fly".to_string()]);
        let skipped: Vec<_> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(skipped, ["Neck Curl", "cable fly"]);
    }
}
