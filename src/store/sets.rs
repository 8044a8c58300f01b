use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::debug;

use crate::{
    error::{AppError, FieldErrors, Result},
    models::{ExerciseSet, NewSet},
    store::new_id,
    types::RepRange,
};

const SET_COLUMNS: &str = "id, training_day_exercise_id, number, rep_range_lower, rep_range_upper, rir, weight, \
     completed, reps_completed";

/// Target changes for one set, as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct SetInput {
    pub rep_range: Option<String>,
    pub rir: Option<i64>,
    pub weight: Option<f64>,
    /// Forget the weight instead of setting one.
    pub clear_weight: bool,
}

/// Validated form of [`SetInput`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetPatch {
    pub rep_range: Option<RepRange>,
    pub rir: Option<i64>,
    pub weight: Option<Option<f64>>,
}

impl SetInput {
    /// Checks every field, reporting all problems at once.
    pub fn validate(&self) -> Result<SetPatch> {
        let mut errs = FieldErrors::new();
        let mut patch = SetPatch::default();

        if let Some(raw) = &self.rep_range {
            match raw.parse::<RepRange>() {
                Ok(range) => patch.rep_range = Some(range),
                Err(AppError::Validation(e)) => {
                    for (field, msg) in e.iter() {
                        errs.insert(field, msg);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        match self.rir {
            Some(rir) if rir < 0 => errs.insert("rir", "RIR must be at least 0."),
            rir => patch.rir = rir,
        }
        match (self.weight, self.clear_weight) {
            (Some(_), true) => errs.insert("weight", "Either set a weight or clear it, not both."),
            (Some(w), false) if !w.is_finite() || w < 0.0 => errs.insert("weight", "Weight must be 0 or more."),
            (Some(w), false) => patch.weight = Some(Some(w)),
            (None, true) => patch.weight = Some(None),
            (None, false) => {}
        }

        errs.into_result()?;
        Ok(patch)
    }
}

/// Checks a logged performance.
pub fn validate_log(reps: i64, weight: Option<f64>) -> Result<()> {
    let mut errs = FieldErrors::new();
    if reps < 0 {
        errs.insert("reps", "Reps must be 0 or more.");
    }
    if weight.is_some_and(|w| !w.is_finite() || w < 0.0) {
        errs.insert("weight", "Weight must be 0 or more.");
    }
    errs.into_result()
}

pub async fn list<'e, E: SqliteExecutor<'e>>(ex: E, exercise_row_id: &str) -> Result<Vec<ExerciseSet>> {
    Ok(sqlx::query_as::<_, ExerciseSet>(&format!(
        "SELECT {SET_COLUMNS} FROM training_day_sets WHERE training_day_exercise_id = ?1 ORDER BY number"
    ))
    .bind(exercise_row_id)
    .fetch_all(ex)
    .await?)
}

/// Set `number` of a day exercise.
pub async fn find<'e, E: SqliteExecutor<'e>>(ex: E, exercise_row_id: &str, number: i64) -> Result<ExerciseSet> {
    sqlx::query_as::<_, ExerciseSet>(&format!(
        "SELECT {SET_COLUMNS} FROM training_day_sets WHERE training_day_exercise_id = ?1 AND number = ?2"
    ))
    .bind(exercise_row_id)
    .bind(number)
    .fetch_optional(ex)
    .await?
    .ok_or(AppError::NotFound)
}

/// Adds a set after the last one, copying its targets.
pub async fn append(conn: &mut SqliteConnection, exercise_row_id: &str) -> Result<ExerciseSet> {
    let last = sqlx::query_as::<_, ExerciseSet>(&format!(
        r#"
        SELECT {SET_COLUMNS}
        FROM   training_day_sets
        WHERE  training_day_exercise_id = ?1
        ORDER  BY number DESC
        LIMIT  1
        "#
    ))
    .bind(exercise_row_id)
    .fetch_optional(&mut *conn)
    .await?;

    let new = NewSet::following(last.as_ref());
    let set = ExerciseSet {
        id: new_id(),
        training_day_exercise_id: exercise_row_id.to_string(),
        number: last.map_or(1, |s| s.number + 1),
        rep_range_lower: new.rep_range_lower,
        rep_range_upper: new.rep_range_upper,
        rir: new.rir,
        weight: new.weight,
        completed: false,
        reps_completed: None,
    };

    sqlx::query(
        r#"
        INSERT INTO training_day_sets
          (id, training_day_exercise_id, number, rep_range_lower, rep_range_upper, rir, weight)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&set.id)
    .bind(exercise_row_id)
    .bind(set.number)
    .bind(set.rep_range_lower)
    .bind(set.rep_range_upper)
    .bind(set.rir)
    .bind(set.weight)
    .execute(&mut *conn)
    .await?;

    debug!(exercise = %exercise_row_id, number = set.number, "set added");
    Ok(set)
}

/// Deletes set `number` and shifts the later ones down so numbering stays
/// `1..=N`.
pub async fn remove(conn: &mut SqliteConnection, exercise_row_id: &str, number: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM training_day_sets WHERE training_day_exercise_id = ?1 AND number = ?2")
        .bind(exercise_row_id)
        .bind(number)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    sqlx::query(
        "UPDATE training_day_sets SET number = number - 1 WHERE training_day_exercise_id = ?1 AND number > ?2",
    )
    .bind(exercise_row_id)
    .bind(number)
    .execute(&mut *conn)
    .await?;

    debug!(exercise = %exercise_row_id, number, "set removed");
    Ok(())
}

/// Grows or shrinks a day exercise to `count` sets, working from the end.
pub async fn resize(conn: &mut SqliteConnection, exercise_row_id: &str, count: i64) -> Result<()> {
    let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_day_sets WHERE training_day_exercise_id = ?1")
        .bind(exercise_row_id)
        .fetch_one(&mut *conn)
        .await?;

    for _ in current..count {
        append(&mut *conn, exercise_row_id).await?;
    }
    if count < current {
        sqlx::query("DELETE FROM training_day_sets WHERE training_day_exercise_id = ?1 AND number > ?2")
            .bind(exercise_row_id)
            .bind(count.max(0))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn update_targets(conn: &mut SqliteConnection, set: &ExerciseSet, patch: &SetPatch) -> Result<ExerciseSet> {
    let (lower, upper) = patch
        .rep_range
        .map_or((set.rep_range_lower, set.rep_range_upper), |r| (r.lower, r.upper));
    let rir = patch.rir.unwrap_or(set.rir);
    let weight = patch.weight.unwrap_or(set.weight);

    sqlx::query(
        "UPDATE training_day_sets SET rep_range_lower = ?1, rep_range_upper = ?2, rir = ?3, weight = ?4 WHERE id = ?5",
    )
    .bind(lower)
    .bind(upper)
    .bind(rir)
    .bind(weight)
    .bind(&set.id)
    .execute(&mut *conn)
    .await?;

    Ok(ExerciseSet {
        rep_range_lower: lower,
        rep_range_upper: upper,
        rir,
        weight,
        ..set.clone()
    })
}

/// Marks a set done with the reps performed. A weight given here replaces
/// the planned one.
pub async fn log<'e, E: SqliteExecutor<'e>>(ex: E, set_id: &str, reps: i64, weight: Option<f64>) -> Result<()> {
    sqlx::query(
        "UPDATE training_day_sets SET completed = 1, reps_completed = ?1, weight = COALESCE(?2, weight) WHERE id = ?3",
    )
    .bind(reps)
    .bind(weight)
    .bind(set_id)
    .execute(ex)
    .await?;
    Ok(())
}

/// Undoes [`log`]; the weight stays.
pub async fn clear<'e, E: SqliteExecutor<'e>>(ex: E, set_id: &str) -> Result<()> {
    sqlx::query("UPDATE training_day_sets SET completed = 0, reps_completed = NULL WHERE id = ?1")
        .bind(set_id)
        .execute(ex)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::days,
        test_utils::{seed_three_day_plan, setup_test_db},
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    async fn bench_row(conn: &mut SqliteConnection, meso_id: &str) -> String {
        let day = days::template(&mut *conn, meso_id, 1).await.unwrap();
        days::exercise_at(&mut *conn, &day.id, 1).await.unwrap().id
    }

    fn numbers(sets: &[ExerciseSet]) -> Vec<i64> {
        sets.iter().map(|s| s.number).collect()
    }

    #[tokio::test]
    async fn append_copies_the_last_set() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let row = bench_row(&mut conn, &meso.id).await;

        let set = append(&mut conn, &row).await.unwrap();
        assert_eq!(set.number, 3);
        assert_eq!(set.weight, Some(100.0));
        assert_eq!((set.rep_range_lower, set.rep_range_upper), NewSet::DEFAULT_REP_RANGE);
    }

    #[tokio::test]
    async fn removing_a_middle_set_keeps_numbers_contiguous() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let row = bench_row(&mut conn, &meso.id).await;
        append(&mut conn, &row).await.unwrap();
        let third = find(&mut *conn, &row, 3).await.unwrap();

        remove(&mut conn, &row, 2).await.unwrap();
        let left = list(&mut *conn, &row).await.unwrap();
        assert_eq!(numbers(&left), vec![1, 2]);
        assert_eq!(left[1].id, third.id);

        assert!(matches!(remove(&mut conn, &row, 5).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn resize_grows_and_shrinks_from_the_end() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let row = bench_row(&mut conn, &meso.id).await;

        resize(&mut conn, &row, 4).await.unwrap();
        assert_eq!(numbers(&list(&mut *conn, &row).await.unwrap()), vec![1, 2, 3, 4]);
        resize(&mut conn, &row, 1).await.unwrap();
        assert_eq!(numbers(&list(&mut *conn, &row).await.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn log_then_clear() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let row = bench_row(&mut conn, &meso.id).await;
        let set = find(&mut *conn, &row, 1).await.unwrap();

        log(&mut *conn, &set.id, 7, Some(102.5)).await.unwrap();
        let logged = find(&mut *conn, &row, 1).await.unwrap();
        assert!(logged.completed);
        assert_eq!((logged.reps_completed, logged.weight), (Some(7), Some(102.5)));

        clear(&mut *conn, &set.id).await.unwrap();
        let cleared = find(&mut *conn, &row, 1).await.unwrap();
        assert!(!cleared.completed);
        assert_eq!((cleared.reps_completed, cleared.weight), (None, Some(102.5)));
    }

    #[tokio::test]
    async fn targets_update_only_what_was_given() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let row = bench_row(&mut conn, &meso.id).await;
        let set = find(&mut *conn, &row, 1).await.unwrap();

        let patch = SetInput {
            rep_range: Some("8-12".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        let updated = update_targets(&mut conn, &set, &patch).await.unwrap();
        assert_eq!(updated, find(&mut *conn, &row, 1).await.unwrap());
        assert_eq!((updated.rep_range_lower, updated.rep_range_upper), (8, 12));
        assert_eq!((updated.rir, updated.weight), (set.rir, set.weight));
    }

    #[test]
    fn input_errors_are_reported_per_field() {
        let err = SetInput {
            rep_range: Some("12-8".into()),
            rir: Some(-1),
            weight: Some(-5.0),
            clear_weight: false,
        }
        .validate()
        .unwrap_err();
        let errs = err.field_errors().unwrap();
        let fields: Vec<_> = errs.iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["rep_range", "rir", "weight"]);

        assert!(validate_log(-1, None).is_err());
        assert!(validate_log(0, Some(0.0)).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn any_removal_leaves_one_to_n(count in 1i64..8, pick in 0i64..8) {
            let target = pick % count + 1;
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let numbers = rt.block_on(async {
                let pool = setup_test_db().await;
                let meso = seed_three_day_plan(&pool, "PPL", 1).await;
                let mut conn = pool.acquire().await.unwrap();
                let row = bench_row(&mut conn, &meso.id).await;
                resize(&mut conn, &row, count).await.unwrap();
                remove(&mut conn, &row, target).await.unwrap();
                numbers(&list(&mut *conn, &row).await.unwrap())
            });
            prop_assert_eq!(numbers, (1..count).collect::<Vec<_>>());
        }
    }
}
