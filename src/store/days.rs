use chrono::NaiveDate;
use itertools::Itertools;
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::debug;

use crate::{
    error::{AppError, Result},
    models::{ExerciseSet, TrainingDay, TrainingDayExercise},
    progress,
    session::SetProgress,
    store::{new_id, sets},
};

const DAY_COLUMNS: &str = "id, mesocycle_id, number, label, run_id, template_id, microcycle_number, date, \
     completed, reopened, completed_at, feedback, carried_set_counts";

pub async fn create_template<'e, E: SqliteExecutor<'e>>(
    ex: E,
    mesocycle_id: &str,
    number: i64,
    label: &str,
) -> Result<String> {
    let id = new_id();
    sqlx::query("INSERT INTO training_days (id, mesocycle_id, number, label) VALUES (?1, ?2, ?3, ?4)")
        .bind(&id)
        .bind(mesocycle_id)
        .bind(number)
        .bind(label)
        .execute(ex)
        .await?;
    Ok(id)
}

/// Template day `number` of a mesocycle.
pub async fn template<'e, E: SqliteExecutor<'e>>(ex: E, mesocycle_id: &str, number: i64) -> Result<TrainingDay> {
    sqlx::query_as::<_, TrainingDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM training_days WHERE mesocycle_id = ?1 AND number = ?2 AND run_id IS NULL"
    ))
    .bind(mesocycle_id)
    .bind(number)
    .fetch_optional(ex)
    .await?
    .ok_or(AppError::NotFound)
}

pub async fn templates<'e, E: SqliteExecutor<'e>>(ex: E, mesocycle_id: &str) -> Result<Vec<TrainingDay>> {
    Ok(sqlx::query_as::<_, TrainingDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM training_days WHERE mesocycle_id = ?1 AND run_id IS NULL ORDER BY number"
    ))
    .bind(mesocycle_id)
    .fetch_all(ex)
    .await?)
}

/// The realized day for one slot of a run.
pub async fn occurrence<'e, E: SqliteExecutor<'e>>(
    ex: E,
    run_id: &str,
    microcycle_number: i64,
    number: i64,
) -> Result<Option<TrainingDay>> {
    Ok(sqlx::query_as::<_, TrainingDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM training_days WHERE run_id = ?1 AND microcycle_number = ?2 AND number = ?3"
    ))
    .bind(run_id)
    .bind(microcycle_number)
    .bind(number)
    .fetch_optional(ex)
    .await?)
}

/// Realized days of a run between two dates, inclusive.
pub async fn occurrences_between<'e, E: SqliteExecutor<'e>>(
    ex: E,
    run_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<TrainingDay>> {
    Ok(sqlx::query_as::<_, TrainingDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM training_days WHERE run_id = ?1 AND date BETWEEN ?2 AND ?3 ORDER BY date"
    ))
    .bind(run_id)
    .bind(from)
    .bind(to)
    .fetch_all(ex)
    .await?)
}

/// The last finished occurrence of the same template before `day`, in this
/// run or an earlier one.
pub async fn previous_occurrence<'e, E: SqliteExecutor<'e>>(ex: E, day: &TrainingDay) -> Result<Option<TrainingDay>> {
    let (Some(template_id), Some(date)) = (&day.template_id, day.date) else {
        return Ok(None);
    };
    Ok(sqlx::query_as::<_, TrainingDay>(&format!(
        r#"
        SELECT {DAY_COLUMNS}
        FROM   training_days
        WHERE  template_id = ?1 AND date < ?2 AND completed = 1
        ORDER  BY date DESC
        LIMIT  1
        "#
    ))
    .bind(template_id)
    .bind(date)
    .fetch_optional(ex)
    .await?)
}

/// Exercises of a day in order, each with its sets.
pub async fn exercises(conn: &mut SqliteConnection, day_id: &str) -> Result<Vec<TrainingDayExercise>> {
    let mut exercises = sqlx::query_as::<_, TrainingDayExercise>(
        r#"
        SELECT tde.id, tde.training_day_id, tde.exercise_id, e.name AS exercise_name, tde.number, tde.notes
        FROM   training_day_exercises tde
        JOIN   exercises e ON e.id = tde.exercise_id
        WHERE  tde.training_day_id = ?1
        ORDER  BY tde.number
        "#,
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await?;

    let all_sets = sqlx::query_as::<_, ExerciseSet>(
        r#"
        SELECT s.id, s.training_day_exercise_id, s.number, s.rep_range_lower, s.rep_range_upper,
               s.rir, s.weight, s.completed, s.reps_completed
        FROM   training_day_sets s
        JOIN   training_day_exercises tde ON tde.id = s.training_day_exercise_id
        WHERE  tde.training_day_id = ?1
        ORDER  BY s.number
        "#,
    )
    .bind(day_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_exercise = all_sets.into_iter().into_group_map_by(|s| s.training_day_exercise_id.clone());
    for exercise in &mut exercises {
        exercise.sets = by_exercise.remove(&exercise.id).unwrap_or_default();
    }
    Ok(exercises)
}

/// Completion counts over all sets of a day.
pub async fn progress<'e, E: SqliteExecutor<'e>>(ex: E, day_id: &str) -> Result<SetProgress> {
    let (total, completed): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(s.id), COALESCE(SUM(s.completed), 0)
        FROM   training_day_sets s
        JOIN   training_day_exercises tde ON tde.id = s.training_day_exercise_id
        WHERE  tde.training_day_id = ?1
        "#,
    )
    .bind(day_id)
    .fetch_one(ex)
    .await?;
    Ok(SetProgress::new(total as usize, completed as usize))
}

/// Exercise `number` of a day.
pub async fn exercise_at<'e, E: SqliteExecutor<'e>>(ex: E, day_id: &str, number: i64) -> Result<TrainingDayExercise> {
    sqlx::query_as::<_, TrainingDayExercise>(
        r#"
        SELECT tde.id, tde.training_day_id, tde.exercise_id, e.name AS exercise_name, tde.number, tde.notes
        FROM   training_day_exercises tde
        JOIN   exercises e ON e.id = tde.exercise_id
        WHERE  tde.training_day_id = ?1 AND tde.number = ?2
        "#,
    )
    .bind(day_id)
    .bind(number)
    .fetch_optional(ex)
    .await?
    .ok_or(AppError::NotFound)
}

/// Appends `exercise_id` to a day and returns the new row's id.
pub async fn add_exercise(conn: &mut SqliteConnection, day_id: &str, exercise_id: &str) -> Result<String> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(number), 0) + 1 FROM training_day_exercises WHERE training_day_id = ?1",
    )
    .bind(day_id)
    .fetch_one(&mut *conn)
    .await?;

    let id = new_id();
    sqlx::query(
        "INSERT INTO training_day_exercises (id, training_day_id, exercise_id, number) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&id)
    .bind(day_id)
    .bind(exercise_id)
    .bind(next)
    .execute(&mut *conn)
    .await?;

    debug!(day = %day_id, exercise = %exercise_id, number = next, "exercise added");
    Ok(id)
}

/// Removes exercise `number` (and its sets) and closes the gap.
pub async fn remove_exercise(conn: &mut SqliteConnection, day_id: &str, number: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM training_day_exercises WHERE training_day_id = ?1 AND number = ?2")
        .bind(day_id)
        .bind(number)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    sqlx::query("UPDATE training_day_exercises SET number = number - 1 WHERE training_day_id = ?1 AND number > ?2")
        .bind(day_id)
        .bind(number)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Moves exercise `from` to position `to`, shifting the ones in between.
pub async fn move_exercise(conn: &mut SqliteConnection, day_id: &str, from: i64, to: i64) -> Result<()> {
    let moving = exercise_at(&mut *conn, day_id, from).await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_day_exercises WHERE training_day_id = ?1")
        .bind(day_id)
        .fetch_one(&mut *conn)
        .await?;
    if to < 1 || to > count {
        return Err(AppError::field("position", format!("Position must be between 1 and {count}.")));
    }
    if from == to {
        return Ok(());
    }

    let shift = if from < to {
        "UPDATE training_day_exercises SET number = number - 1 WHERE training_day_id = ?1 AND number > ?2 AND number <= ?3"
    } else {
        "UPDATE training_day_exercises SET number = number + 1 WHERE training_day_id = ?1 AND number >= ?3 AND number < ?2"
    };
    sqlx::query(shift)
        .bind(day_id)
        .bind(from)
        .bind(to)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE training_day_exercises SET number = ?1 WHERE id = ?2")
        .bind(to)
        .bind(&moving.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_notes<'e, E: SqliteExecutor<'e>>(ex: E, exercise_row_id: &str, notes: Option<&str>) -> Result<()> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty());
    sqlx::query("UPDATE training_day_exercises SET notes = ?1 WHERE id = ?2")
        .bind(notes)
        .bind(exercise_row_id)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn relabel<'e, E: SqliteExecutor<'e>>(ex: E, day_id: &str, label: &str) -> Result<()> {
    let label = label.trim();
    if label.is_empty() {
        return Err(AppError::field("label", "A label is required."));
    }
    sqlx::query("UPDATE training_days SET label = ?1 WHERE id = ?2")
        .bind(label)
        .bind(day_id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Copies the exercises and sets of `from` onto `to`. Copied sets start
/// incomplete.
pub async fn copy_contents(conn: &mut SqliteConnection, from: &str, to: &str) -> Result<()> {
    let source: Vec<(String, String, i64, Option<String>)> = sqlx::query_as(
        "SELECT id, exercise_id, number, notes FROM training_day_exercises WHERE training_day_id = ?1 ORDER BY number",
    )
    .bind(from)
    .fetch_all(&mut *conn)
    .await?;

    for (source_id, exercise_id, number, notes) in source {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO training_day_exercises (id, training_day_id, exercise_id, number, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(to)
        .bind(&exercise_id)
        .bind(number)
        .bind(notes)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO training_day_sets
              (id, training_day_exercise_id, number, rep_range_lower, rep_range_upper, rir, weight)
            SELECT lower(hex(randomblob(16))), ?1, number, rep_range_lower, rep_range_upper, rir, weight
            FROM   training_day_sets
            WHERE  training_day_exercise_id = ?2
            "#,
        )
        .bind(&id)
        .bind(&source_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Per-exercise set counts in day order, e.g. `ex-bench-press=3;ex-pull-up=2`.
/// Stored on finish so re-finishing an unchanged day does not carry again.
pub fn set_count_signature(exercises: &[TrainingDayExercise]) -> String {
    exercises
        .iter()
        .map(|e| format!("{}={}", e.exercise_id, e.sets.len()))
        .join(";")
}

pub async fn mark_finished<'e, E: SqliteExecutor<'e>>(
    ex: E,
    day_id: &str,
    feedback: Option<&str>,
    signature: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE training_days
        SET    completed = 1, reopened = 0, completed_at = datetime('now'),
               feedback = COALESCE(?1, feedback), carried_set_counts = ?2
        WHERE  id = ?3
        "#,
    )
    .bind(feedback.map(str::trim).filter(|f| !f.is_empty()))
    .bind(signature)
    .bind(day_id)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn reopen<'e, E: SqliteExecutor<'e>>(ex: E, day_id: &str) -> Result<()> {
    sqlx::query("UPDATE training_days SET reopened = 1 WHERE id = ?1 AND completed = 1")
        .bind(day_id)
        .execute(ex)
        .await?;
    Ok(())
}

/// Resizes each exercise of the next occurrence of `day` to the set counts
/// `day` finished with. Exercises are matched by catalog exercise (the k-th
/// listing with the k-th listing); ones that only exist on one side are left
/// alone. Returns the day that changed.
pub async fn carry_forward(
    conn: &mut SqliteConnection,
    day: &TrainingDay,
    finished: &[TrainingDayExercise],
) -> Result<Option<TrainingDay>> {
    let (Some(run_id), Some(microcycle)) = (&day.run_id, day.microcycle_number) else {
        return Ok(None);
    };
    let Some(next) = occurrence(&mut *conn, run_id, microcycle + 1, day.number).await? else {
        return Ok(None);
    };
    if next.completed {
        return Ok(None);
    }

    let targets = exercises(&mut *conn, &next.id).await?;
    for (done, rank) in finished.iter().zip(progress::occurrence_ranks(finished)) {
        let Some(target) = progress::counterpart(&targets, &done.exercise_id, rank) else {
            continue;
        };
        sets::resize(&mut *conn, &target.id, done.sets.len() as i64).await?;
    }

    debug!(from = %day.id, to = %next.id, "set counts carried forward");
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::mesocycles,
        test_utils::{USER, date, seed_three_day_plan, setup_test_db},
    };

    #[tokio::test]
    async fn removing_an_exercise_renumbers_the_rest() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let day = template(&mut *conn, &meso.id, 1).await.unwrap();

        add_exercise(&mut conn, &day.id, "ex-overhead-press").await.unwrap();
        add_exercise(&mut conn, &day.id, "ex-triceps-pushdown").await.unwrap();
        remove_exercise(&mut conn, &day.id, 2).await.unwrap();

        let left = exercises(&mut conn, &day.id).await.unwrap();
        let order: Vec<_> = left.iter().map(|e| (e.number, e.exercise_id.as_str())).collect();
        assert_eq!(order, [(1, "ex-bench-press"), (2, "ex-triceps-pushdown")]);

        assert!(matches!(remove_exercise(&mut conn, &day.id, 9).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn moving_an_exercise_shifts_the_others() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let day = template(&mut *conn, &meso.id, 1).await.unwrap();
        add_exercise(&mut conn, &day.id, "ex-overhead-press").await.unwrap();
        add_exercise(&mut conn, &day.id, "ex-triceps-pushdown").await.unwrap();

        move_exercise(&mut conn, &day.id, 3, 1).await.unwrap();
        let ids: Vec<_> = exercises(&mut conn, &day.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.exercise_id)
            .collect();
        assert_eq!(ids, ["ex-triceps-pushdown", "ex-bench-press", "ex-overhead-press"]);

        let err = move_exercise(&mut conn, &day.id, 1, 4).await.unwrap_err();
        assert!(err.field_errors().and_then(|e| e.get("position")).is_some());
    }

    #[tokio::test]
    async fn signature_lists_set_counts_in_order() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let day = template(&mut *conn, &meso.id, 2).await.unwrap();

        let exercises = exercises(&mut conn, &day.id).await.unwrap();
        assert_eq!(set_count_signature(&exercises), "ex-back-squat=2");
        assert_eq!(progress(&mut *conn, &day.id).await.unwrap(), SetProgress::new(2, 0));
    }

    #[tokio::test]
    async fn carry_forward_pairs_repeated_exercises_by_listing() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 2).await;
        let mut conn = pool.acquire().await.unwrap();
        let push = template(&mut *conn, &meso.id, 1).await.unwrap();
        let backoff = add_exercise(&mut conn, &push.id, "ex-bench-press").await.unwrap();
        sets::resize(&mut conn, &backoff, 4).await.unwrap();

        let run = mesocycles::start(&mut conn, USER, &meso.id, date(2024, 1, 1)).await.unwrap();
        let week1 = occurrence(&mut *conn, &run.id, 1, 1).await.unwrap().unwrap();
        let rows = exercises(&mut conn, &week1.id).await.unwrap();
        sets::resize(&mut conn, &rows[0].id, 3).await.unwrap();
        sets::resize(&mut conn, &rows[1].id, 1).await.unwrap();

        let finished = exercises(&mut conn, &week1.id).await.unwrap();
        let next = carry_forward(&mut conn, &week1, &finished).await.unwrap().unwrap();
        let counts: Vec<_> = exercises(&mut conn, &next.id)
            .await
            .unwrap()
            .iter()
            .map(|e| (e.exercise_id.clone(), e.sets.len()))
            .collect();
        assert_eq!(
            counts,
            [("ex-bench-press".to_string(), 3), ("ex-bench-press".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn blank_labels_are_rejected() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        let day = template(&mut *conn, &meso.id, 3).await.unwrap();
        assert_eq!(day.label, "Pull");

        assert!(relabel(&mut *conn, &day.id, "  ").await.is_err());
        relabel(&mut *conn, &day.id, "Back").await.unwrap();
        assert_eq!(template(&mut *conn, &meso.id, 3).await.unwrap().label, "Back");
    }
}
