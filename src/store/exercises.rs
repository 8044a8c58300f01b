use itertools::Itertools;
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::{debug, info};

use crate::{
    error::{AppError, FieldErrors, Result, is_foreign_key_violation, is_unique_violation},
    models::Exercise,
    search,
    store::new_id,
    types::canonical_muscles,
};

pub const MAX_NAME_LEN: usize = 100;

const IN_USE: &str = "This exercise is used in one or more training days and cannot be deleted.";

/// Adds a private exercise for `user`.
pub async fn create(conn: &mut SqliteConnection, user: &str, name: &str, muscles: &[String]) -> Result<Exercise> {
    let mut errs = FieldErrors::new();
    let name = name.trim();
    if name.is_empty() {
        errs.insert("name", "A name is required.");
    } else if name.chars().count() > MAX_NAME_LEN {
        errs.insert("name", format!("Names are at most {MAX_NAME_LEN} characters."));
    }
    let muscles = match canonical_muscles(muscles) {
        Ok(m) => m,
        Err(AppError::Validation(e)) => {
            for (field, msg) in e.iter() {
                errs.insert(field, msg);
            }
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    errs.into_result()?;

    let id = new_id();
    let res = sqlx::query("INSERT INTO exercises (id, user_id, name) VALUES (?1, ?2, ?3)")
        .bind(&id)
        .bind(user)
        .bind(name)
        .execute(&mut *conn)
        .await;
    match res {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::field("name", "An exercise with that name already exists."));
        }
        Err(e) => return Err(e.into()),
    }

    for muscle in &muscles {
        sqlx::query(
            r#"
            INSERT INTO exercise_muscle_groups (exercise_id, muscle_group_id)
            SELECT ?1, id FROM muscle_groups WHERE name = ?2
            "#,
        )
        .bind(&id)
        .bind(muscle)
        .execute(&mut *conn)
        .await?;
    }

    debug!(exercise = %id, name, "exercise created");
    Ok(Exercise {
        id,
        user_id: Some(user.to_string()),
        name: name.to_string(),
        shared: false,
        muscle_groups: muscles,
    })
}

/// Everything `user` can pick from: their own exercises and the shared ones,
/// by name.
pub async fn visible(conn: &mut SqliteConnection, user: &str) -> Result<Vec<Exercise>> {
    let mut exercises = sqlx::query_as::<_, Exercise>(
        r#"
        SELECT id, user_id, name, shared
        FROM   exercises
        WHERE  user_id = ?1 OR shared = 1
        ORDER  BY name COLLATE NOCASE, user_id IS NULL
        "#,
    )
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;

    let links: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT emg.exercise_id, mg.name
        FROM   exercise_muscle_groups emg
        JOIN   muscle_groups mg ON mg.id = emg.muscle_group_id
        ORDER  BY mg.name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut by_exercise = links.into_iter().into_group_map();
    for ex in &mut exercises {
        ex.muscle_groups = by_exercise.remove(&ex.id).unwrap_or_default();
    }
    Ok(exercises)
}

/// Visible exercises whose name or muscle groups match `query`. A blank
/// query lists everything.
pub async fn search(conn: &mut SqliteConnection, user: &str, query: &str) -> Result<Vec<Exercise>> {
    search::validate(query)?;
    let all = visible(conn, user).await?;
    let Some(q) = search::normalize(query) else {
        return Ok(all);
    };
    debug!(%q, "searching exercises");
    Ok(all
        .into_iter()
        .filter(|e| q.matches(&e.name) || e.muscle_groups.iter().any(|m| q.matches(m)))
        .collect())
}

/// Finds a visible exercise by id or case-insensitive name, preferring the
/// user's own over a shared one with the same name.
pub async fn resolve<'e, E: SqliteExecutor<'e>>(ex: E, user: &str, key: &str) -> Result<Exercise> {
    sqlx::query_as::<_, Exercise>(
        r#"
        SELECT id, user_id, name, shared
        FROM   exercises
        WHERE  (user_id = ?1 OR shared = 1)
          AND  (id = ?2 OR name = ?2 COLLATE NOCASE)
        ORDER  BY user_id IS NULL
        LIMIT  1
        "#,
    )
    .bind(user)
    .bind(key.trim())
    .fetch_optional(ex)
    .await?
    .ok_or(AppError::NotFound)
}

/// Deletes exercises owned by `user`, all or nothing. Shared exercises and
/// other users' ones are not found; an exercise still placed on a training
/// day is a conflict on `exercise`.
pub async fn delete_many(conn: &mut SqliteConnection, user: &str, ids: &[String]) -> Result<u64> {
    let mut deleted = 0;
    for id in ids.iter().unique() {
        let res = sqlx::query("DELETE FROM exercises WHERE id = ?1 AND user_id = ?2 AND shared = 0")
            .bind(id)
            .bind(user)
            .execute(&mut *conn)
            .await;
        match res {
            Ok(r) if r.rows_affected() == 0 => return Err(AppError::NotFound),
            Ok(r) => deleted += r.rows_affected(),
            Err(e) if is_foreign_key_violation(&e) => return Err(AppError::conflict("exercise", IN_USE)),
            Err(e) => return Err(e.into()),
        }
    }

    info!(user, deleted, "exercises deleted");
    Ok(deleted)
}
