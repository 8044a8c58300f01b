use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqliteExecutor};
use tracing::{debug, info};

use crate::{
    calendar::{self, Schedule},
    error::{AppError, FieldErrors, Result, is_unique_violation},
    models::{Mesocycle, MesocycleRun, MesocycleState, format_offsets},
    store::{days, new_id},
};

pub const MAX_NAME_LEN: usize = 100;

const MESOCYCLE_COLUMNS: &str = "id, user_id, name, goal, duration_in_weeks, training_days_per_week, \
     microcycle_length, rest_days, state, start_date, created_at";

/// Input for a new draft mesocycle.
#[derive(Debug, Clone)]
pub struct NewMesocycle {
    pub name: String,
    pub goal: String,
    pub duration_in_weeks: i64,
    pub training_days_per_week: i64,
    /// Rest offsets inside the microcycle; empty means "the rest of the week".
    pub rest_days: Vec<i64>,
    /// Labels for the template days, in order. Missing ones become `Day N`.
    pub labels: Vec<String>,
}

impl NewMesocycle {
    /// Collects every problem with the input, keyed by field.
    pub fn validate(&self) -> Result<Vec<i64>> {
        let mut errs = FieldErrors::new();
        let name = self.name.trim();
        if name.is_empty() {
            errs.insert("name", "A name is required.");
        } else if name.chars().count() > MAX_NAME_LEN {
            errs.insert("name", format!("Names are at most {MAX_NAME_LEN} characters."));
        }
        if self.duration_in_weeks < 1 {
            errs.insert("duration_in_weeks", "A mesocycle lasts at least one week.");
        }
        if self.training_days_per_week < 1 {
            errs.insert("training_days_per_week", "At least one training day is required.");
        }
        if self.labels.len() as i64 > self.training_days_per_week {
            errs.insert("labels", "There are more labels than training days.");
        }

        let rest = if self.rest_days.is_empty() {
            calendar::default_rest_days(self.training_days_per_week.max(0))
        } else {
            self.rest_days.clone()
        };
        if self.training_days_per_week >= 1 {
            let length = self.training_days_per_week + rest.len() as i64;
            if let Err(AppError::Validation(layout)) =
                calendar::validate_layout(self.training_days_per_week, length, &rest)
            {
                for (field, msg) in layout.iter() {
                    errs.insert(field, msg);
                }
            }
        }

        errs.into_result()?;
        Ok(rest)
    }
}

/// Creates a draft mesocycle and one template day per training day.
pub async fn create(conn: &mut SqliteConnection, user: &str, new: &NewMesocycle) -> Result<Mesocycle> {
    let mut rest = new.validate()?;
    rest.sort_unstable();
    let length = new.training_days_per_week + rest.len() as i64;
    let id = new_id();

    let res = sqlx::query(
        r#"
        INSERT INTO mesocycles
          (id, user_id, name, goal, duration_in_weeks, training_days_per_week, microcycle_length, rest_days)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&id)
    .bind(user)
    .bind(new.name.trim())
    .bind(new.goal.trim())
    .bind(new.duration_in_weeks)
    .bind(new.training_days_per_week)
    .bind(length)
    .bind(format_offsets(&rest))
    .execute(&mut *conn)
    .await;

    match res {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::field("name", "A mesocycle with that name already exists."));
        }
        Err(e) => return Err(e.into()),
    }

    for number in 1..=new.training_days_per_week {
        let label = new
            .labels
            .get(number as usize - 1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("Day {number}"));
        days::create_template(&mut *conn, &id, number, &label).await?;
    }

    info!(mesocycle = %id, name = %new.name.trim(), "mesocycle created");
    get(&mut *conn, user, &id).await
}

pub async fn get<'e, E: SqliteExecutor<'e>>(ex: E, user: &str, id: &str) -> Result<Mesocycle> {
    sqlx::query_as::<_, Mesocycle>(&format!(
        "SELECT {MESOCYCLE_COLUMNS} FROM mesocycles WHERE id = ?1 AND user_id = ?2"
    ))
    .bind(id)
    .bind(user)
    .fetch_optional(ex)
    .await?
    .ok_or(AppError::NotFound)
}

/// Every mesocycle of `user`, oldest first. Positions in this list are the
/// 1-based indexes the CLI accepts.
pub async fn list<'e, E: SqliteExecutor<'e>>(ex: E, user: &str) -> Result<Vec<Mesocycle>> {
    Ok(sqlx::query_as::<_, Mesocycle>(&format!(
        "SELECT {MESOCYCLE_COLUMNS} FROM mesocycles WHERE user_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(user)
    .fetch_all(ex)
    .await?)
}

/// Looks a mesocycle up by list index, id or (case-insensitive) name.
pub async fn resolve(conn: &mut SqliteConnection, user: &str, key: &str) -> Result<Mesocycle> {
    let all = list(&mut *conn, user).await?;
    if let Ok(idx) = key.trim().parse::<usize>() {
        return idx
            .checked_sub(1)
            .and_then(|i| all.get(i).cloned())
            .ok_or(AppError::NotFound);
    }
    all.into_iter()
        .find(|m| m.id == key || m.name.eq_ignore_ascii_case(key.trim()))
        .ok_or(AppError::NotFound)
}

pub async fn active<'e, E: SqliteExecutor<'e>>(ex: E, user: &str) -> Result<Option<Mesocycle>> {
    Ok(sqlx::query_as::<_, Mesocycle>(&format!(
        "SELECT {MESOCYCLE_COLUMNS} FROM mesocycles WHERE user_id = ?1 AND state = 'active'"
    ))
    .bind(user)
    .fetch_optional(ex)
    .await?)
}

/// The run in progress, if the mesocycle has one.
pub async fn open_run<'e, E: SqliteExecutor<'e>>(ex: E, mesocycle_id: &str) -> Result<Option<MesocycleRun>> {
    Ok(sqlx::query_as::<_, MesocycleRun>(
        r#"
        SELECT id, mesocycle_id, start_date, end_date
        FROM   mesocycle_runs
        WHERE  mesocycle_id = ?1 AND end_date IS NULL
        "#,
    )
    .bind(mesocycle_id)
    .fetch_optional(ex)
    .await?)
}

/// The most recently started run, finished or not.
pub async fn last_run<'e, E: SqliteExecutor<'e>>(ex: E, mesocycle_id: &str) -> Result<Option<MesocycleRun>> {
    Ok(sqlx::query_as::<_, MesocycleRun>(
        r#"
        SELECT id, mesocycle_id, start_date, end_date
        FROM   mesocycle_runs
        WHERE  mesocycle_id = ?1
        ORDER  BY start_date DESC, rowid DESC
        LIMIT  1
        "#,
    )
    .bind(mesocycle_id)
    .fetch_optional(ex)
    .await?)
}

/// Starts a run on `start_date` and lays out every occurrence of the
/// template days, copying their exercises and sets.
pub async fn start(
    conn: &mut SqliteConnection,
    user: &str,
    id: &str,
    start_date: NaiveDate,
) -> Result<MesocycleRun> {
    let meso = get(&mut *conn, user, id).await?;
    if meso.state == MesocycleState::Active {
        return Err(AppError::invalid_state("The mesocycle is already running."));
    }
    if let Some(other) = active(&mut *conn, user).await? {
        return Err(AppError::invalid_state(format!(
            "Mesocycle \"{}\" is already active; stop it first.",
            other.name
        )));
    }

    if let Some(end) = last_run(&mut *conn, id).await?.and_then(|r| r.end_date) {
        if start_date <= end {
            return Err(AppError::field(
                "start_date",
                format!("The previous run ended on {end}; start a new one after that."),
            ));
        }
    }

    let schedule = Schedule::new(
        start_date,
        meso.duration_in_weeks,
        meso.microcycle_length,
        &meso.rest_day_offsets(),
    )?;

    sqlx::query("UPDATE mesocycles SET state = 'active', start_date = ?1 WHERE id = ?2")
        .bind(start_date)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let run = MesocycleRun {
        id: new_id(),
        mesocycle_id: id.to_string(),
        start_date,
        end_date: None,
    };
    sqlx::query("INSERT INTO mesocycle_runs (id, mesocycle_id, start_date) VALUES (?1, ?2, ?3)")
        .bind(&run.id)
        .bind(id)
        .bind(start_date)
        .execute(&mut *conn)
        .await?;

    let templates = days::templates(&mut *conn, id).await?;
    for occ in schedule.occurrences() {
        let Some(template) = templates.iter().find(|t| t.number == occ.training_day_number) else {
            continue;
        };
        let day_id = new_id();
        sqlx::query(
            r#"
            INSERT INTO training_days
              (id, mesocycle_id, number, label, run_id, template_id, microcycle_number, date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&day_id)
        .bind(id)
        .bind(template.number)
        .bind(&template.label)
        .bind(&run.id)
        .bind(&template.id)
        .bind(occ.microcycle_number)
        .bind(occ.date)
        .execute(&mut *conn)
        .await?;
        days::copy_contents(&mut *conn, &template.id, &day_id).await?;
    }

    info!(mesocycle = %id, run = %run.id, %start_date, end = %schedule.end_date(), "mesocycle started");
    Ok(run)
}

/// Ends the active run. The run closes on `today`, or on the plan's last day
/// when that came first.
pub async fn stop(conn: &mut SqliteConnection, user: &str, id: &str, today: NaiveDate) -> Result<MesocycleRun> {
    let meso = get(&mut *conn, user, id).await?;
    if meso.state != MesocycleState::Active {
        return Err(AppError::invalid_state("The mesocycle is not running."));
    }
    let end = match meso.schedule() {
        Some(schedule) => {
            let schedule = schedule?;
            today.min(schedule.end_date()).max(schedule.start_date)
        }
        None => today,
    };
    complete(&mut *conn, &meso, end).await
}

/// Completes the user's active mesocycle if its last day is behind `today`.
/// Returns the mesocycle that expired.
pub async fn settle_expired(conn: &mut SqliteConnection, user: &str, today: NaiveDate) -> Result<Option<Mesocycle>> {
    let Some(meso) = active(&mut *conn, user).await? else {
        return Ok(None);
    };
    let Some(schedule) = meso.schedule() else {
        return Ok(None);
    };
    let end = schedule?.end_date();
    if end >= today {
        return Ok(None);
    }

    complete(&mut *conn, &meso, end).await?;
    info!(mesocycle = %meso.id, %end, "mesocycle expired");
    get(&mut *conn, user, &meso.id).await.map(Some)
}

async fn complete(conn: &mut SqliteConnection, meso: &Mesocycle, end: NaiveDate) -> Result<MesocycleRun> {
    sqlx::query("UPDATE mesocycles SET state = 'completed' WHERE id = ?1")
        .bind(&meso.id)
        .execute(&mut *conn)
        .await?;

    let mut run = open_run(&mut *conn, &meso.id)
        .await?
        .ok_or_else(|| AppError::invalid_state("The mesocycle has no open run."))?;
    let end = end.max(run.start_date);
    sqlx::query("UPDATE mesocycle_runs SET end_date = ?1 WHERE id = ?2")
        .bind(end)
        .bind(&run.id)
        .execute(&mut *conn)
        .await?;
    run.end_date = Some(end);

    debug!(mesocycle = %meso.id, run = %run.id, %end, "run closed");
    Ok(run)
}

/// A run with how much of it was trained.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RunSummary {
    pub id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub days_total: i64,
    pub days_completed: i64,
}

/// Every run of a mesocycle, newest first.
pub async fn history<'e, E: SqliteExecutor<'e>>(ex: E, mesocycle_id: &str) -> Result<Vec<RunSummary>> {
    Ok(sqlx::query_as::<_, RunSummary>(
        r#"
        SELECT r.id, r.start_date, r.end_date,
               COUNT(d.id)                         AS days_total,
               COALESCE(SUM(d.completed), 0)       AS days_completed
        FROM   mesocycle_runs r
        LEFT   JOIN training_days d ON d.run_id = r.id
        WHERE  r.mesocycle_id = ?1
        GROUP  BY r.id
        ORDER  BY r.start_date DESC, r.rowid DESC
        "#,
    )
    .bind(mesocycle_id)
    .fetch_all(ex)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{USER, date, seed_three_day_plan, setup_test_db};

    fn new(name: &str) -> NewMesocycle {
        NewMesocycle {
            name: name.into(),
            goal: String::new(),
            duration_in_weeks: 4,
            training_days_per_week: 4,
            rest_days: vec![],
            labels: vec!["Upper".into()],
        }
    }

    #[tokio::test]
    async fn create_lays_out_template_days() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let meso = create(&mut conn, USER, &new("Block A")).await.unwrap();
        assert_eq!(meso.state, MesocycleState::Draft);
        assert_eq!(meso.microcycle_length, 7);
        assert_eq!(meso.rest_day_offsets(), vec![4, 5, 6]);

        let templates = days::templates(&mut *conn, &meso.id).await.unwrap();
        let labels: Vec<_> = templates.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["Upper", "Day 2", "Day 3", "Day 4"]);
    }

    #[tokio::test]
    async fn duplicate_names_are_a_field_error() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        create(&mut conn, USER, &new("Block A")).await.unwrap();
        let err = create(&mut conn, USER, &new("Block A")).await.unwrap_err();
        assert_eq!(
            err.field_errors().and_then(|e| e.get("name")),
            Some("A mesocycle with that name already exists.")
        );
        // Another user may reuse it.
        assert!(create(&mut conn, "someone-else", &new("Block A")).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_layout_reports_every_field() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut bad = new("");
        bad.duration_in_weeks = 0;
        bad.rest_days = vec![2, 2];
        let err = create(&mut conn, USER, &bad).await.unwrap_err();
        let errs = err.field_errors().unwrap();
        assert!(errs.get("name").is_some());
        assert!(errs.get("duration_in_weeks").is_some());
        assert!(errs.get("rest_days").is_some());
    }

    #[tokio::test]
    async fn start_materializes_every_occurrence() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 2).await;
        let mut conn = pool.acquire().await.unwrap();

        let run = start(&mut conn, USER, &meso.id, date(2024, 1, 1)).await.unwrap();
        assert_eq!(run.end_date, None);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_days WHERE run_id = ?1")
            .bind(&run.id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 6);

        let day = days::occurrence(&mut *conn, &run.id, 2, 1).await.unwrap().unwrap();
        assert_eq!(day.date, Some(date(2024, 1, 8)));
        let exercises = days::exercises(&mut conn, &day.id).await.unwrap();
        assert_eq!(exercises.len(), 1);
        assert_eq!(exercises[0].sets.len(), 2);
        assert!(exercises[0].sets.iter().all(|s| !s.completed && s.weight == Some(100.0)));
    }

    #[tokio::test]
    async fn only_one_active_mesocycle() {
        let pool = setup_test_db().await;
        let a = seed_three_day_plan(&pool, "A", 2).await;
        let b = seed_three_day_plan(&pool, "B", 2).await;
        let mut conn = pool.acquire().await.unwrap();

        start(&mut conn, USER, &a.id, date(2024, 1, 1)).await.unwrap();
        let err = start(&mut conn, USER, &b.id, date(2024, 1, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        let err = start(&mut conn, USER, &a.id, date(2024, 1, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn stop_closes_the_run() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 4).await;
        let mut conn = pool.acquire().await.unwrap();

        start(&mut conn, USER, &meso.id, date(2024, 1, 1)).await.unwrap();
        let run = stop(&mut conn, USER, &meso.id, date(2024, 1, 10)).await.unwrap();
        assert_eq!(run.end_date, Some(date(2024, 1, 10)));
        assert_eq!(get(&mut *conn, USER, &meso.id).await.unwrap().state, MesocycleState::Completed);
        assert!(active(&mut *conn, USER).await.unwrap().is_none());

        let err = stop(&mut conn, USER, &meso.id, date(2024, 1, 11)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn a_new_run_starts_after_the_previous_one_ended() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 4).await;
        let mut conn = pool.acquire().await.unwrap();

        start(&mut conn, USER, &meso.id, date(2024, 1, 1)).await.unwrap();
        stop(&mut conn, USER, &meso.id, date(2024, 1, 10)).await.unwrap();

        for overlapping in [date(2024, 1, 5), date(2024, 1, 10), date(2023, 12, 1)] {
            let err = start(&mut conn, USER, &meso.id, overlapping).await.unwrap_err();
            assert!(err.field_errors().and_then(|e| e.get("start_date")).is_some());
        }
        assert_eq!(get(&mut *conn, USER, &meso.id).await.unwrap().state, MesocycleState::Completed);

        let run = start(&mut conn, USER, &meso.id, date(2024, 1, 11)).await.unwrap();
        assert_eq!(run.start_date, date(2024, 1, 11));
        assert_eq!(history(&mut *conn, &meso.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn expired_mesocycles_complete_on_their_last_day() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();
        start(&mut conn, USER, &meso.id, date(2024, 1, 1)).await.unwrap();

        assert!(settle_expired(&mut conn, USER, date(2024, 1, 7)).await.unwrap().is_none());
        let expired = settle_expired(&mut conn, USER, date(2024, 1, 20)).await.unwrap().unwrap();
        assert_eq!(expired.state, MesocycleState::Completed);

        let runs = history(&mut *conn, &meso.id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].end_date, Some(date(2024, 1, 7)));
        assert_eq!((runs[0].days_total, runs[0].days_completed), (3, 0));
    }

    #[tokio::test]
    async fn other_users_cannot_see_a_mesocycle() {
        let pool = setup_test_db().await;
        let meso = seed_three_day_plan(&pool, "PPL", 1).await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(matches!(get(&mut *conn, "intruder", &meso.id).await, Err(AppError::NotFound)));
        assert!(matches!(
            start(&mut conn, "intruder", &meso.id, date(2024, 1, 1)).await,
            Err(AppError::NotFound)
        ));
        assert_eq!(resolve(&mut conn, USER, "1").await.unwrap().id, meso.id);
        assert_eq!(resolve(&mut conn, USER, "ppl").await.unwrap().id, meso.id);
    }
}
