//! Shared fixtures for store and tracker tests.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::{
    models::Mesocycle,
    store::{self, mesocycles::NewMesocycle},
};

pub const USER: &str = "tester";

/// In-memory database with every migration applied.
///
/// One connection only: each connection to `sqlite::memory:` is its own
/// database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    crate::db::migrate(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Draft mesocycle of `weeks` weeks with three training days (rest on the
/// last four days of the week). Day 1 gets bench press and day 2 back squat,
/// two sets each at 100kg.
pub async fn seed_three_day_plan(pool: &SqlitePool, name: &str, weeks: i64) -> Mesocycle {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let meso = store::mesocycles::create(
        &mut conn,
        USER,
        &NewMesocycle {
            name: name.to_string(),
            goal: "hypertrophy".to_string(),
            duration_in_weeks: weeks,
            training_days_per_week: 3,
            rest_days: vec![3, 4, 5, 6],
            labels: vec!["Push".into(), "Legs".into(), "Pull".into()],
        },
    )
    .await
    .expect("Failed to create mesocycle");

    for (day, exercise) in [(1, "ex-bench-press"), (2, "ex-back-squat")] {
        let template = store::days::template(&mut *conn, &meso.id, day)
            .await
            .expect("Failed to load template day");
        let tde = store::days::add_exercise(&mut conn, &template.id, exercise)
            .await
            .expect("Failed to add exercise");
        for _ in 0..2 {
            store::sets::append(&mut conn, &tde).await.expect("Failed to add set");
        }
        sqlx::query("UPDATE training_day_sets SET weight = 100.0 WHERE training_day_exercise_id = ?")
            .bind(&tde)
            .execute(&mut *conn)
            .await
            .expect("Failed to set weight");
    }

    meso
}
