//! Set-by-set comparison against the previous occurrence of a day.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{ExerciseSet, TrainingDayExercise};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetPerformance {
    Increased,
    Decreased,
    Same,
    NoData,
}

/// Compares total volume (weight x reps) of two runs of the same set, so more
/// reps at the same weight counts as progress. Both sets must be completed.
pub fn classify(previous: Option<&ExerciseSet>, current: &ExerciseSet) -> SetPerformance {
    let Some(previous) = previous else {
        return SetPerformance::NoData;
    };
    if !comparable(previous) || !comparable(current) {
        return SetPerformance::NoData;
    }

    let (before, now) = (previous.volume(), current.volume());
    if now > before {
        SetPerformance::Increased
    } else if now < before {
        SetPerformance::Decreased
    } else {
        SetPerformance::Same
    }
}

fn comparable(set: &ExerciseSet) -> bool {
    set.completed && set.reps_completed.is_some()
}

/// Hint to load more weight: last time the top of the rep range was reached.
pub fn should_increase_weight(previous: Option<&ExerciseSet>, current: &ExerciseSet) -> bool {
    previous.is_some_and(|p| {
        comparable(p) && p.reps_completed.unwrap_or(0) >= current.rep_range_upper
    })
}

/// For each exercise of a day, how many earlier rows carry the same catalog
/// exercise. A day may list an exercise twice; the k-th listing of one day
/// pairs with the k-th listing of another.
pub fn occurrence_ranks(exercises: &[TrainingDayExercise]) -> Vec<usize> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    exercises
        .iter()
        .map(|e| {
            let rank = seen.entry(e.exercise_id.as_str()).or_default();
            *rank += 1;
            *rank - 1
        })
        .collect()
}

/// The `rank`-th row of `exercise_id` among `exercises`.
pub fn counterpart<'a>(
    exercises: &'a [TrainingDayExercise],
    exercise_id: &str,
    rank: usize,
) -> Option<&'a TrainingDayExercise> {
    exercises.iter().filter(|e| e.exercise_id == exercise_id).nth(rank)
}

/// Finds the set matching `set_number` in the previous occurrence: same
/// exercise (same listing of it), same set number.
pub fn previous_set<'a>(
    previous_exercises: &'a [TrainingDayExercise],
    exercise_id: &str,
    rank: usize,
    set_number: i64,
) -> Option<&'a ExerciseSet> {
    counterpart(previous_exercises, exercise_id, rank).and_then(|e| e.sets.iter().find(|s| s.number == set_number))
}

/// Totals shown when a session is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub sets: usize,
    pub weight_lifted: f64,
    pub progressions: usize,
}

pub fn summarize(exercises: &[TrainingDayExercise], previous: &[TrainingDayExercise]) -> SessionSummary {
    exercises
        .iter()
        .zip(occurrence_ranks(exercises))
        .flat_map(|(e, rank)| e.sets.iter().map(move |s| (e, rank, s)))
        .fold(SessionSummary::default(), |mut acc, (e, rank, s)| {
            acc.sets += 1;
            acc.weight_lifted += s.volume();
            let prev = previous_set(previous, &e.exercise_id, rank, s.number);
            if classify(prev, s) == SetPerformance::Increased {
                acc.progressions += 1;
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(number: i64, weight: f64, reps: i64) -> ExerciseSet {
        ExerciseSet {
            id: format!("set-{number}"),
            training_day_exercise_id: "tde".into(),
            number,
            rep_range_lower: 5,
            rep_range_upper: 8,
            rir: 1,
            weight: Some(weight),
            completed: true,
            reps_completed: Some(reps),
        }
    }

    fn exercise(exercise_id: &str, sets: Vec<ExerciseSet>) -> TrainingDayExercise {
        TrainingDayExercise {
            id: format!("tde-{exercise_id}"),
            training_day_id: "day".into(),
            exercise_id: exercise_id.into(),
            exercise_name: exercise_id.into(),
            number: 1,
            notes: None,
            sets,
        }
    }

    #[test]
    fn no_previous_set_is_no_data() {
        assert_eq!(classify(None, &done(1, 100.0, 5)), SetPerformance::NoData);
    }

    #[test]
    fn more_reps_at_same_weight_is_progress() {
        let prev = done(1, 100.0, 5);
        assert_eq!(classify(Some(&prev), &done(1, 100.0, 6)), SetPerformance::Increased);
        assert_eq!(classify(Some(&prev), &done(1, 100.0, 4)), SetPerformance::Decreased);
        assert_eq!(classify(Some(&prev), &done(1, 100.0, 5)), SetPerformance::Same);
    }

    #[test]
    fn heavier_but_fewer_reps_compares_volume() {
        // 110 x 4 = 440 < 100 x 5 = 500
        let prev = done(1, 100.0, 5);
        assert_eq!(classify(Some(&prev), &done(1, 110.0, 4)), SetPerformance::Decreased);
    }

    #[test]
    fn incomplete_sets_have_no_data() {
        let prev = done(1, 100.0, 5);
        let mut cur = done(1, 100.0, 8);
        cur.completed = false;
        assert_eq!(classify(Some(&prev), &cur), SetPerformance::NoData);
        // Re-evaluation gives the same answer.
        assert_eq!(classify(Some(&prev), &cur), classify(Some(&prev), &cur));
    }

    #[test]
    fn weight_hint_after_hitting_rep_ceiling() {
        let cur = done(1, 100.0, 0);
        assert!(should_increase_weight(Some(&done(1, 100.0, 8)), &cur));
        assert!(!should_increase_weight(Some(&done(1, 100.0, 7)), &cur));
        assert!(!should_increase_weight(None, &cur));
    }

    #[test]
    fn previous_sets_match_by_exercise_not_position() {
        let previous = vec![
            exercise("row", vec![done(1, 60.0, 10)]),
            exercise("bench", vec![done(1, 80.0, 8), done(2, 80.0, 7)]),
        ];
        let found = previous_set(&previous, "bench", 0, 2).unwrap();
        assert_eq!(found.reps_completed, Some(7));
        assert!(previous_set(&previous, "bench", 0, 3).is_none());
        assert!(previous_set(&previous, "squat", 0, 1).is_none());
    }

    #[test]
    fn repeated_exercise_pairs_with_the_same_listing() {
        let previous = vec![
            exercise("bench", vec![done(1, 100.0, 5)]),
            exercise("row", vec![done(1, 60.0, 10)]),
            exercise("bench", vec![done(1, 60.0, 12)]),
        ];
        assert_eq!(occurrence_ranks(&previous), vec![0, 0, 1]);
        assert_eq!(previous_set(&previous, "bench", 1, 1).unwrap().weight, Some(60.0));
        assert!(previous_set(&previous, "bench", 2, 1).is_none());

        // The back-off set fell short of its own 60 x 12; the heavier first
        // listing is not its baseline.
        let current = vec![
            exercise("bench", vec![done(1, 100.0, 5)]),
            exercise("bench", vec![done(1, 60.0, 11)]),
        ];
        assert_eq!(summarize(&current, &previous).progressions, 0);
    }

    #[test]
    fn summary_counts_sets_volume_and_progressions() {
        let previous = vec![exercise("bench", vec![done(1, 80.0, 8), done(2, 80.0, 7)])];
        let current = vec![exercise(
            "bench",
            vec![done(1, 80.0, 9), done(2, 80.0, 7), done(3, 80.0, 6)],
        )];

        let summary = summarize(&current, &previous);
        assert_eq!(summary.sets, 3);
        assert_eq!(summary.weight_lifted, 80.0 * 22.0);
        assert_eq!(summary.progressions, 1);
    }
}
