//! Day resolution for a running mesocycle.
//!
//! A mesocycle lasts `duration_in_weeks * 7` calendar days starting at its
//! start date. Those days are cut into microcycles of `microcycle_length`
//! days; inside every microcycle the offsets listed in `rest_days` are rest
//! days and the remaining offsets map, in order, onto training days 1..=N.

use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use serde::Serialize;

use crate::error::{AppError, FieldErrors, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub start_date: NaiveDate,
    pub duration_in_weeks: i64,
    pub microcycle_length: i64,
    /// 0-based offsets inside a microcycle, ascending.
    pub rest_days: Vec<i64>,
}

/// Why a date has no day in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum OutOfRange {
    BeforeStart { starts: NaiveDate },
    AfterEnd { ended: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedDay {
    pub date: NaiveDate,
    /// 1-based position inside the microcycle.
    pub day_number: i64,
    pub microcycle_number: i64,
    /// Template number for training days, `None` on rest days.
    pub training_day_number: Option<i64>,
    pub is_future_session: bool,
}

impl ResolvedDay {
    pub fn is_training_day(&self) -> bool {
        self.training_day_number.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Day(ResolvedDay),
    OutOfRange(OutOfRange),
}

impl Resolution {
    pub fn day(&self) -> Option<&ResolvedDay> {
        match self {
            Self::Day(day) => Some(day),
            Self::OutOfRange(_) => None,
        }
    }
}

/// One planned training day on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub microcycle_number: i64,
    pub training_day_number: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_planned_training_day: bool,
    pub is_current: bool,
}

/// Checks a microcycle layout: `rest_days` must be distinct offsets below
/// `microcycle_length` and leave exactly `training_days` slots free.
pub fn validate_layout(training_days: i64, microcycle_length: i64, rest_days: &[i64]) -> Result<()> {
    let mut errs = FieldErrors::new();

    if training_days < 1 {
        errs.insert("training_days_per_week", "At least one training day is required.");
    }
    if microcycle_length < 1 {
        errs.insert("microcycle_length", "The microcycle must be at least one day long.");
    }
    if rest_days.iter().any(|&r| r < 0 || r >= microcycle_length) {
        errs.insert("rest_days", "Rest days must fall inside the microcycle.");
    } else if !rest_days.iter().all_unique() {
        errs.insert("rest_days", "Rest days must not repeat.");
    } else if microcycle_length - rest_days.len() as i64 != training_days {
        errs.insert(
            "rest_days",
            format!(
                "{} training days and {} rest days do not make a {}-day microcycle.",
                training_days,
                rest_days.len(),
                microcycle_length
            ),
        );
    }

    errs.into_result()
}

/// Rest offsets that fill a 7-day week after `training_days` training days.
pub fn default_rest_days(training_days: i64) -> Vec<i64> {
    (training_days..7).collect()
}

impl Schedule {
    pub fn new(
        start_date: NaiveDate,
        duration_in_weeks: i64,
        microcycle_length: i64,
        rest_days: &[i64],
    ) -> Result<Self> {
        if duration_in_weeks < 1 {
            return Err(AppError::field(
                "duration_in_weeks",
                "The mesocycle must last at least one week.",
            ));
        }
        let training_days = microcycle_length - rest_days.len() as i64;
        validate_layout(training_days, microcycle_length, rest_days)?;

        Ok(Self {
            start_date,
            duration_in_weeks,
            microcycle_length,
            rest_days: rest_days.iter().copied().sorted().collect(),
        })
    }

    pub fn total_days(&self) -> i64 {
        self.duration_in_weeks * 7
    }

    /// Last calendar day of the plan.
    pub fn end_date(&self) -> NaiveDate {
        self.start_date + Duration::days(self.total_days() - 1)
    }

    pub fn microcycle_count(&self) -> i64 {
        (self.total_days() + self.microcycle_length - 1) / self.microcycle_length
    }

    pub fn training_days_per_microcycle(&self) -> i64 {
        self.microcycle_length - self.rest_days.len() as i64
    }

    pub fn is_rest_offset(&self, offset: i64) -> bool {
        self.rest_days.binary_search(&offset).is_ok()
    }

    /// Training day number for an offset, counting only non-rest offsets.
    pub fn training_day_at(&self, offset: i64) -> Option<i64> {
        if offset < 0 || offset >= self.microcycle_length || self.is_rest_offset(offset) {
            return None;
        }
        let rest_before = self.rest_days.iter().filter(|&&r| r < offset).count() as i64;
        Some(offset - rest_before + 1)
    }

    /// Offset inside the microcycle of training day `number`.
    pub fn offset_of(&self, number: i64) -> Option<i64> {
        (0..self.microcycle_length).find(|&offset| self.training_day_at(offset) == Some(number))
    }

    pub fn resolve(&self, requested: NaiveDate, today: NaiveDate) -> Resolution {
        let index = (requested - self.start_date).num_days();
        if index < 0 {
            return Resolution::OutOfRange(OutOfRange::BeforeStart {
                starts: self.start_date,
            });
        }
        if index >= self.total_days() {
            return Resolution::OutOfRange(OutOfRange::AfterEnd {
                ended: self.end_date(),
            });
        }

        let offset = index % self.microcycle_length;
        Resolution::Day(ResolvedDay {
            date: requested,
            day_number: offset + 1,
            microcycle_number: index / self.microcycle_length + 1,
            training_day_number: self.training_day_at(offset),
            is_future_session: requested > today,
        })
    }

    /// First and last date of microcycle `number`.
    pub fn microcycle_bounds(&self, number: i64) -> (NaiveDate, NaiveDate) {
        let first = self.start_date + Duration::days((number - 1) * self.microcycle_length);
        (first, first + Duration::days(self.microcycle_length - 1))
    }

    /// Every planned training day inside the plan, in date order.
    pub fn occurrences(&self) -> Vec<Occurrence> {
        (0..self.total_days())
            .filter_map(|index| {
                let offset = index % self.microcycle_length;
                self.training_day_at(offset).map(|number| Occurrence {
                    microcycle_number: index / self.microcycle_length + 1,
                    training_day_number: number,
                    date: self.start_date + Duration::days(index),
                })
            })
            .collect()
    }

    /// Calendar cells for the whole plan; `selected` is highlighted as current.
    pub fn calendar_days(&self, selected: NaiveDate) -> Vec<CalendarDay> {
        (0..self.total_days())
            .map(|index| {
                let date = self.start_date + Duration::days(index);
                CalendarDay {
                    date,
                    is_planned_training_day: !self.is_rest_offset(index % self.microcycle_length),
                    is_current: date == selected,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_week_three_days() -> Schedule {
        Schedule::new(date(2024, 3, 4), 1, 7, &[3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn first_day_is_day_one() {
        let s = one_week_three_days();
        let res = s.resolve(s.start_date, s.start_date);
        assert_eq!(
            res,
            Resolution::Day(ResolvedDay {
                date: s.start_date,
                day_number: 1,
                microcycle_number: 1,
                training_day_number: Some(1),
                is_future_session: false,
            })
        );
    }

    #[test]
    fn one_week_plan_scenario() {
        let s = one_week_three_days();
        let today = s.start_date;

        let rest = s.resolve(s.start_date + Duration::days(3), today);
        let rest = rest.day().unwrap();
        assert!(!rest.is_training_day());
        assert!(rest.is_future_session);

        assert_eq!(
            s.resolve(s.start_date + Duration::days(7), today),
            Resolution::OutOfRange(OutOfRange::AfterEnd {
                ended: date(2024, 3, 10)
            })
        );
    }

    #[test]
    fn before_start_is_out_of_range() {
        let s = one_week_three_days();
        assert_eq!(
            s.resolve(date(2024, 3, 1), date(2024, 3, 1)),
            Resolution::OutOfRange(OutOfRange::BeforeStart {
                starts: s.start_date
            })
        );
    }

    #[test]
    fn rest_days_in_the_middle_keep_declared_order() {
        // 3 on, 1 off, 2 on, 1 off.
        let s = Schedule::new(date(2024, 1, 1), 2, 7, &[6, 3]).unwrap();
        let numbers: Vec<_> = (0..7).map(|o| s.training_day_at(o)).collect();
        assert_eq!(
            numbers,
            vec![Some(1), Some(2), Some(3), None, Some(4), Some(5), None]
        );
        assert_eq!(s.offset_of(4), Some(4));
        assert_eq!(s.offset_of(6), None);
    }

    #[test]
    fn microcycles_need_not_be_weeks() {
        // 3 on, 1 off for 4 weeks: 28 days, 7 microcycles.
        let s = Schedule::new(date(2024, 1, 1), 4, 4, &[3]).unwrap();
        assert_eq!(s.microcycle_count(), 7);
        assert_eq!(s.occurrences().len(), 21);

        let day = *s.resolve(date(2024, 1, 9), date(2024, 1, 1)).day().unwrap();
        assert_eq!(day.microcycle_number, 3);
        assert_eq!(day.day_number, 1);
        assert_eq!(day.training_day_number, Some(1));
        assert_eq!(
            s.microcycle_bounds(3),
            (date(2024, 1, 9), date(2024, 1, 12))
        );
    }

    #[test]
    fn partial_last_microcycle_is_cut_at_plan_end() {
        // 2 weeks of 5-day microcycles: 14 days -> 3 microcycles, last has 4 days.
        let s = Schedule::new(date(2024, 1, 1), 2, 5, &[4]).unwrap();
        assert_eq!(s.microcycle_count(), 3);
        let last = s.occurrences().last().copied().unwrap();
        assert_eq!(last.microcycle_number, 3);
        assert_eq!(last.date, s.end_date());
    }

    #[test]
    fn calendar_marks_rest_and_current() {
        let s = one_week_three_days();
        let days = s.calendar_days(date(2024, 3, 5));
        assert_eq!(days.len(), 7);
        assert_eq!(days.iter().filter(|d| d.is_planned_training_day).count(), 3);
        assert!(days[1].is_current);
        assert!(!days[0].is_current);
    }

    #[test]
    fn layout_errors_are_reported_per_field() {
        let err = validate_layout(3, 7, &[3, 4, 5]).unwrap_err();
        assert!(err.field_errors().unwrap().get("rest_days").is_some());

        let err = validate_layout(3, 7, &[3, 3, 4, 5]).unwrap_err();
        assert_eq!(
            err.field_errors().unwrap().get("rest_days"),
            Some("Rest days must not repeat.")
        );

        assert!(validate_layout(3, 7, &default_rest_days(3)).is_ok());
    }

    fn layouts() -> impl Strategy<Value = (i64, i64, Vec<i64>)> {
        (1i64..=10, 1i64..=12).prop_flat_map(|(len, weeks)| {
            let rest = proptest::collection::btree_set(0..len, 0..len as usize)
                .prop_map(|s| s.into_iter().collect::<Vec<_>>());
            (Just(len), Just(weeks), rest)
        })
    }

    proptest! {
        #[test]
        fn rest_offsets_are_rest_in_every_microcycle(
            (len, weeks, rest) in layouts(),
            k in 0i64..20,
            r in 0i64..10,
        ) {
            let r = r % len;
            let s = Schedule::new(date(2024, 1, 1), weeks, len, &rest).unwrap();
            let requested = s.start_date + Duration::days(k * len + r);

            if let Resolution::Day(day) = s.resolve(requested, s.start_date) {
                prop_assert_eq!(day.microcycle_number, k + 1);
                prop_assert_eq!(day.is_training_day(), !rest.contains(&r));
                prop_assert_eq!(day.training_day_number, s.training_day_at(r));
            } else {
                prop_assert!(k * len + r >= weeks * 7);
            }
        }

        #[test]
        fn every_microcycle_repeats_the_same_pattern((len, weeks, rest) in layouts()) {
            let s = Schedule::new(date(2024, 1, 1), weeks, len, &rest).unwrap();
            for occ in s.occurrences() {
                let offset = (occ.date - s.start_date).num_days() % len;
                prop_assert_eq!(s.training_day_at(offset), Some(occ.training_day_number));
            }
        }
    }
}
