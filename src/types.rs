use once_cell::sync::Lazy;
use std::{collections::BTreeSet, fmt::Display, str::FromStr};
use strsim::jaro_winkler;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};

/// Muscle group names known to the catalog, in display order.
pub static ALLOWED_MUSCLES: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    BTreeSet::from([
        "biceps",
        "triceps",
        "forearms",
        "chest",
        "shoulders",
        "back",
        "quads",
        "hamstrings",
        "glutes",
        "calves",
        "abs",
    ])
});

/// Returns the canonical lowercase muscle name or `None` if not allowed.
pub fn canonical_muscle<S: AsRef<str>>(m: S) -> Option<String> {
    let raw = m.as_ref();
    if raw.chars().any(char::is_control) {
        return None;
    }

    let m = raw.trim().to_ascii_lowercase();
    let m = match m.as_str() {
        "quad" | "quadriceps" => "quads".to_string(),
        "hams" | "hamstring" => "hamstrings".to_string(),
        _ => m,
    };
    if ALLOWED_MUSCLES.contains(m.as_str()) {
        Some(m)
    } else {
        None
    }
}

/// Return the closest allowed muscle for `input`
/// if similarity ≥ 0.80 *and* clearly better than the runner-up.
/// Otherwise return `None` (no suggestion shown).
pub fn best_muscle_suggestion(input: &str) -> Option<&'static str> {
    let inp = input.trim().to_ascii_lowercase();
    if inp.is_empty() {
        return None;
    }

    let mut scores: Vec<(&'static str, f64)> = ALLOWED_MUSCLES
        .iter()
        .copied()
        .map(|m| (m, jaro_winkler(&inp, m)))
        .collect();

    // Highest score first.
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (best_muscle, best_score) = scores[0];
    let second_score = scores.get(1).map_or(0.0, |(_, s)| *s);

    const MIN_SCORE: f64 = 0.80;
    const GAP: f64 = 0.02;

    if best_score >= MIN_SCORE && best_score - second_score >= GAP {
        Some(best_muscle)
    } else {
        None
    }
}

/// Canonicalizes every muscle in `raw`, reporting unknown names on the
/// `muscle_groups` field.
pub fn canonical_muscles(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut out = BTreeSet::new();
    let mut unknown = Vec::new();
    for m in raw {
        match canonical_muscle(m) {
            Some(c) => {
                out.insert(c);
            }
            None => match best_muscle_suggestion(m) {
                Some(s) => unknown.push(format!("`{m}` (did you mean `{s}`?)")),
                None => unknown.push(format!("`{m}`")),
            },
        }
    }

    let mut errs = FieldErrors::new();
    if !unknown.is_empty() {
        errs.insert("muscle_groups", format!("Unknown muscle groups: {}", unknown.join(", ")));
    } else if out.is_empty() {
        errs.insert("muscle_groups", "At least one muscle group is required.");
    }
    errs.into_result()?;
    Ok(out.into_iter().collect())
}

/// Target reps for a set, written `lower-upper` (or a single number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepRange {
    pub lower: i64,
    pub upper: i64,
}

impl RepRange {
    pub fn new(lower: i64, upper: i64) -> Result<Self, AppError> {
        if lower < 1 {
            return Err(AppError::field("rep_range", "Reps must be at least 1."));
        }
        if lower > upper {
            return Err(AppError::field(
                "rep_range",
                "The lower bound must not exceed the upper bound.",
            ));
        }
        Ok(Self { lower, upper })
    }
}

impl FromStr for RepRange {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AppError::field("rep_range", format!("`{s}` is not a rep range like 8-12."));
        let (lower, upper) = match s.split_once('-') {
            Some((l, u)) => (l.trim(), u.trim()),
            None => (s.trim(), s.trim()),
        };
        let lower = lower.parse().map_err(|_| bad())?;
        let upper = upper.parse().map_err(|_| bad())?;
        Self::new(lower, upper)
    }
}

impl Display for RepRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lower == self.upper {
            write!(f, "{}", self.lower)
        } else {
            write!(f, "{}-{}", self.lower, self.upper)
        }
    }
}

#[derive(Deserialize)]
pub struct ExerciseDef {
    pub name: String,
    pub muscles: Vec<String>,
}

#[derive(Deserialize)]
pub struct ExerciseImport {
    pub exercise: Vec<ExerciseDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFmt {
    Text,
    Json,
}

impl OutputFmt {
    pub fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Prints `data` as JSON, or runs `pretty` for the colored text form.
pub fn emit<T: Serialize>(fmt: OutputFmt, data: &T, pretty: impl FnOnce()) {
    match fmt {
        OutputFmt::Json => match serde_json::to_string_pretty(data) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error: cannot serialize output: {e}"),
        },
        OutputFmt::Text => pretty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muscles_are_canonicalized() {
        assert_eq!(canonical_muscle("CHEST").as_deref(), Some("chest"));
        assert_eq!(canonical_muscle("Quadriceps").as_deref(), Some("quads"));
        assert_eq!(canonical_muscle("neck"), None);
    }

    #[test]
    fn close_misspellings_get_a_suggestion() {
        assert_eq!(best_muscle_suggestion("tricpes"), Some("triceps"));
        assert_eq!(best_muscle_suggestion("zzz"), None);
    }

    #[test]
    fn unknown_muscles_are_a_field_error() {
        let err = canonical_muscles(&["chest".into(), "neck".into()]).unwrap_err();
        assert!(err.field_errors().unwrap().get("muscle_groups").unwrap().contains("`neck`"));

        let ok = canonical_muscles(&["Chest".into(), "triceps".into(), "chest".into()]).unwrap();
        assert_eq!(ok, vec!["chest".to_string(), "triceps".to_string()]);

        assert!(canonical_muscles(&[]).is_err());
    }

    #[test]
    fn control_characters_are_rejected_not_fatal() {
        assert_eq!(canonical_muscle("chest\t"), None);
        let err = canonical_muscles(&["chest\t".into()]).unwrap_err();
        assert!(err.field_errors().unwrap().get("muscle_groups").is_some());
    }

    #[test]
    fn rep_ranges_parse_and_validate() {
        assert_eq!("8-12".parse::<RepRange>().unwrap(), RepRange { lower: 8, upper: 12 });
        assert_eq!("5".parse::<RepRange>().unwrap(), RepRange { lower: 5, upper: 5 });
        assert!("12-8".parse::<RepRange>().is_err());
        assert!("eight".parse::<RepRange>().is_err());
        assert_eq!(RepRange { lower: 6, upper: 10 }.to_string(), "6-10");
    }
}
