use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};

/// Printable width of `s`, ignoring ANSI color sequences.
pub fn plain_len(s: &str) -> usize {
    let mut n = 0;
    let mut esc = false;
    for c in s.chars() {
        match (esc, c) {
            (true, 'm') => esc = false,
            (true, _) => {}
            (false, '\x1b') => esc = true,
            (false, _) => n += 1,
        }
    }
    n
}

/// Prints `left` padded to a common printable width, then `| right` when
/// there is a right column.
pub fn print_columns(left: Vec<String>, right: Vec<String>, sep: &str) {
    let pad_plain = left.iter().map(|s| plain_len(s)).max().unwrap_or(0);
    for (l, r) in left.into_iter().zip(right) {
        let pad = pad_plain + (l.len() - plain_len(&l));
        if r.is_empty() {
            println!("{l}");
        } else {
            println!("{l:<pad$} {sep} {r}");
        }
    }
}

/// `YYYY-MM-DD`, `DD-MM-YYYY`, or one of `today`, `yesterday`, `tomorrow`.
pub fn parse_date(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "today" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        "tomorrow" => return Ok(today + Duration::days(1)),
        _ => {}
    }
    for fmt in ["%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    bail!("`{s}` is not a date (expected YYYY-MM-DD)")
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// `100`, `102.5`: no trailing zeros.
pub fn format_weight(w: f64) -> String {
    let s = format!("{w:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
