use anyhow::Result;
use colored::Colorize;
use sculpt::{
    OutputFmt, Tracker,
    tracker::{CalendarCell, CalendarView},
    types::emit,
    utils::today,
};

fn cell(c: &CalendarCell) -> String {
    let text = match (c.training_day_number, &c.label) {
        (Some(_), Some(label)) => {
            let initial: String = label.chars().take(3).collect();
            format!("{:<3}", initial)
        }
        (Some(n), None) => format!("D{n:<2}"),
        _ => " · ".to_string(),
    };
    let text = if c.completed {
        text.green().bold()
    } else if c.day.is_planned_training_day {
        text.normal()
    } else {
        text.dimmed()
    };
    if c.is_today { text.reversed().to_string() } else { text.to_string() }
}

fn pretty(view: &CalendarView) {
    println!(
        "\n{} {} → {}",
        view.mesocycle.name.bold().cyan(),
        view.start_date,
        view.end_date
    );

    let len = view.microcycle_length.max(1) as usize;
    let header = (1..=len).map(|d| format!("{d:<3}")).collect::<Vec<_>>().join(" ");
    println!("{}", format!("      {header}").dimmed());

    for (i, week) in view.days.chunks(len).enumerate() {
        let row = week.iter().map(cell).collect::<Vec<_>>().join(" ");
        let first = week.first().map(|c| c.day.date);
        let marker = if first == Some(view.last_microcycle.0) { " last".dimmed().to_string() } else { String::new() };
        println!("{} {}{}", format!("{:>4}.", i + 1).yellow(), row, marker);
    }

    let done = view.days.iter().filter(|c| c.completed).count();
    let planned = view.days.iter().filter(|c| c.day.is_planned_training_day).count();
    println!("\n{} {}/{} training days done", "Progress:".cyan().bold(), done, planned);
}

pub async fn handle(mesocycle: Option<String>, tracker: &Tracker, fmt: OutputFmt) -> Result<()> {
    let id = match mesocycle {
        Some(key) => Some(tracker.mesocycle(&key).await?.id),
        None => None,
    };
    let view = tracker.calendar(id.as_deref(), today()).await?;
    emit(fmt, &view, || pretty(&view));
    Ok(())
}
