use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::io::{BufRead, Write};
use tabled::{Table, Tabled, settings::Style};

use morsel_core::models::{Meal, parse_datetime};
use morsel_core::reconcile::ResolutionMode;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// When a meal happened. Defaults to now.
pub(crate) fn parse_at(at: Option<&str>) -> Result<DateTime<Local>> {
    match at.map(str::trim) {
        None | Some("now") => Ok(Local::now()),
        Some(s) => parse_datetime(s).with_context(|| {
            format!("Invalid date/time '{s}'. Use 'YYYY-MM-DD HH:MM', 'YYYY-MM-DDTHH:MM' or RFC 3339")
        }),
    }
}

/// Read one answer to the duplicate/overwrite/cancel question. `None` means
/// cancel, which is also what end of input means.
pub(crate) fn prompt_resolution<R: BufRead>(mut input: R) -> Result<Option<ResolutionMode>> {
    eprint!("\n[d]uplicate, [o]verwrite or [c]ancel? ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        eprintln!();
        return Ok(None);
    }
    parse_resolution_choice(&line)
}

pub(crate) fn parse_resolution_choice(answer: &str) -> Result<Option<ResolutionMode>> {
    match answer.trim().to_lowercase().as_str() {
        "d" | "duplicate" => Ok(Some(ResolutionMode::Duplicate)),
        "o" | "overwrite" => Ok(Some(ResolutionMode::Overwrite)),
        "c" | "cancel" | "" => Ok(None),
        other => bail!("Unknown choice '{other}'. Answer d, o or c"),
    }
}

pub(crate) fn format_time(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Place")]
        place: String,
        #[tabled(rename = "Emotion")]
        emotion: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id.map_or_else(|| "-".into(), |id| id.to_string()),
            time: m.occurred_at.format("%H:%M").to_string(),
            description: truncate(&m.description, 40),
            place: truncate(&m.place, 20),
            emotion: truncate(&m.emotion, 20),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
