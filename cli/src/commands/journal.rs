use anyhow::Result;

use morsel_core::service::JournalService;

use super::helpers::{parse_date, print_meal_table};

pub(crate) async fn cmd_list(svc: &JournalService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let meals = svc.meals_on(date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    let weekday = date.format("%A");
    println!("{weekday}, {date}\n");
    if meals.is_empty() {
        println!("  No meals logged.");
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}

pub(crate) async fn cmd_dates(svc: &JournalService, json: bool) -> Result<()> {
    let dates = svc.available_dates().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dates)?);
    } else if dates.is_empty() {
        println!("No meals logged yet.");
    } else {
        for date in &dates {
            println!("{date}");
        }
    }
    Ok(())
}
