use anyhow::{Result, bail};

use morsel_core::models::Meal;
use morsel_core::service::JournalService;

use super::helpers::{format_time, parse_at};

pub(crate) async fn cmd_add(
    svc: &JournalService,
    description: String,
    place: String,
    emotion: String,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let occurred_at = parse_at(at)?;
    let meal = Meal::new(description, place, emotion, occurred_at);
    let id = svc.log_meal(&meal).await?;
    let meal = meal.with_id(id);

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged meal {id}: {} at {} ({}), {}",
            meal.description,
            meal.place,
            meal.emotion,
            format_time(&meal.occurred_at)
        );
    }
    Ok(())
}

pub(crate) struct MealEdit {
    pub description: Option<String>,
    pub place: Option<String>,
    pub emotion: Option<String>,
    pub at: Option<String>,
}

impl MealEdit {
    fn is_empty(&self) -> bool {
        self.description.is_none() && self.place.is_none() && self.emotion.is_none() && self.at.is_none()
    }

    /// Overlay the given fields on `meal`; the rest are kept as stored.
    fn apply(self, mut meal: Meal) -> Result<Meal> {
        if let Some(at) = self.at.as_deref() {
            meal.set_occurred_at(parse_at(Some(at))?);
        }
        if let Some(description) = self.description {
            meal.description = description;
        }
        if let Some(place) = self.place {
            meal.place = place;
        }
        if let Some(emotion) = self.emotion {
            meal.emotion = emotion;
        }
        Ok(meal)
    }
}

pub(crate) async fn cmd_edit(svc: &JournalService, id: i64, edit: MealEdit, json: bool) -> Result<()> {
    if edit.is_empty() {
        bail!("Nothing to update. Provide at least one of --description, --place, --emotion, or --at");
    }
    let Some(stored) = svc.find_meal(id).await? else {
        bail!("Meal {id} not found");
    };
    let meal = edit.apply(stored)?;
    svc.edit_meal(&meal).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Updated meal {id}: {} at {} ({}), {}",
            meal.description,
            meal.place,
            meal.emotion,
            format_time(&meal.occurred_at)
        );
    }
    Ok(())
}

pub(crate) async fn cmd_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    svc.delete_meal(id).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}
