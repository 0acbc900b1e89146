use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

/// A journal entry in its in-memory form.
///
/// `id` is `None` until the store has persisted the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub description: String,
    pub place: String,
    pub emotion: String,
    pub occurred_at: DateTime<Local>,
}

impl Meal {
    /// Build an unsaved meal. The time is truncated to whole milliseconds,
    /// the precision the store keeps.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        place: impl Into<String>,
        emotion: impl Into<String>,
        occurred_at: DateTime<Local>,
    ) -> Self {
        Self {
            id: None,
            description: description.into(),
            place: place.into(),
            emotion: emotion.into(),
            occurred_at: truncate_millis(occurred_at),
        }
    }

    /// Move the meal in time, truncated the same way as [`Meal::new`].
    pub fn set_occurred_at(&mut self, occurred_at: DateTime<Local>) {
        self.occurred_at = truncate_millis(occurred_at);
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Copy of this meal with the id stripped, ready to be created fresh.
    #[must_use]
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }

    /// Local calendar day the meal happened on.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }

    pub fn validate(&self) -> Result<()> {
        validate_meal_fields(&self.description, &self.place, &self.emotion)
    }
}

/// On-disk form: the time is kept as epoch milliseconds so it sorts and
/// compares as a plain integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMeal {
    pub id: Option<i64>,
    pub description: String,
    pub place: String,
    pub emotion: String,
    pub timestamp: i64,
}

impl From<&Meal> for StoredMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            id: meal.id,
            description: meal.description.clone(),
            place: meal.place.clone(),
            emotion: meal.emotion.clone(),
            timestamp: to_epoch_millis(&meal.occurred_at),
        }
    }
}

impl StoredMeal {
    pub fn into_meal(self) -> Result<Meal> {
        let occurred_at = from_epoch_millis(self.timestamp).ok_or_else(|| {
            JournalError::Storage(format!(
                "meal {} has an out-of-range timestamp: {}",
                self.id.unwrap_or_default(),
                self.timestamp
            ))
        })?;
        Ok(Meal {
            id: self.id,
            description: self.description,
            place: self.place,
            emotion: self.emotion,
            occurred_at,
        })
    }
}

/// One element of the import/export JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMeal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub description: String,
    pub place: String,
    pub emotion: String,
    pub datetime: String,
}

impl From<&Meal> for TransferMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            id: meal.id,
            description: meal.description.clone(),
            place: meal.place.clone(),
            emotion: meal.emotion.clone(),
            datetime: format_transfer_datetime(&meal.occurred_at),
        }
    }
}

fn truncate_millis(at: DateTime<Local>) -> DateTime<Local> {
    from_epoch_millis(to_epoch_millis(&at)).unwrap_or(at)
}

#[must_use]
pub fn to_epoch_millis(at: &DateTime<Local>) -> i64 {
    at.timestamp_millis()
}

#[must_use]
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp_millis(millis).map(|utc| utc.with_timezone(&Local))
}

/// UTC, millisecond precision, `Z` suffix: `2024-01-01T12:30:00.000Z`.
#[must_use]
pub fn format_transfer_datetime(at: &DateTime<Local>) -> String {
    at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 date-time. Strings with an offset are taken as-is;
/// strings without one are read as local time. A bare `YYYY-MM-DD` means
/// local midnight.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return resolve_local(naive);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(resolve_local)
}

/// Map a wall-clock time to a local instant. Ambiguous times take the
/// earlier instant; times inside a DST gap move forward one hour.
#[must_use]
pub fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            Local
                .from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
}

pub fn validate_meal_fields(description: &str, place: &str, emotion: &str) -> Result<()> {
    for (name, value) in [
        ("description", description),
        ("place", place),
        ("emotion", emotion),
    ] {
        if value.trim().is_empty() {
            return Err(JournalError::Validation(format!("{name} must not be empty")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn lunch() -> Meal {
        let at = Local.with_ymd_and_hms(2024, 3, 10, 12, 30, 0).unwrap();
        Meal::new("Rice and beans", "Home", "Happy", at)
    }

    #[test]
    fn test_stored_round_trip() {
        let meal = lunch().with_id(7);
        let stored = StoredMeal::from(&meal);
        let back = stored.clone().into_meal().unwrap();
        assert_eq!(back, meal);
        assert_eq!(StoredMeal::from(&back), stored);
    }

    #[test]
    fn test_new_truncates_to_millis() {
        let at = Local::now().with_nanosecond(123_456_789).unwrap();
        let meal = Meal::new("Toast", "Cafe", "Calm", at);
        assert_eq!(meal.occurred_at.nanosecond(), 123_000_000);

        let stored = StoredMeal::from(&meal);
        assert_eq!(stored.into_meal().unwrap().occurred_at, meal.occurred_at);
    }

    #[test]
    fn test_into_meal_out_of_range() {
        let stored = StoredMeal {
            id: Some(1),
            description: "x".into(),
            place: "y".into(),
            emotion: "z".into(),
            timestamp: i64::MAX,
        };
        assert!(stored.into_meal().unwrap_err().is_storage());
    }

    #[test]
    fn test_without_id() {
        let meal = lunch().with_id(3);
        let fresh = meal.without_id();
        assert_eq!(fresh.id, None);
        assert_eq!(fresh.description, meal.description);
        assert_eq!(fresh.occurred_at, meal.occurred_at);
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut meal = lunch();
        assert!(meal.validate().is_ok());

        meal.place = "   ".into();
        let err = meal.validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("place"));
    }

    #[test]
    fn test_format_transfer_datetime() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T15:30:00.250-03:00")
            .unwrap()
            .with_timezone(&Local);
        assert_eq!(format_transfer_datetime(&at), "2024-01-01T18:30:00.250Z");
    }

    #[test]
    fn test_parse_datetime_rfc3339() {
        let parsed = parse_datetime("2024-01-01T18:30:00.250Z").unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_704_133_800_250);
    }

    #[test]
    fn test_parse_datetime_local_forms() {
        let expected = Local.with_ymd_and_hms(2024, 5, 2, 8, 15, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-02T08:15"), Some(expected));
        assert_eq!(parse_datetime("2024-05-02 08:15"), Some(expected));
        assert_eq!(parse_datetime("2024-05-02T08:15:00"), Some(expected));
        assert_eq!(parse_datetime(" 2024-05-02 08:15:00 "), Some(expected));
    }

    #[test]
    fn test_parse_datetime_date_only() {
        let parsed = parse_datetime("2024-05-02").unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime("").is_none());
        assert!(parse_datetime("yesterday-ish").is_none());
        assert!(parse_datetime("2024-13-40T99:00").is_none());
    }

    #[test]
    fn test_transfer_from_meal() {
        let meal = lunch().with_id(4);
        let transfer = TransferMeal::from(&meal);
        assert_eq!(transfer.id, Some(4));
        assert_eq!(parse_datetime(&transfer.datetime), Some(meal.occurred_at));

        let json = serde_json::to_value(&transfer).unwrap();
        assert_eq!(json["description"], "Rice and beans");
        assert!(json.get("timestamp").is_none());
    }
}
