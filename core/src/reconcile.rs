//! Import and export of meals in the JSON transfer format.
//!
//! Export selects whole local calendar days and sorts by time. Import
//! validates the whole payload before touching the store, then either
//! applies it straight away or, when incoming ids collide with stored ones,
//! hands back a [`PendingImport`] that waits for a [`ResolutionMode`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{JournalError, Result};
use crate::models::{Meal, TransferMeal, from_epoch_millis, parse_datetime, resolve_local};
use crate::store::MealStore;

/// Inclusive range of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExportRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(JournalError::Validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a range from user input. Both ends are required.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = parse_day("start", start)?;
        let end = parse_day("end", end)?;
        Self::new(start, end)
    }

    /// First and last millisecond of the range, local time.
    pub fn bounds(&self) -> Result<(DateTime<Local>, DateTime<Local>)> {
        let first = self
            .start
            .and_hms_milli_opt(0, 0, 0, 0)
            .and_then(resolve_local);
        let last = self
            .end
            .and_hms_milli_opt(23, 59, 59, 999)
            .and_then(resolve_local);
        match (first, last) {
            (Some(first), Some(last)) => Ok((first, last)),
            _ => Err(JournalError::Validation(format!(
                "cannot resolve {} to {} in local time",
                self.start, self.end
            ))),
        }
    }
}

fn parse_day(label: &str, value: Option<&str>) -> Result<NaiveDate> {
    let value = value.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        JournalError::Validation(format!("a {label} date is required to export"))
    })?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(value).map(|dt| dt.date_naive()))
        .ok_or_else(|| {
            JournalError::Validation(format!(
                "invalid {label} date '{value}', expected YYYY-MM-DD"
            ))
        })
}

/// Keep meals inside `range` and sort them oldest first.
pub fn select_range(meals: Vec<Meal>, range: &ExportRange) -> Result<Vec<Meal>> {
    let (first, last) = range.bounds()?;
    let mut selected: Vec<Meal> = meals
        .into_iter()
        .filter(|m| m.occurred_at >= first && m.occurred_at <= last)
        .collect();
    selected.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
    Ok(selected)
}

pub async fn export_range(store: &MealStore, range: &ExportRange) -> Result<Vec<Meal>> {
    let all = store.list_all().await?;
    let selected = select_range(all, range)?;
    info!(
        start = %range.start,
        end = %range.end,
        count = selected.len(),
        "exported meals"
    );
    Ok(selected)
}

/// Pretty-printed JSON array of transfer records.
pub fn to_transfer_json(meals: &[Meal]) -> Result<String> {
    let records: Vec<TransferMeal> = meals.iter().map(TransferMeal::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// What to do with incoming meals whose id already exists in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Create every incoming meal as a new record.
    #[default]
    Duplicate,
    /// Replace stored meals that share an id; create the rest.
    Overwrite,
}

impl FromStr for ResolutionMode {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "duplicate" => Ok(Self::Duplicate),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(JournalError::InvalidArgument(format!(
                "unknown resolution mode '{other}', expected duplicate or overwrite"
            ))),
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Parse and validate a transfer payload without touching the store.
pub fn parse_payload(raw: &str) -> Result<Vec<Meal>> {
    if raw.trim().is_empty() {
        return Err(JournalError::Validation("nothing to import".into()));
    }
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(items) = value else {
        return Err(JournalError::Validation(
            "payload must be a JSON array of meals".into(),
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| meal_from_value(index + 1, item))
        .collect()
}

fn meal_from_value(n: usize, item: &Value) -> Result<Meal> {
    let Value::Object(obj) = item else {
        return Err(JournalError::Validation(format!(
            "meal #{n}: expected an object"
        )));
    };

    let text = |key: &str| -> Result<String> {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                JournalError::Validation(format!("meal #{n}: missing or empty '{key}'"))
            })
    };
    let description = text("description")?;
    let place = text("place")?;
    let emotion = text("emotion")?;

    let occurred_at = match obj.get("datetime") {
        Some(Value::String(s)) => parse_datetime(s),
        Some(Value::Number(ms)) => ms.as_i64().and_then(from_epoch_millis),
        _ => None,
    }
    .ok_or_else(|| {
        JournalError::Validation(format!("meal #{n}: missing or unparseable 'datetime'"))
    })?;

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_i64().ok_or_else(|| {
            JournalError::Validation(format!("meal #{n}: 'id' must be an integer"))
        })?),
    };

    let meal = Meal::new(description, place, emotion, occurred_at);
    Ok(match id {
        Some(id) => meal.with_id(id),
        None => meal,
    })
}

/// An import held back because some incoming ids already exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImport {
    pub incoming: Vec<Meal>,
    pub collisions: Vec<Meal>,
}

impl PendingImport {
    fn colliding_ids(&self) -> HashSet<i64> {
        self.collisions.iter().filter_map(|m| m.id).collect()
    }
}

#[derive(Debug)]
pub struct RecordFailure {
    /// Position of the record in the payload, starting at 0.
    pub index: usize,
    pub id: Option<i64>,
    pub error: JournalError,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub mode: ResolutionMode,
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<RecordFailure>,
}

impl ImportReport {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum ImportOutcome {
    Applied(ImportReport),
    PendingResolution(PendingImport),
}

/// Validate `raw` and import it. Nothing is written when ids collide; the
/// caller gets the pending batch back and picks a [`ResolutionMode`].
pub async fn import_payload(store: &MealStore, raw: &str) -> Result<ImportOutcome> {
    let incoming = parse_payload(raw)?;
    let existing: HashSet<i64> = store
        .list_all()
        .await?
        .into_iter()
        .filter_map(|m| m.id)
        .collect();

    let collisions: Vec<Meal> = incoming
        .iter()
        .filter(|m| m.id.is_some_and(|id| existing.contains(&id)))
        .cloned()
        .collect();

    if collisions.is_empty() {
        let report = apply(store, &incoming, ResolutionMode::Duplicate, &HashSet::new()).await;
        return Ok(ImportOutcome::Applied(report));
    }

    info!(
        incoming = incoming.len(),
        collisions = collisions.len(),
        "import awaiting resolution"
    );
    Ok(ImportOutcome::PendingResolution(PendingImport {
        incoming,
        collisions,
    }))
}

pub async fn apply_resolution(
    store: &MealStore,
    pending: &PendingImport,
    mode: ResolutionMode,
) -> ImportReport {
    apply(store, &pending.incoming, mode, &pending.colliding_ids()).await
}

enum Written {
    Created,
    Updated,
}

/// Records are applied one at a time; a failure is noted and the rest of the
/// batch still runs. Nothing already written is rolled back.
async fn apply(
    store: &MealStore,
    meals: &[Meal],
    mode: ResolutionMode,
    colliding: &HashSet<i64>,
) -> ImportReport {
    let mut report = ImportReport {
        mode,
        ..ImportReport::default()
    };

    for (index, meal) in meals.iter().enumerate() {
        let result = match (mode, meal.id) {
            (ResolutionMode::Overwrite, Some(id)) if colliding.contains(&id) => {
                store.update(meal).await.map(|()| Written::Updated)
            }
            _ => store
                .create(&meal.without_id())
                .await
                .map(|_| Written::Created),
        };
        match result {
            Ok(Written::Created) => report.created += 1,
            Ok(Written::Updated) => report.updated += 1,
            Err(error) => {
                warn!(index, id = ?meal.id, %error, "failed to import meal");
                report.failures.push(RecordFailure {
                    index,
                    id: meal.id,
                    error,
                });
            }
        }
    }

    info!(
        %mode,
        created = report.created,
        updated = report.updated,
        failed = report.failures.len(),
        "import applied"
    );
    report
}

#[derive(Debug, Default)]
pub enum ImportState {
    #[default]
    Idle,
    AwaitingResolution(PendingImport),
    Applied(ImportReport),
}

/// One user's import flow.
///
/// `Idle -> {Applied | AwaitingResolution}` on [`submit`](Self::submit);
/// `AwaitingResolution -> Applied` on [`resolve`](Self::resolve);
/// `AwaitingResolution -> Idle` on [`cancel`](Self::cancel). The parsed
/// state in between lives only for the duration of `submit`.
#[derive(Debug, Default)]
pub struct ImportSession {
    state: ImportState,
}

impl ImportSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &ImportState {
        &self.state
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingImport> {
        match &self.state {
            ImportState::AwaitingResolution(pending) => Some(pending),
            _ => None,
        }
    }

    #[must_use]
    pub fn report(&self) -> Option<&ImportReport> {
        match &self.state {
            ImportState::Applied(report) => Some(report),
            _ => None,
        }
    }

    pub async fn submit(&mut self, store: &MealStore, raw: &str) -> Result<&ImportState> {
        if self.pending().is_some() {
            return Err(JournalError::InvalidArgument(
                "an import is awaiting resolution; resolve or cancel it first".into(),
            ));
        }
        self.state = ImportState::Idle;
        self.state = match import_payload(store, raw).await? {
            ImportOutcome::Applied(report) => ImportState::Applied(report),
            ImportOutcome::PendingResolution(pending) => ImportState::AwaitingResolution(pending),
        };
        Ok(&self.state)
    }

    pub async fn resolve(&mut self, store: &MealStore, mode: ResolutionMode) -> Result<&ImportState> {
        let pending = match std::mem::take(&mut self.state) {
            ImportState::AwaitingResolution(pending) => pending,
            other => {
                self.state = other;
                return Err(JournalError::InvalidArgument(
                    "no import is awaiting resolution".into(),
                ));
            }
        };
        let report = apply_resolution(store, &pending, mode).await;
        self.state = ImportState::Applied(report);
        Ok(&self.state)
    }

    /// Drop the pending batch, if any, and return to idle.
    pub fn cancel(&mut self) -> Option<PendingImport> {
        match std::mem::take(&mut self.state) {
            ImportState::AwaitingResolution(pending) => Some(pending),
            other => {
                self.state = other;
                None
            }
        }
    }
}
