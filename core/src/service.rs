use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{JournalError, Result};
use crate::models::Meal;
use crate::notify::{NotificationSink, Severity};
use crate::reconcile::{
    self, ExportRange, ImportReport, ImportSession, ImportState, PendingImport, ResolutionMode,
};
use crate::store::MealStore;

/// Front door for every journal operation.
///
/// Wraps the store and the reconciler and reports each outcome to a
/// [`NotificationSink`]. Errors are still returned so callers can decide what
/// to do next; the notification is what the user sees.
pub struct JournalService {
    store: MealStore,
    sink: Arc<dyn NotificationSink>,
}

impl JournalService {
    pub fn new(store: MealStore, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    pub fn open(db_path: impl Into<PathBuf>, sink: Arc<dyn NotificationSink>) -> Self {
        Self::new(MealStore::open(db_path), sink)
    }

    pub fn new_in_memory(sink: Arc<dyn NotificationSink>) -> Self {
        Self::new(MealStore::in_memory(), sink)
    }

    #[must_use]
    pub fn store(&self) -> &MealStore {
        &self.store
    }

    fn success(&self, message: &str) {
        self.sink.notify(message, Severity::Success);
    }

    /// Post `err` and hand it back. Shape errors on empty input are only a
    /// warning since there was nothing to get wrong.
    fn fail(&self, context: &str, err: JournalError, input_blank: bool) -> JournalError {
        let severity = match err {
            JournalError::Validation(_) | JournalError::Parse(_) if input_blank => Severity::Warning,
            _ => Severity::Error,
        };
        self.sink.notify(&format!("{context}: {err}"), severity);
        err
    }

    // --- Meals ---

    pub async fn log_meal(&self, meal: &Meal) -> Result<i64> {
        let id = self
            .store
            .create(meal)
            .await
            .map_err(|e| self.fail("Could not save meal", e, false))?;
        self.success("Meal saved");
        Ok(id)
    }

    pub async fn edit_meal(&self, meal: &Meal) -> Result<()> {
        self.store
            .update(meal)
            .await
            .map_err(|e| self.fail("Could not update meal", e, false))?;
        self.success("Meal updated");
        Ok(())
    }

    pub async fn delete_meal(&self, id: i64) -> Result<()> {
        self.store
            .delete(id)
            .await
            .map_err(|e| self.fail("Could not delete meal", e, false))?;
        self.success("Meal deleted");
        Ok(())
    }

    pub async fn find_meal(&self, id: i64) -> Result<Option<Meal>> {
        self.store
            .get(id)
            .await
            .map_err(|e| self.fail("Could not load meal", e, false))
    }

    async fn all_meals(&self) -> Result<Vec<Meal>> {
        self.store
            .list_all()
            .await
            .map_err(|e| self.fail("Could not load meals", e, false))
    }

    /// Meals on one local calendar day, newest first.
    pub async fn meals_on(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        let mut meals: Vec<Meal> = self
            .all_meals()
            .await?
            .into_iter()
            .filter(|m| m.local_date() == date)
            .collect();
        meals.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(b.id.cmp(&a.id)));
        Ok(meals)
    }

    /// Local calendar days with at least one meal.
    pub async fn available_dates(&self) -> Result<BTreeSet<NaiveDate>> {
        Ok(self
            .all_meals()
            .await?
            .iter()
            .map(Meal::local_date)
            .collect())
    }

    // --- Import / export ---

    /// Transfer JSON for the meals between `start` and `end`, both inclusive.
    pub async fn export(&self, start: Option<&str>, end: Option<&str>) -> Result<String> {
        let blank = [start, end]
            .into_iter()
            .all(|v| v.is_none_or(|s| s.trim().is_empty()));
        let range = ExportRange::parse(start, end)
            .map_err(|e| self.fail("Select a period to export", e, blank))?;

        let (count, json) = async {
            let meals = reconcile::export_range(&self.store, &range).await?;
            let json = reconcile::to_transfer_json(&meals)?;
            Ok::<_, JournalError>((meals.len(), json))
        }
        .await
        .map_err(|e| self.fail("Error exporting meals", e, false))?;

        self.success(&format!("Exported {count} meal{}", plural(count)));
        Ok(json)
    }

    /// Start an import. On collisions the session waits for
    /// [`resolve_import`](Self::resolve_import) or
    /// [`cancel_import`](Self::cancel_import).
    pub async fn submit_import<'s>(
        &self,
        session: &'s mut ImportSession,
        raw: &str,
    ) -> Result<&'s ImportState> {
        let blank = raw.trim().is_empty();
        let state = session
            .submit(&self.store, raw)
            .await
            .map_err(|e| self.fail("Error importing meals", e, blank))?;
        match state {
            ImportState::AwaitingResolution(pending) => {
                info!(collisions = pending.collisions.len(), "import needs resolution");
                self.sink.notify(
                    &format!(
                        "{} of {} imported meals already exist; choose duplicate or overwrite",
                        pending.collisions.len(),
                        pending.incoming.len()
                    ),
                    Severity::Info,
                );
            }
            ImportState::Applied(report) => self.announce(report),
            ImportState::Idle => {}
        }
        Ok(state)
    }

    pub async fn resolve_import<'s>(
        &self,
        session: &'s mut ImportSession,
        mode: ResolutionMode,
    ) -> Result<&'s ImportState> {
        let state = session
            .resolve(&self.store, mode)
            .await
            .map_err(|e| self.fail("Error importing meals", e, false))?;
        if let ImportState::Applied(report) = state {
            self.announce(report);
        }
        Ok(state)
    }

    pub fn cancel_import(&self, session: &mut ImportSession) -> Option<PendingImport> {
        let dropped = session.cancel();
        if let Some(pending) = &dropped {
            self.sink.notify(
                &format!(
                    "Import cancelled; {} meal{} discarded",
                    pending.incoming.len(),
                    plural(pending.incoming.len())
                ),
                Severity::Info,
            );
        }
        dropped
    }

    fn announce(&self, report: &ImportReport) {
        let applied = report.applied();
        if report.is_success() {
            self.success(&format!("Imported {applied} meal{}", plural(applied)));
            return;
        }
        let failed = report.failures.len();
        let first = report
            .failures
            .first()
            .map(|f| format!(" (first: meal #{}: {})", f.index + 1, f.error))
            .unwrap_or_default();
        self.sink.notify(
            &format!(
                "Error processing meals: {applied} imported, {failed} failed{first}"
            ),
            Severity::Error,
        );
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Dispatcher, Notification};
    use chrono::{Local, TimeZone};

    fn service() -> (JournalService, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::new());
        let svc = JournalService::new_in_memory(dispatcher.clone());
        (svc, dispatcher)
    }

    fn meal_at(description: &str, day: u32, hour: u32) -> Meal {
        let at = Local.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap();
        Meal::new(description, "Home", "Fine", at)
    }

    fn severities(notes: &[Notification]) -> Vec<Severity> {
        notes.iter().map(|n| n.severity).collect()
    }

    #[tokio::test]
    async fn test_log_meal_notifies_success() {
        let (svc, notes) = service();
        let id = svc.log_meal(&meal_at("Porridge", 1, 8)).await.unwrap();
        assert_eq!(svc.find_meal(id).await.unwrap().unwrap().description, "Porridge");

        let drained = notes.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].to_string(), "Success: Meal saved");
    }

    #[tokio::test]
    async fn test_log_meal_failure_notifies_error() {
        let (svc, notes) = service();
        let mut m = meal_at("Porridge", 1, 8);
        m.place = String::new();
        assert!(svc.log_meal(&m).await.unwrap_err().is_validation());
        assert_eq!(severities(&notes.drain()), vec![Severity::Error]);
    }

    #[tokio::test]
    async fn test_edit_missing_meal() {
        let (svc, notes) = service();
        let err = svc.edit_meal(&meal_at("Ghost", 1, 8).with_id(12)).await.unwrap_err();
        assert!(err.is_storage());
        let drained = notes.drain();
        assert_eq!(drained[0].severity, Severity::Error);
        assert!(drained[0].message.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let (svc, notes) = service();
        svc.delete_meal(999).await.unwrap();
        assert_eq!(severities(&notes.drain()), vec![Severity::Success]);
    }

    #[tokio::test]
    async fn test_meals_on_is_newest_first() {
        let (svc, _notes) = service();
        svc.log_meal(&meal_at("breakfast", 2, 8)).await.unwrap();
        svc.log_meal(&meal_at("dinner", 2, 19)).await.unwrap();
        svc.log_meal(&meal_at("other day", 3, 12)).await.unwrap();
        svc.log_meal(&meal_at("lunch", 2, 12)).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let names: Vec<String> = svc
            .meals_on(day)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.description)
            .collect();
        assert_eq!(names, vec!["dinner", "lunch", "breakfast"]);
    }

    #[tokio::test]
    async fn test_available_dates() {
        let (svc, _notes) = service();
        assert!(svc.available_dates().await.unwrap().is_empty());

        svc.log_meal(&meal_at("a", 5, 8)).await.unwrap();
        svc.log_meal(&meal_at("b", 5, 20)).await.unwrap();
        svc.log_meal(&meal_at("c", 1, 12)).await.unwrap();

        let dates: Vec<NaiveDate> = svc.available_dates().await.unwrap().into_iter().collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_export_notifications() {
        let (svc, notes) = service();
        svc.log_meal(&meal_at("a", 5, 8)).await.unwrap();
        notes.drain();

        assert!(svc.export(None, None).await.unwrap_err().is_validation());
        assert_eq!(severities(&notes.drain()), vec![Severity::Warning]);

        assert!(svc
            .export(Some("2024-03-06"), Some("2024-03-01"))
            .await
            .unwrap_err()
            .is_validation());
        assert_eq!(severities(&notes.drain()), vec![Severity::Error]);

        let json = svc.export(Some("2024-03-01"), Some("2024-03-06")).await.unwrap();
        assert!(json.contains("\"description\": \"a\""));
        let drained = notes.drain();
        assert_eq!(drained[0].to_string(), "Success: Exported 1 meal");
    }

    #[tokio::test]
    async fn test_import_notifications() {
        let (svc, notes) = service();
        let mut session = ImportSession::new();

        assert!(svc.submit_import(&mut session, "  ").await.is_err());
        assert_eq!(severities(&notes.drain()), vec![Severity::Warning]);

        assert!(svc.submit_import(&mut session, "{oops").await.is_err());
        assert_eq!(severities(&notes.drain()), vec![Severity::Error]);

        let raw = r#"[{"description":"Soup","place":"Home","emotion":"Warm","datetime":"2024-03-01T12:00"}]"#;
        let state = svc.submit_import(&mut session, raw).await.unwrap();
        assert!(matches!(state, ImportState::Applied(_)));
        assert_eq!(notes.drain()[0].to_string(), "Success: Imported 1 meal");
    }

    #[tokio::test]
    async fn test_import_resolution_flow() {
        let (svc, notes) = service();
        let id = svc.log_meal(&meal_at("Original", 1, 12)).await.unwrap();
        notes.drain();

        let raw = format!(
            r#"[{{"id":{id},"description":"Replacement","place":"Cafe","emotion":"Glad","datetime":"2024-03-01T13:00"}}]"#
        );
        let mut session = ImportSession::new();
        let state = svc.submit_import(&mut session, &raw).await.unwrap();
        assert!(matches!(state, ImportState::AwaitingResolution(_)));
        assert_eq!(severities(&notes.drain()), vec![Severity::Info]);

        assert!(svc.cancel_import(&mut session).is_some());
        assert_eq!(severities(&notes.drain()), vec![Severity::Info]);
        assert!(svc.cancel_import(&mut session).is_none());
        assert!(notes.drain().is_empty());

        svc.submit_import(&mut session, &raw).await.unwrap();
        notes.drain();
        svc.resolve_import(&mut session, ResolutionMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(notes.drain()[0].severity, Severity::Success);

        let stored = svc.find_meal(id).await.unwrap().unwrap();
        assert_eq!(stored.description, "Replacement");

        let err = svc
            .resolve_import(&mut session, ResolutionMode::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_partial_import_reports_error() {
        let (svc, notes) = service();
        svc.store()
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON meals
                 WHEN NEW.description = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'quota exceeded'); END;",
            )
            .await
            .unwrap();

        let raw = r#"[
            {"description":"ok","place":"a","emotion":"b","datetime":"2024-03-01T08:00"},
            {"description":"boom","place":"a","emotion":"b","datetime":"2024-03-01T09:00"}
        ]"#;
        let mut session = ImportSession::new();
        let state = svc.submit_import(&mut session, raw).await.unwrap();
        let ImportState::Applied(report) = state else {
            panic!("expected the import to apply");
        };
        assert_eq!(report.created, 1);

        let drained = notes.drain();
        assert_eq!(drained[0].severity, Severity::Error);
        assert!(drained[0].message.contains("1 imported, 1 failed"));
        assert!(drained[0].message.contains("meal #2"));
    }
}
