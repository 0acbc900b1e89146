use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use morsel_core::notify::Dispatcher;
use morsel_core::reconcile::{ImportReport, ImportSession, ImportState, ResolutionMode};
use morsel_core::service::JournalService;

use super::helpers::{print_meal_table, prompt_resolution};
use super::{Reported, print_notifications};

pub(crate) async fn cmd_export(
    svc: &JournalService,
    from: Option<&str>,
    to: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let json = svc.export(from, to).await?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write export file: {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Payload from `file`, or stdin when no file (or `-`) is given.
fn read_payload(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import file: {}", path.display())),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read import data from stdin")?;
            Ok(buf)
        }
    }
}

pub(crate) struct ImportArgs {
    pub file: Option<PathBuf>,
    pub on_conflict: Option<ResolutionMode>,
    pub json: bool,
}

pub(crate) async fn cmd_import(
    svc: &JournalService,
    notes: &Dispatcher,
    args: ImportArgs,
) -> Result<()> {
    let raw = read_payload(args.file.as_deref())?;
    let reads_stdin = args.file.as_deref().is_none_or(|p| p == Path::new("-"));
    run_import(svc, &raw, args.on_conflict, args.json, || {
        print_notifications(notes);
        if reads_stdin {
            eprintln!("Import data came from stdin; pass --on-conflict to choose without a prompt.");
            return Ok(None);
        }
        prompt_resolution(io::stdin().lock())
    })
    .await
}

async fn run_import<F>(
    svc: &JournalService,
    raw: &str,
    on_conflict: Option<ResolutionMode>,
    json: bool,
    ask: F,
) -> Result<()>
where
    F: FnOnce() -> Result<Option<ResolutionMode>>,
{
    let mut session = ImportSession::new();

    let awaiting = match svc.submit_import(&mut session, raw).await? {
        ImportState::AwaitingResolution(pending) => {
            if on_conflict.is_none() && !json {
                println!("These meals already exist:\n");
                print_meal_table(&pending.collisions);
            }
            true
        }
        _ => false,
    };

    if awaiting {
        let mode = match on_conflict {
            Some(mode) => Some(mode),
            None => ask()?,
        };
        match mode {
            Some(mode) => {
                svc.resolve_import(&mut session, mode).await?;
            }
            None => {
                let dropped = svc.cancel_import(&mut session).map_or(0, |p| p.incoming.len());
                if json {
                    println!("{}", serde_json::json!({ "cancelled": true, "discarded": dropped }));
                } else {
                    println!("Import cancelled. Nothing was written.");
                }
                return Ok(());
            }
        }
    }

    let Some(report) = session.report() else {
        return Ok(());
    };
    print_report(report, json);
    if report.is_success() {
        Ok(())
    } else {
        Err(Reported.into())
    }
}

fn print_report(report: &ImportReport, json: bool) {
    if json {
        let failures: Vec<_> = report
            .failures
            .iter()
            .map(|f| {
                serde_json::json!({
                    "index": f.index,
                    "id": f.id,
                    "error": f.error.to_string(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "mode": report.mode.to_string(),
                "created": report.created,
                "updated": report.updated,
                "failures": failures,
            })
        );
        return;
    }

    println!("Import complete ({}).\n", report.mode);
    println!("  Created: {}", report.created);
    println!("  Updated: {}", report.updated);
    println!("  Failed:  {}", report.failures.len());
    for f in &report.failures {
        let id = f.id.map_or_else(|| "-".into(), |id| id.to_string());
        println!("    #{} (id {id}): {}", f.index + 1, f.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morsel_core::models::Meal;
    use std::sync::Arc;

    fn service() -> (JournalService, Arc<Dispatcher>) {
        let notes = Arc::new(Dispatcher::new());
        (JournalService::new_in_memory(notes.clone()), notes)
    }

    fn colliding(id: i64) -> String {
        format!(
            r#"[{{"id":{id},"description":"Imported","place":"Cafe","emotion":"Glad","datetime":"2024-03-01T13:00:00.000Z"}}]"#
        )
    }

    async fn seed(svc: &JournalService) -> i64 {
        let meal = Meal::new("Original", "Home", "Calm", chrono::Local::now());
        svc.log_meal(&meal).await.unwrap()
    }

    #[tokio::test]
    async fn test_export_to_file_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");

        let (svc, _notes) = service();
        let id = seed(&svc).await;
        let today = chrono::Local::now().date_naive().to_string();
        cmd_export(&svc, Some(&today), Some(&today), Some(&path))
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"Original\""));
        assert!(written.contains(&format!("\"id\": {id}")));

        let (target, _notes) = service();
        let args = ImportArgs {
            file: Some(path),
            on_conflict: None,
            json: true,
        };
        cmd_import(&target, &Dispatcher::new(), args).await.unwrap();
        assert_eq!(target.store().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let (svc, notes) = service();
        let args = ImportArgs {
            file: Some(PathBuf::from("/nonexistent/meals.json")),
            on_conflict: None,
            json: false,
        };
        let err = cmd_import(&svc, &notes, args).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read import file"));
    }

    #[tokio::test]
    async fn test_on_conflict_skips_prompt() {
        let (svc, _notes) = service();
        let id = seed(&svc).await;
        run_import(&svc, &colliding(id), Some(ResolutionMode::Overwrite), false, || {
            panic!("should not prompt when a mode is given")
        })
        .await
        .unwrap();

        let all = svc.store().list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "Imported");
    }

    #[tokio::test]
    async fn test_prompt_answer_is_used() {
        let (svc, _notes) = service();
        let id = seed(&svc).await;
        run_import(&svc, &colliding(id), None, false, || {
            Ok(Some(ResolutionMode::Duplicate))
        })
        .await
        .unwrap();
        assert_eq!(svc.store().list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_cancel_writes_nothing() {
        let (svc, notes) = service();
        let id = seed(&svc).await;
        notes.drain();
        run_import(&svc, &colliding(id), None, true, || Ok(None))
            .await
            .unwrap();

        let all = svc.store().list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "Original");
        assert!(notes.drain().iter().any(|n| n.message.starts_with("Import cancelled")));
    }
}
