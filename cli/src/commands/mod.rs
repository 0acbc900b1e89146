mod helpers;
mod journal;
mod meal;
mod transfer;

use std::fmt;

use morsel_core::notify::Dispatcher;

pub(crate) use helpers::json_error;
pub(crate) use journal::{cmd_dates, cmd_list};
pub(crate) use meal::{MealEdit, cmd_add, cmd_delete, cmd_edit};
pub(crate) use transfer::{ImportArgs, cmd_export, cmd_import};

/// Returned when the failure has already been shown to the user as a
/// notification or in the command's own output.
#[derive(Debug)]
pub(crate) struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("command failed; see messages above")
    }
}

impl std::error::Error for Reported {}

/// Print and clear every queued notification, oldest first.
pub(crate) fn print_notifications(notes: &Dispatcher) {
    for note in notes.drain() {
        eprintln!("{note}");
    }
}
