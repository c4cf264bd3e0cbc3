use anyhow::Result;
use chrono::NaiveDate;

use ritual_core::models::NewEntry;
use ritual_core::service::{HabitService, ToggleOutcome};
use ritual_core::sync::{ConnectivityMonitor, DirectBackend};

use crate::remote::RemoteClient;

use super::helpers::{parse_date, parse_met_flags, resolve_habit};

pub(crate) async fn cmd_done(
    svc: HabitService,
    remote: Option<RemoteClient>,
    selector: &str,
    date: Option<String>,
    met: Option<String>,
    json: bool,
) -> Result<()> {
    toggle(svc, remote, selector, date, met, true, json).await
}

pub(crate) async fn cmd_skip(
    svc: HabitService,
    remote: Option<RemoteClient>,
    selector: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    toggle(svc, remote, selector, date, None, false, json).await
}

async fn toggle(
    svc: HabitService,
    remote: Option<RemoteClient>,
    selector: &str,
    date: Option<String>,
    met: Option<String>,
    completed: bool,
    json: bool,
) -> Result<()> {
    let habit = resolve_habit(svc.db(), selector)?;
    let conditions = svc.db().get_conditions(habit.id)?;
    let conditions_met = parse_met_flags(met.as_deref(), conditions.len())?;
    let date = parse_date(date)?;

    let entry = NewEntry {
        habit_uuid: habit.uuid.clone(),
        date,
        completed,
        conditions_met,
    };

    // The remote backend blocks on its own HTTP calls, so the toggle runs on
    // a blocking thread rather than inside the async runtime.
    let outcome = tokio::task::spawn_blocking(move || -> Result<ToggleOutcome> {
        let mut monitor = ConnectivityMonitor::new();
        match remote {
            Some(client) => svc.toggle_completion(&mut monitor, &client, &entry),
            None => {
                let backend = DirectBackend::new(svc.db());
                svc.toggle_completion(&mut monitor, &backend, &entry)
            }
        }
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&habit.name, date, completed, &outcome);
    }

    Ok(())
}

fn print_outcome(name: &str, date: NaiveDate, completed: bool, outcome: &ToggleOutcome) {
    let verb = if completed { "Done" } else { "Cleared" };
    let current = outcome.streaks.current;
    let best = outcome.streaks.best;
    if outcome.queued {
        println!("{verb}: {name} for {date} (offline — queued for sync)");
    } else {
        println!("{verb}: {name} for {date} — streak {current} (best {best})");
    }
}
