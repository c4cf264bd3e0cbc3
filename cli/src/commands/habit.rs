use anyhow::{Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ritual_core::models::{HABIT_COLORS, NewHabit, UpdateHabit};
use ritual_core::service::HabitService;

use super::helpers::{resolve_habit, truncate};

pub(crate) fn cmd_add(
    svc: &HabitService,
    name: &str,
    color: Option<String>,
    reminder: Option<String>,
    conditions: Vec<String>,
    json: bool,
) -> Result<()> {
    let habit = svc.create_habit(&NewHabit {
        name: name.to_string(),
        color: color.unwrap_or_else(|| HABIT_COLORS[0].to_string()),
        reminder_time: reminder,
        conditions,
    })?;

    if json {
        let detail = svc.get_habit_detail(habit.id)?;
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let name = &habit.name;
        let color = &habit.color;
        println!("Added habit: {name} ({color})");
        let conditions = svc.db().get_conditions(habit.id)?;
        for c in &conditions {
            let idx = c.position + 1;
            let cname = &c.name;
            println!("  {idx}. {cname}");
        }
        if let Some(ref time) = habit.reminder_time {
            println!("  Reminder: {time}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_list(svc: &HabitService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HabitRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Habit")]
        name: String,
        #[tabled(rename = "Today")]
        today: String,
        #[tabled(rename = "Streak")]
        streak: i64,
        #[tabled(rename = "Best")]
        best: i64,
        #[tabled(rename = "Conditions")]
        conditions: String,
        #[tabled(rename = "Reminder")]
        reminder: String,
    }

    let statuses = svc.list_with_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        eprintln!("No habits yet. Add one with: ritual add <name>");
        process::exit(2);
    }

    let rows: Vec<HabitRow> = statuses
        .iter()
        .map(|s| HabitRow {
            id: s.habit.id,
            name: truncate(&s.habit.name, 35),
            today: if s.completed_today { "✓" } else { "·" }.to_string(),
            streak: s.streak_current,
            best: s.streak_best,
            conditions: if s.conditions.is_empty() {
                "-".to_string()
            } else {
                s.conditions.len().to_string()
            },
            reminder: s.habit.reminder_time.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
pub(crate) fn cmd_edit(
    svc: &HabitService,
    selector: &str,
    name: Option<String>,
    color: Option<String>,
    reminder: Option<String>,
    no_reminder: bool,
    conditions: Vec<String>,
    clear_conditions: bool,
    json: bool,
) -> Result<()> {
    let habit = resolve_habit(svc.db(), selector)?;

    let reminder_time = if no_reminder {
        Some(None)
    } else {
        reminder.map(Some)
    };
    let conditions = if clear_conditions {
        Some(vec![])
    } else if conditions.is_empty() {
        None
    } else {
        Some(conditions)
    };

    let update = UpdateHabit {
        name,
        color,
        reminder_time,
        conditions,
    };
    if update.name.is_none()
        && update.color.is_none()
        && update.reminder_time.is_none()
        && update.conditions.is_none()
    {
        bail!("Nothing to change. See: ritual edit --help");
    }

    let updated = svc.update_habit(habit.id, &update)?;

    if json {
        let detail = svc.get_habit_detail(updated.id)?;
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let name = &updated.name;
        println!("Updated habit: {name}");
    }

    Ok(())
}

pub(crate) fn cmd_delete(svc: &HabitService, selector: &str, json: bool) -> Result<()> {
    let habit = resolve_habit(svc.db(), selector)?;
    svc.delete_habit(habit.id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": habit.name }));
    } else {
        let name = &habit.name;
        println!("Deleted habit: {name} (entries and conditions removed)");
    }

    Ok(())
}
