use anyhow::Result;
use chrono::Local;

use ritual_core::service::HabitService;
use ritual_core::streak::compute_streaks;

use super::helpers::{activity_strip, resolve_habit};

pub(crate) fn cmd_show(svc: &HabitService, selector: &str, days: u32, json: bool) -> Result<()> {
    let habit = resolve_habit(svc.db(), selector)?;
    let detail = svc.get_habit_detail(habit.id)?;
    let today = Local::now().date_naive();
    let streaks = compute_streaks(&detail.entries, today);

    if json {
        let value = serde_json::json!({
            "habit": detail.habit,
            "conditions": detail.conditions,
            "entries": detail.entries,
            "streak_current": streaks.current,
            "streak_best": streaks.best,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let name = &detail.habit.name;
    println!("=== {name} ===\n");

    let color = &detail.habit.color;
    match detail.habit.reminder_time {
        Some(ref time) => println!("  Color: {color}   Reminder: {time}"),
        None => println!("  Color: {color}"),
    }

    if !detail.conditions.is_empty() {
        println!("  Conditions:");
        for c in &detail.conditions {
            let idx = c.position + 1;
            let cname = &c.name;
            println!("    {idx}. {cname}");
        }
    }

    let current = streaks.current;
    let best = streaks.best;
    println!("  Streak: {current} (best {best})");

    let completed_days = detail
        .entries
        .iter()
        .filter(|e| e.completed && (today - e.date).num_days() < i64::from(days) && e.date <= today)
        .count();
    let strip = activity_strip(&detail.entries, today, days);
    println!("\n  Last {days} days ({completed_days} done, oldest first):");
    println!("  {strip}");

    Ok(())
}
