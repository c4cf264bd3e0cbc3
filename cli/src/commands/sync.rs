use anyhow::{Result, bail};
use std::process;

use ritual_core::service::HabitService;
use ritual_core::sync::ReconcileReport;

use crate::config::Config;
use crate::remote::RemoteClient;

use super::helpers::json_error;

pub(crate) async fn cmd_sync(svc: HabitService, config: &Config, json: bool) -> Result<()> {
    let Some(url) = config.remote_url() else {
        if json {
            println!("{}", json_error("No remote server configured"));
        } else {
            eprintln!("No remote configured. Set one with: ritual remote set <url>");
        }
        process::exit(2);
    };

    let client = RemoteClient::new(&url, config.remote_key());
    let pending = svc.pending_sync_count()?;

    if !client.is_reachable_async().await {
        if json {
            println!(
                "{}",
                serde_json::json!({ "online": false, "pending": pending })
            );
        } else {
            eprintln!("Server unreachable at {url} — {pending} entries still queued");
        }
        process::exit(2);
    }

    let report = tokio::task::spawn_blocking(move || -> Result<ReconcileReport> {
        svc.reconcile(&client)
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let synced = report.synced.len();
    if synced == 0 && report.is_clean() {
        println!("Nothing to sync.");
    } else {
        println!("Synced {synced} entries.");
    }
    if !report.is_clean() {
        let failed = report.failed.len();
        eprintln!("{failed} entries failed and remain queued:");
        for failure in &report.failed {
            let uuid = &failure.habit_uuid;
            let date = failure.date;
            let error = &failure.error;
            eprintln!("  {uuid} {date}: {error}");
        }
    }

    Ok(())
}

pub(crate) async fn cmd_status(svc: &HabitService, config: &Config, json: bool) -> Result<()> {
    let pending = svc.pending_sync_count()?;
    let remote = config.remote_url();
    let reachable = match remote {
        Some(ref url) => {
            let client = RemoteClient::new(url, config.remote_key());
            Some(client.is_reachable_async().await)
        }
        None => None,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "remote": remote,
                "reachable": reachable,
                "pending": pending,
            }))?
        );
        return Ok(());
    }

    match (remote, reachable) {
        (Some(url), Some(true)) => println!("Remote: {url} (reachable)"),
        (Some(url), _) => println!("Remote: {url} (unreachable)"),
        (None, _) => println!("Remote: none (local database is authoritative)"),
    }
    println!("Pending sync: {pending} entries");

    Ok(())
}

pub(crate) fn cmd_remote_set(
    config: &Config,
    url: &str,
    key: Option<String>,
    json: bool,
) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        bail!("Invalid remote URL '{url}'. Use http:// or https://");
    }
    config.set_remote(url, key.as_deref())?;

    if json {
        println!("{}", serde_json::json!({ "remote": url.trim_end_matches('/') }));
    } else {
        println!("Remote set to {url}");
        if key.is_none() {
            println!("No API key stored; the server must run with --no-auth");
        }
    }

    Ok(())
}

pub(crate) fn cmd_remote_show(config: &Config, json: bool) -> Result<()> {
    let url = config.remote_url();
    let has_key = config.remote_key().is_some();

    if json {
        println!(
            "{}",
            serde_json::json!({ "remote": url, "api_key": has_key })
        );
        return Ok(());
    }

    match url {
        Some(url) => {
            let key_note = if has_key { "API key stored" } else { "no API key" };
            println!("Remote: {url} ({key_note})");
        }
        None => {
            eprintln!("No remote configured. Set one with: ritual remote set <url>");
            process::exit(2);
        }
    }

    Ok(())
}

pub(crate) fn cmd_remote_clear(config: &Config, json: bool) -> Result<()> {
    let removed = config.clear_remote()?;

    if json {
        println!("{}", serde_json::json!({ "cleared": removed }));
    } else if removed {
        println!("Remote cleared; the local database is authoritative again.");
    } else {
        println!("No remote was configured.");
    }

    Ok(())
}
