// System status display — shows DB stats, subscriptions and stored snapshots.

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::state::{ConcernStateManager, GroupId, LiveStatus, Target};

/// Display one site's subscriptions and snapshots to the terminal.
pub async fn show(manager: &ConcernStateManager, db_display_path: &str) -> Result<()> {
    if !Path::new(db_display_path).exists() {
        println!("Database: not initialized");
        println!("\nRun `watchpost init` to set up the database.");
        return Ok(());
    }

    // Database file size
    let file_size = std::fs::metadata(db_display_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Database: {} ({})", db_display_path, file_size);
    println!("Site: {}", manager.site().bold());

    let subs = manager.list_subscriptions().await?;
    if subs.is_empty() {
        println!("Subscriptions: none");
        println!("  Run `watchpost subscribe --site {} ...` to add one", manager.site());
        return Ok(());
    }

    let mut by_target: BTreeMap<String, (Target, Vec<(GroupId, String)>)> = BTreeMap::new();
    for sub in &subs {
        let kinds: Vec<&str> = sub.state.kinds.iter().map(|k| k.as_str()).collect();
        by_target
            .entry(sub.target.id.to_string())
            .or_insert_with(|| (sub.target.clone(), Vec::new()))
            .1
            .push((sub.group, kinds.join("+")));
    }
    println!(
        "Subscriptions: {} across {} targets",
        subs.len(),
        by_target.len()
    );

    for (target, groups) in by_target.values() {
        let line = match manager.get_snapshot(target).await? {
            Some(snap) => {
                let status = match snap.status {
                    LiveStatus::Living => "living".green().bold(),
                    LiveStatus::Waiting => "waiting".yellow(),
                    LiveStatus::Offline => "offline".dimmed(),
                };
                let last = snap
                    .last_content_id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "{} [{}] {}  last item {}  (updated {})",
                    snap.name,
                    status,
                    snap.title,
                    last,
                    snap.updated_at.format("%Y-%m-%d %H:%M")
                )
            }
            None => "not polled yet".dimmed().to_string(),
        };
        println!("  {}: {}", target.id.to_string().bold(), line);
        for (group, kinds) in groups {
            println!("    group {group} ({kinds})");
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
