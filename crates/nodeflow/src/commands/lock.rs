use colored::Colorize;
use nodeflow_config::LockSettings;
use nodeflow_lock::{LockConfig, LockCoordinator};
use std::path::PathBuf;

/// Coordinator over `dir`, else over the configured lock directory
fn coordinator(dir: Option<PathBuf>) -> LockCoordinator {
    let settings = match nodeflow_config::load() {
        Ok(properties) => properties.lock,
        Err(e) => {
            tracing::debug!("using default lock settings: {}", e);
            LockSettings::default()
        }
    };
    let root = dir.unwrap_or_else(|| settings.dir());
    LockCoordinator::new(
        root,
        LockConfig::new(settings.expiry(), settings.poll_interval()),
    )
}

pub async fn list(dir: Option<PathBuf>) -> anyhow::Result<()> {
    let locks = coordinator(dir);
    println!(
        "Lock directory: {}",
        locks.root().display().to_string().cyan()
    );

    let entries = locks.list().await?;
    if entries.is_empty() {
        println!("{}", "No locks".dimmed());
        return Ok(());
    }

    let now = chrono::Utc::now();
    for entry in &entries {
        let state = if entry.stale {
            "stale".red().bold()
        } else if entry.holders.is_empty() {
            "free".green()
        } else {
            "held".yellow()
        };
        println!();
        println!("{} [{}] {}", entry.name.bold(), entry.kind, state);

        for holder in &entry.holders {
            let age = (now - holder.refreshed_at).num_seconds();
            println!(
                "  holder {} since {} (refreshed {}s ago)",
                holder.holder.cyan(),
                holder.acquired_at.format("%Y-%m-%d %H:%M:%S"),
                age
            );
        }

        if let Some(mark) = &entry.marked {
            println!(
                "  {} by {} at {}: {}",
                "marked for deletion".red(),
                mark.holder,
                mark.marked_at.format("%Y-%m-%d %H:%M:%S"),
                mark.reason
            );
        }
    }
    Ok(())
}

pub async fn clear(name: Option<String>, marked: bool, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let locks = coordinator(dir);

    if marked {
        let cleared = locks.clear_marked().await?;
        if cleared.is_empty() {
            println!("{}", "No locks are marked for deletion".dimmed());
        }
        for name in cleared {
            println!("{} {}", "✓ Cleared".green(), name);
        }
        return Ok(());
    }

    let Some(name) = name else {
        anyhow::bail!("specify a lock name or --marked");
    };
    if locks.clear(&name).await? {
        println!("{} {}", "✓ Cleared".green(), name);
    } else {
        println!("{} {}", "No such lock:".yellow(), name);
    }
    Ok(())
}
