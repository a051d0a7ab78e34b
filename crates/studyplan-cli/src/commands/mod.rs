pub mod complete;
pub mod config;
pub mod energy;
pub mod plan;

use chrono::{DateTime, Utc};
use studyplan_core::{ScheduleUpdate, SchedulerConfig};

/// `--now` as RFC 3339, or the wall clock.
pub fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match now {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid --now '{s}': {e}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Stored config with an optional seed override.
pub fn load_config(seed: Option<u64>) -> Result<SchedulerConfig, Box<dyn std::error::Error>> {
    let mut config = SchedulerConfig::load()?;
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

/// Print an update as JSON or as a plain listing.
pub fn print_update(update: &ScheduleUpdate, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = &update.outcome;
    if json {
        println!("{}", serde_json::to_string_pretty(outcome.as_ref())?);
        return Ok(());
    }

    if outcome.blocks.is_empty() {
        println!("No study blocks scheduled.");
    }
    for block in &outcome.blocks {
        let mut tags = Vec::new();
        if block.is_review() {
            tags.push("review");
        }
        if block.manual {
            tags.push("manual");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        println!(
            "{} - {}  {}{}",
            block.start_at.format("%a %Y-%m-%d %H:%M"),
            block.end_at.format("%H:%M"),
            block.task_id,
            tags
        );
    }

    if !outcome.reports.is_empty() {
        println!("\nTasks:");
        for report in &outcome.reports {
            print!(
                "  {:<20} {:<12} {:>5.1}h / {:>5.1}h",
                report.task_id, report.status, report.scheduled_hours, report.required_hours
            );
            if report.missing_reviews > 0 {
                print!("  ({} review(s) missing)", report.missing_reviews);
            }
            println!();
        }
    }
    for skipped in &outcome.skipped {
        println!("  {:<20} skipped: {}", skipped.task_id, skipped.reason);
    }
    Ok(())
}
