//! Energy profile command for viewing and tuning the hourly curve.

use chrono::{Datelike, Local, TimeZone, Timelike, Utc};
use clap::Subcommand;

use studyplan_core::EnergyProfile;

#[derive(Subcommand)]
pub enum EnergyAction {
    /// Show the energy curve for a day
    Show {
        /// Day of week (0-6 with 0 = Monday, or mon/tue/wed/thu/fri/sat/sun)
        #[arg(long)]
        day: Option<String>,
    },
    /// Record a 1-5 focus rating for an hour of today
    Feedback {
        /// Hour of day (0-23)
        #[arg(long)]
        hour: u32,
        /// Focus rating, 1 (drained) to 5 (sharp)
        #[arg(long)]
        rating: u8,
        /// Weight of the new rating
        #[arg(long, default_value_t = 0.2)]
        rate: f64,
    },
    /// Reset the profile to the default curve
    Reset,
}

pub fn run(action: EnergyAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EnergyAction::Show { day } => show_energy_curve(day),
        EnergyAction::Feedback { hour, rating, rate } => record_feedback(hour, rating, rate),
        EnergyAction::Reset => {
            EnergyProfile::default().save_to(&EnergyProfile::path()?)?;
            println!("energy profile reset to defaults");
            Ok(())
        }
    }
}

fn parse_day(day_str: &str) -> Option<u32> {
    match day_str.to_lowercase().as_str() {
        "0" | "mon" | "monday" => Some(0),
        "1" | "tue" | "tuesday" => Some(1),
        "2" | "wed" | "wednesday" => Some(2),
        "3" | "thu" | "thursday" => Some(3),
        "4" | "fri" | "friday" => Some(4),
        "5" | "sat" | "saturday" => Some(5),
        "6" | "sun" | "sunday" => Some(6),
        _ => None,
    }
}

fn show_energy_curve(day: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let profile = EnergyProfile::load_from(&EnergyProfile::path()?)?;

    let weekday = match day {
        Some(day_str) => parse_day(&day_str).ok_or_else(|| {
            format!("Invalid day: '{day_str}'. Use 0-6 or mon/tue/wed/thu/fri/sat/sun")
        })?,
        None => Local::now().weekday().num_days_from_monday(),
    };

    println!("{}", profile.render_ascii_chart(weekday));

    let peaks = profile.peak_hours(weekday, 0.7);
    if peaks.is_empty() {
        println!("Peak hours: none above 70%");
    } else {
        let hours: Vec<String> = peaks.iter().map(|h| format!("{h:02}:00")).collect();
        println!("Peak hours: {}", hours.join(", "));
    }
    match profile.last_updated {
        Some(at) => println!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last updated: never (default curve)"),
    }
    Ok(())
}

fn record_feedback(hour: u32, rating: u8, rate: f64) -> Result<(), Box<dyn std::error::Error>> {
    if hour > 23 {
        return Err(format!("hour must be 0-23, got {hour}").into());
    }
    if !(0.0..=1.0).contains(&rate) {
        return Err(format!("rate must be within 0-1, got {rate}").into());
    }
    let today = Utc::now().date_naive();
    let at = Utc
        .from_utc_datetime(&today.and_hms_opt(hour, 0, 0).ok_or("invalid hour")?)
        .with_minute(30)
        .ok_or("invalid minute")?;

    let path = EnergyProfile::path()?;
    let mut profile = EnergyProfile::load_from(&path)?;
    let before = profile.energy_for(hour, today.weekday().num_days_from_monday());
    profile.record_feedback(at, rating, rate)?;
    profile.save_to(&path)?;
    let after = profile.energy_for(hour, today.weekday().num_days_from_monday());

    tracing::debug!(hour, rating, rate, "recorded energy feedback");
    println!(
        "{hour:02}:00 energy {:.0}% -> {:.0}%",
        before * 100.0,
        after * 100.0
    );
    Ok(())
}
