//! Energy profile type and learning from feedback.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ValidationError};
use crate::storage::data_dir;

/// Default hourly curve: low overnight, morning peak, post-lunch dip,
/// late-afternoon recovery, evening decline.
const DEFAULT_HOURLY: [f64; 24] = [
    0.10, 0.10, 0.10, 0.10, 0.10, 0.15, // 00-05
    0.30, 0.45, 0.65, 0.85, 0.90, 0.85, // 06-11
    0.70, 0.55, 0.55, 0.65, 0.75, 0.75, // 12-17
    0.70, 0.65, 0.60, 0.50, 0.35, 0.20, // 18-23
];

/// Monday first.
const DEFAULT_DAY_MULTIPLIERS: [f64; 7] = [1.0, 1.0, 1.0, 1.0, 1.0, 0.9, 0.9];

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Hour-of-day productivity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyProfile {
    /// Normalized productivity per hour (0-23), each in [0, 1]
    pub hourly: [f64; 24],
    /// Multiplier per weekday, Monday first
    #[serde(default = "default_day_multipliers")]
    pub day_multipliers: [f64; 7],
    /// When feedback last changed the profile
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_day_multipliers() -> [f64; 7] {
    DEFAULT_DAY_MULTIPLIERS
}

impl Default for EnergyProfile {
    fn default() -> Self {
        Self {
            hourly: DEFAULT_HOURLY,
            day_multipliers: DEFAULT_DAY_MULTIPLIERS,
            last_updated: None,
        }
    }
}

/// Outcome of one finished study session, used to learn the curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFeedback {
    pub started_at: DateTime<Utc>,
    pub planned_minutes: u32,
    pub actual_minutes: u32,
    pub completed: bool,
}

impl EnergyProfile {
    /// A profile with the same value at every hour and no weekday scaling.
    pub fn flat(level: f64) -> Self {
        Self {
            hourly: [level.clamp(0.0, 1.0); 24],
            day_multipliers: [1.0; 7],
            last_updated: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(bad) = self.hourly.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(ValidationError::InvalidValue {
                field: "hourly".into(),
                message: format!("{bad} is outside [0, 1]"),
            });
        }
        if self.day_multipliers.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(ValidationError::InvalidValue {
                field: "day_multipliers".into(),
                message: "multipliers must be non-negative".into(),
            });
        }
        Ok(())
    }

    /// Energy for an hour on a weekday (0 = Monday), clamped to [0, 1].
    pub fn energy_for(&self, hour: u32, weekday: u32) -> f64 {
        let base = self.hourly[(hour % 24) as usize];
        let mult = self.day_multipliers[(weekday % 7) as usize];
        (base * mult).clamp(0.0, 1.0)
    }

    pub fn energy_at(&self, at: DateTime<Utc>) -> f64 {
        self.energy_for(at.hour(), at.weekday().num_days_from_monday())
    }

    /// Minute-weighted mean energy across `[start, end)`.
    pub fn mean_energy(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        if end <= start {
            return self.energy_at(start);
        }
        let mut total = 0.0;
        let mut minutes = 0i64;
        let mut cursor = start;
        while cursor < end {
            let hour_start = cursor
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(cursor);
            let next = (hour_start + Duration::hours(1)).min(end);
            let span = (next - cursor).num_minutes().max(1);
            total += self.energy_at(cursor) * span as f64;
            minutes += span;
            cursor = next;
        }
        total / minutes as f64
    }

    /// Set one hour's value.
    pub fn set_hour(&mut self, hour: u32, value: f64) -> Result<(), ValidationError> {
        if hour > 23 || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::InvalidValue {
                field: format!("hourly[{hour}]"),
                message: format!("hour must be 0-23 and value in [0, 1], got {value}"),
            });
        }
        self.hourly[hour as usize] = value;
        Ok(())
    }

    /// Blend a 1-5 focus rating into the hour it was given for.
    ///
    /// `learning_rate` is the weight of the new observation.
    pub fn record_feedback(
        &mut self,
        at: DateTime<Utc>,
        rating: u8,
        learning_rate: f64,
    ) -> Result<(), ValidationError> {
        if !(1..=5).contains(&rating) {
            return Err(ValidationError::InvalidValue {
                field: "rating".into(),
                message: format!("expected 1-5, got {rating}"),
            });
        }
        let observed = f64::from(rating - 1) / 4.0;
        self.blend(at.hour(), observed, learning_rate);
        self.last_updated = Some(at);
        Ok(())
    }

    /// Fold finished sessions into the curve.
    ///
    /// Each hour with sessions is scored 60% on completion rate and 40% on
    /// focus quality (actual / planned minutes), then blended in.
    pub fn learn_from_sessions(&mut self, sessions: &[SessionFeedback], learning_rate: f64) {
        let mut touched = None;
        for hour in 0..24u32 {
            let in_hour: Vec<_> = sessions
                .iter()
                .filter(|s| s.started_at.hour() == hour)
                .collect();
            if in_hour.is_empty() {
                continue;
            }

            let completed = in_hour.iter().filter(|s| s.completed).count();
            let completion_rate = completed as f64 / in_hour.len() as f64;

            let planned: u32 = in_hour.iter().map(|s| s.planned_minutes).sum();
            let actual: u32 = in_hour.iter().map(|s| s.actual_minutes).sum();
            let focus_quality = if planned > 0 {
                (f64::from(actual) / f64::from(planned)).min(1.0)
            } else {
                0.5
            };

            self.blend(hour, 0.6 * completion_rate + 0.4 * focus_quality, learning_rate);
            touched = in_hour.iter().map(|s| s.started_at).max().max(touched);
        }
        if touched.is_some() {
            self.last_updated = touched;
        }
    }

    fn blend(&mut self, hour: u32, observed: f64, learning_rate: f64) {
        let rate = learning_rate.clamp(0.0, 1.0);
        let slot = &mut self.hourly[(hour % 24) as usize];
        *slot = ((1.0 - rate) * *slot + rate * observed).clamp(0.0, 1.0);
    }

    /// Hours at or above `min_energy` on a weekday, in hour order.
    pub fn peak_hours(&self, weekday: u32, min_energy: f64) -> Vec<u32> {
        (0..24)
            .filter(|h| self.energy_for(*h, weekday) >= min_energy)
            .collect()
    }

    /// Render the curve as an ASCII chart for a weekday (0 = Monday).
    pub fn render_ascii_chart(&self, weekday: u32) -> String {
        let mut output = format!("\n{} Energy Profile:\n", DAY_NAMES[(weekday % 7) as usize]);
        output.push_str(&"─".repeat(46));
        output.push('\n');

        for hour in 0..24 {
            let energy = self.energy_for(hour, weekday);
            let bar_length = (energy * 30.0).round() as usize;
            output.push_str(&format!(
                "{:02}:00 {}{} {:>3.0}%\n",
                hour,
                "█".repeat(bar_length),
                " ".repeat(30 - bar_length),
                energy * 100.0
            ));
        }

        output.push_str(&"─".repeat(46));
        output.push('\n');
        output
    }

    /// `<data_dir>/energy.json`
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("energy.json"))
    }

    /// Load from `path`; a missing file is the default profile.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let profile: EnergyProfile = serde_json::from_str(&content)?;
                profile.validate()?;
                Ok(profile)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
