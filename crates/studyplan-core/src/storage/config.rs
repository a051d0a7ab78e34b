//! TOML-based scheduler configuration.
//!
//! Stores the user-tunable scheduling policy:
//! - Study-hours window and daily/weekend hour caps
//! - Session length bounds and breaks
//! - Per-type lead times, hour estimates and effort multipliers
//! - Exam buffers and review sessions
//! - Priority and slot-scoring weights
//!
//! Configuration is stored at `~/.config/studyplan/config.toml`.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::scheduler::ScoringWeights;
use crate::task::TaskType;
use crate::timeline::PriorityWeights;

/// Furthest ahead any lead time or buffer may reach.
pub const MAX_HORIZON_DAYS: u32 = 366;

const MINUTES_PER_DAY: i64 = 24 * 60;
const MAX_DEBOUNCE_MS: u64 = 60 * 60 * 1000;

/// How a task's hours are laid out across its window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpreadStrategy {
    /// Spread sessions evenly across the window
    #[default]
    Distributed,
    /// Pack sessions close to the deadline
    Compressed,
}

/// Scheduler policy.
///
/// Serialized to/from TOML at `~/.config/studyplan/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cap on scheduled hours Monday to Friday
    #[serde(default = "default_daily_max_hours")]
    pub daily_max_hours: f64,
    /// Cap on scheduled hours on Saturday and Sunday
    #[serde(default = "default_weekend_max_hours")]
    pub weekend_max_hours: f64,
    /// Start of the study window (HH:MM)
    #[serde(default = "default_study_start")]
    pub study_start: String,
    /// End of the study window (HH:MM)
    #[serde(default = "default_study_end")]
    pub study_end: String,
    #[serde(default = "default_min_session")]
    pub min_session_minutes: i64,
    #[serde(default = "default_max_session")]
    pub max_session_minutes: i64,
    #[serde(default = "default_preferred_session")]
    pub preferred_session_minutes: i64,
    /// Break kept between consecutive sessions
    #[serde(default = "default_break")]
    pub break_minutes: i64,
    /// Step between candidate start times
    #[serde(default = "default_granularity")]
    pub slot_granularity_minutes: i64,
    /// Days before due to begin, by task type
    #[serde(default = "default_lead_days")]
    pub lead_days: BTreeMap<String, u32>,
    /// Hour estimate for tasks without one, by task type
    #[serde(default = "default_hours")]
    pub default_hours: BTreeMap<String, f64>,
    /// Effort multiplier applied to the estimate, by task type
    #[serde(default = "default_effort_multipliers")]
    pub effort_multipliers: BTreeMap<String, f64>,
    /// Review sessions placed on the days before an exam
    #[serde(default = "default_buffer_before_exam")]
    pub buffer_before_exam: u32,
    #[serde(default = "default_review_session")]
    pub review_session_minutes: i64,
    /// Hours added to an exam's required hours
    #[serde(default = "default_exam_review_hours")]
    pub exam_review_hours: f64,
    /// Days between the soft deadline and the due date for exams
    #[serde(default = "default_exam_buffer_days")]
    pub exam_buffer_days: u32,
    /// Days between the soft deadline and the due date for everything else
    #[serde(default)]
    pub routine_buffer_days: u32,
    #[serde(default)]
    pub spread: SpreadStrategy,
    /// Sessions per task per day when packing
    #[serde(default = "default_max_sessions_per_day")]
    pub max_sessions_per_day: u32,
    #[serde(default)]
    pub priority: PriorityWeights,
    #[serde(default)]
    pub scoring: ScoringWeights,
    /// Seed for slot selection; unset means entropy
    #[serde(default)]
    pub seed: Option<u64>,
    /// How long past due a task is still accepted
    #[serde(default = "default_overdue_grace_hours")]
    pub overdue_grace_hours: i64,
    /// Window in which rescheduling triggers coalesce
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

// Default functions
fn default_daily_max_hours() -> f64 {
    6.0
}
fn default_weekend_max_hours() -> f64 {
    4.0
}
fn default_study_start() -> String {
    "08:00".into()
}
fn default_study_end() -> String {
    "22:00".into()
}
fn default_min_session() -> i64 {
    30
}
fn default_max_session() -> i64 {
    120
}
fn default_preferred_session() -> i64 {
    90
}
fn default_break() -> i64 {
    15
}
fn default_granularity() -> i64 {
    30
}
fn default_lead_days() -> BTreeMap<String, u32> {
    TaskType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), t.default_lead_days()))
        .collect()
}
fn default_hours() -> BTreeMap<String, f64> {
    TaskType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), t.default_hours()))
        .collect()
}
fn default_effort_multipliers() -> BTreeMap<String, f64> {
    TaskType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), t.effort_multiplier()))
        .collect()
}
fn default_buffer_before_exam() -> u32 {
    2
}
fn default_review_session() -> i64 {
    120
}
fn default_exam_review_hours() -> f64 {
    2.0
}
fn default_exam_buffer_days() -> u32 {
    2
}
fn default_max_sessions_per_day() -> u32 {
    2
}
fn default_overdue_grace_hours() -> i64 {
    24
}
fn default_debounce_ms() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_max_hours: default_daily_max_hours(),
            weekend_max_hours: default_weekend_max_hours(),
            study_start: default_study_start(),
            study_end: default_study_end(),
            min_session_minutes: default_min_session(),
            max_session_minutes: default_max_session(),
            preferred_session_minutes: default_preferred_session(),
            break_minutes: default_break(),
            slot_granularity_minutes: default_granularity(),
            lead_days: default_lead_days(),
            default_hours: default_hours(),
            effort_multipliers: default_effort_multipliers(),
            buffer_before_exam: default_buffer_before_exam(),
            review_session_minutes: default_review_session(),
            exam_review_hours: default_exam_review_hours(),
            exam_buffer_days: default_exam_buffer_days(),
            routine_buffer_days: 0,
            spread: SpreadStrategy::default(),
            max_sessions_per_day: default_max_sessions_per_day(),
            priority: PriorityWeights::default(),
            scoring: ScoringWeights::default(),
            seed: None,
            overdue_grace_hours: default_overdue_grace_hours(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn parse_hhmm(key: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ConfigError::invalid(key, format!("expected HH:MM, got '{value}'")))
}

impl SchedulerConfig {
    /// Study window as wall-clock times.
    pub fn study_window(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let start = parse_hhmm("study_start", &self.study_start)?;
        let end = parse_hhmm("study_end", &self.study_end)?;
        Ok((start, end))
    }

    /// Check every field a scheduling pass depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (start, end) = self.study_window()?;
        if start >= end {
            return Err(ConfigError::invalid(
                "study_end",
                "study window must end after it starts",
            ));
        }
        if self.min_session_minutes <= 0 {
            return Err(ConfigError::invalid("min_session_minutes", "must be positive"));
        }
        if self.max_session_minutes < self.min_session_minutes {
            return Err(ConfigError::invalid(
                "max_session_minutes",
                "must be at least min_session_minutes",
            ));
        }
        if self.preferred_session_minutes < self.min_session_minutes
            || self.preferred_session_minutes > self.max_session_minutes
        {
            return Err(ConfigError::invalid(
                "preferred_session_minutes",
                "must lie between min and max session length",
            ));
        }
        if self.slot_granularity_minutes <= 0 {
            return Err(ConfigError::invalid("slot_granularity_minutes", "must be positive"));
        }
        if self.break_minutes < 0 || self.review_session_minutes <= 0 {
            return Err(ConfigError::invalid(
                "break_minutes",
                "breaks must be non-negative and review sessions positive",
            ));
        }
        for (key, value) in [
            ("daily_max_hours", self.daily_max_hours),
            ("weekend_max_hours", self.weekend_max_hours),
        ] {
            if !value.is_finite() || !(0.0..=24.0).contains(&value) {
                return Err(ConfigError::invalid(key, "must be between 0 and 24 hours"));
            }
        }
        for (key, value) in [
            ("max_session_minutes", self.max_session_minutes),
            ("slot_granularity_minutes", self.slot_granularity_minutes),
            ("break_minutes", self.break_minutes),
            ("review_session_minutes", self.review_session_minutes),
        ] {
            if value > MINUTES_PER_DAY {
                return Err(ConfigError::invalid(key, "must not exceed one day"));
            }
        }
        for (key, value) in [
            ("buffer_before_exam", self.buffer_before_exam),
            ("exam_buffer_days", self.exam_buffer_days),
            ("routine_buffer_days", self.routine_buffer_days),
        ] {
            if value > MAX_HORIZON_DAYS {
                return Err(ConfigError::invalid(
                    key,
                    format!("must not exceed {MAX_HORIZON_DAYS} days"),
                ));
            }
        }
        for (name, days) in &self.lead_days {
            if *days > MAX_HORIZON_DAYS {
                return Err(ConfigError::invalid(
                    &format!("lead_days.{name}"),
                    format!("must not exceed {MAX_HORIZON_DAYS} days"),
                ));
            }
        }
        for (table, values) in [
            ("default_hours", &self.default_hours),
            ("effort_multipliers", &self.effort_multipliers),
        ] {
            for (name, value) in values {
                if !(value.is_finite() && *value > 0.0) {
                    return Err(ConfigError::invalid(
                        &format!("{table}.{name}"),
                        "must be a positive number",
                    ));
                }
            }
        }
        if !(self.exam_review_hours.is_finite() && self.exam_review_hours >= 0.0) {
            return Err(ConfigError::invalid(
                "exam_review_hours",
                "must be a non-negative number",
            ));
        }
        if !(0..=i64::from(MAX_HORIZON_DAYS) * 24).contains(&self.overdue_grace_hours) {
            return Err(ConfigError::invalid(
                "overdue_grace_hours",
                "must be between 0 hours and the planning horizon",
            ));
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::invalid("debounce_ms", "must not exceed one hour"));
        }
        self.priority.validate()?;
        self.scoring.validate()?;
        Ok(())
    }

    pub fn lead_days_for(&self, task_type: TaskType) -> u32 {
        self.lead_days
            .get(task_type.as_str())
            .copied()
            .unwrap_or_else(|| task_type.default_lead_days())
    }

    pub fn default_hours_for(&self, task_type: TaskType) -> f64 {
        self.default_hours
            .get(task_type.as_str())
            .copied()
            .unwrap_or_else(|| task_type.default_hours())
    }

    pub fn effort_multiplier_for(&self, task_type: TaskType) -> f64 {
        self.effort_multipliers
            .get(task_type.as_str())
            .copied()
            .unwrap_or_else(|| task_type.effort_multiplier())
    }

    /// Minutes that may be scheduled on `date`.
    pub fn day_cap_minutes(&self, date: NaiveDate) -> i64 {
        let hours = match date.weekday() {
            Weekday::Sat | Weekday::Sun => self.weekend_max_hours,
            _ => self.daily_max_hours,
        };
        (hours * 60.0).round() as i64
    }

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => {
                        serde_json::Value::Bool(value.parse::<bool>().map_err(|_| {
                            ConfigError::invalid(key, format!("cannot parse '{value}' as bool"))
                        })?)
                    }
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    ConfigError::invalid(key, format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(ConfigError::invalid(
                                key,
                                format!("cannot parse '{value}' as number"),
                            ));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value)
                            .map_err(|e| ConfigError::invalid(key, e.to_string()))?
                    }
                    // `seed` is null until set
                    serde_json::Value::Null => match value.parse::<u64>() {
                        Ok(n) => serde_json::Value::Number(n.into()),
                        Err(_) if value == "none" => serde_json::Value::Null,
                        Err(_) => serde_json::Value::String(value.into()),
                    },
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `<data_dir>/config.toml`
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: SchedulerConfig = toml::from_str(&content).map_err(|e| {
                    ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: SchedulerConfig = serde_json::from_value(json)
            .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
