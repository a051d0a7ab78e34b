//! Task types for academic obligations.
//!
//! A [`Task`] is a unit of required work with a due date and an effort
//! estimate. The per-type tables on [`TaskType`] provide the built-in
//! defaults (importance, effort multiplier, energy demand, preferred time of
//! day, lead time, hour estimate) that [`crate::SchedulerConfig`] can
//! override.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Closed set of academic task types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Assignment,
    Exam,
    Quiz,
    Project,
    Reading,
    Lab,
    Lecture,
    Clinical,
    Simulation,
    Discussion,
    Paper,
    Presentation,
    Admin,
    Other,
}

impl TaskType {
    pub const ALL: [TaskType; 14] = [
        TaskType::Assignment,
        TaskType::Exam,
        TaskType::Quiz,
        TaskType::Project,
        TaskType::Reading,
        TaskType::Lab,
        TaskType::Lecture,
        TaskType::Clinical,
        TaskType::Simulation,
        TaskType::Discussion,
        TaskType::Paper,
        TaskType::Presentation,
        TaskType::Admin,
        TaskType::Other,
    ];

    /// Stable snake_case name, also used as the key in config tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Assignment => "assignment",
            TaskType::Exam => "exam",
            TaskType::Quiz => "quiz",
            TaskType::Project => "project",
            TaskType::Reading => "reading",
            TaskType::Lab => "lab",
            TaskType::Lecture => "lecture",
            TaskType::Clinical => "clinical",
            TaskType::Simulation => "simulation",
            TaskType::Discussion => "discussion",
            TaskType::Paper => "paper",
            TaskType::Presentation => "presentation",
            TaskType::Admin => "admin",
            TaskType::Other => "other",
        }
    }

    /// Parse from the snake_case name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == lower)
    }

    /// Base importance in [0, 1]. Exams, projects and clinicals score highest.
    pub fn importance_weight(&self) -> f64 {
        match self {
            TaskType::Exam => 1.0,
            TaskType::Project | TaskType::Clinical => 0.9,
            TaskType::Simulation => 0.8,
            TaskType::Paper => 0.75,
            TaskType::Quiz | TaskType::Lab | TaskType::Presentation => 0.7,
            TaskType::Assignment => 0.6,
            TaskType::Discussion | TaskType::Other => 0.4,
            TaskType::Reading | TaskType::Lecture => 0.3,
            TaskType::Admin => 0.2,
        }
    }

    /// Built-in effort multiplier applied to the hour estimate.
    pub fn effort_multiplier(&self) -> f64 {
        match self {
            TaskType::Project | TaskType::Paper => 1.2,
            TaskType::Lab | TaskType::Simulation | TaskType::Presentation => 1.1,
            TaskType::Reading => 0.9,
            TaskType::Lecture | TaskType::Discussion | TaskType::Admin => 0.8,
            _ => 1.0,
        }
    }

    /// How much focus the work needs.
    pub fn energy_demand(&self) -> EnergyLevel {
        match self {
            TaskType::Exam
            | TaskType::Project
            | TaskType::Clinical
            | TaskType::Simulation
            | TaskType::Paper => EnergyLevel::High,
            TaskType::Assignment
            | TaskType::Quiz
            | TaskType::Lab
            | TaskType::Presentation
            | TaskType::Other => EnergyLevel::Medium,
            TaskType::Reading | TaskType::Lecture | TaskType::Discussion | TaskType::Admin => {
                EnergyLevel::Low
            }
        }
    }

    /// Preferred periods of the day, best first.
    pub fn period_preference(&self) -> [DayPeriod; 4] {
        use DayPeriod::*;
        match self {
            TaskType::Exam | TaskType::Quiz | TaskType::Project | TaskType::Simulation => {
                [Morning, Afternoon, Evening, Night]
            }
            TaskType::Paper => [Morning, Evening, Afternoon, Night],
            TaskType::Reading | TaskType::Discussion => [Evening, Afternoon, Night, Morning],
            TaskType::Lecture | TaskType::Clinical => [Evening, Afternoon, Morning, Night],
            TaskType::Admin => [Afternoon, Evening, Morning, Night],
            TaskType::Assignment | TaskType::Lab | TaskType::Presentation | TaskType::Other => {
                [Afternoon, Morning, Evening, Night]
            }
        }
    }

    /// Days before the due date to begin work.
    pub fn default_lead_days(&self) -> u32 {
        match self {
            TaskType::Project => 14,
            TaskType::Exam | TaskType::Paper => 10,
            TaskType::Presentation => 7,
            TaskType::Assignment | TaskType::Simulation => 5,
            TaskType::Quiz | TaskType::Lab => 4,
            TaskType::Reading | TaskType::Clinical | TaskType::Discussion | TaskType::Other => 3,
            TaskType::Lecture | TaskType::Admin => 2,
        }
    }

    /// Hour estimate used when a task carries none.
    pub fn default_hours(&self) -> f64 {
        match self {
            TaskType::Project => 10.0,
            TaskType::Exam => 8.0,
            TaskType::Paper => 6.0,
            TaskType::Presentation => 4.0,
            TaskType::Assignment | TaskType::Lab | TaskType::Simulation => 3.0,
            TaskType::Quiz | TaskType::Clinical | TaskType::Other => 2.0,
            TaskType::Reading => 1.5,
            TaskType::Lecture | TaskType::Discussion => 1.0,
            TaskType::Admin => 0.5,
        }
    }

    /// Exams get review sessions, a review surcharge and the larger buffer.
    pub fn is_exam(&self) -> bool {
        matches!(self, TaskType::Exam)
    }

    /// Whether the due date is immovable when the task leaves it unset.
    pub fn default_hard_deadline(&self) -> bool {
        matches!(self, TaskType::Exam | TaskType::Quiz)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Energy level required by a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    /// Target value on the [0, 1] energy scale.
    pub fn target(&self) -> f64 {
        match self {
            EnergyLevel::Low => 0.35,
            EnergyLevel::Medium => 0.6,
            EnergyLevel::High => 0.85,
        }
    }
}

impl Default for EnergyLevel {
    fn default() -> Self {
        EnergyLevel::Medium
    }
}

/// Coarse part of the day used for type/time affinity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl DayPeriod {
    /// 05-12 morning, 12-17 afternoon, 17-21 evening, otherwise night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => DayPeriod::Morning,
            12..=16 => DayPeriod::Afternoon,
            17..=20 => DayPeriod::Evening,
            _ => DayPeriod::Night,
        }
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self::from_hour(at.hour())
    }
}

/// Completion status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::NotStarted
    }
}

fn default_complexity() -> u8 {
    3
}

/// A unit of required academic work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    pub title: String,
    /// Course reference, used for lecture suppression and slot reservation
    #[serde(default)]
    pub course: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub due_at: DateTime<Utc>,
    /// Estimated hours; the per-type default applies when unset
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    /// Complexity from 1 (trivial) to 5 (hard)
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    /// Unset means the per-type default
    #[serde(default)]
    pub hard_deadline: Option<bool>,
    /// Extra time added to the estimate, in percent
    #[serde(default)]
    pub buffer_percent: f64,
    #[serde(default)]
    pub status: TaskStatus,
    /// Days before the due date to begin; overrides the per-type default
    #[serde(default)]
    pub lead_days: Option<u32>,
}

impl Task {
    /// Create a task with default complexity and no overrides.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        task_type: TaskType,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            course: None,
            task_type,
            due_at,
            estimated_hours: None,
            complexity: default_complexity(),
            hard_deadline: None,
            buffer_percent: 0.0,
            status: TaskStatus::NotStarted,
            lead_days: None,
        }
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_hard_deadline(mut self, hard: bool) -> Self {
        self.hard_deadline = Some(hard);
        self
    }

    pub fn with_buffer_percent(mut self, percent: f64) -> Self {
        self.buffer_percent = percent;
        self
    }

    pub fn with_lead_days(mut self, days: u32) -> Self {
        self.lead_days = Some(days);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Explicit flag, else the per-type default.
    pub fn is_hard_deadline(&self) -> bool {
        self.hard_deadline
            .unwrap_or_else(|| self.task_type.default_hard_deadline())
    }
}

/// Partial update applied by `on_task_changed`.
///
/// `None` leaves the field untouched. `Some(None)` for `course`,
/// `hard_deadline` and `lead_days` clears the override (JSON `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub course: Option<Option<String>>,
    #[serde(default, rename = "type")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub complexity: Option<u8>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub hard_deadline: Option<Option<bool>>,
    #[serde(default)]
    pub buffer_percent: Option<f64>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "clearable", skip_serializing_if = "Option::is_none")]
    pub lead_days: Option<Option<u32>>,
}

/// A present field, `null` included, is `Some`; only a missing one is `None`.
fn clearable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    /// Apply to `task`; returns whether anything changed.
    pub fn apply(&self, task: &mut Task) -> bool {
        let before = task.clone();
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(course) = &self.course {
            task.course = course.clone();
        }
        if let Some(task_type) = self.task_type {
            task.task_type = task_type;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(hours) = self.estimated_hours {
            task.estimated_hours = Some(hours);
        }
        if let Some(complexity) = self.complexity {
            task.complexity = complexity;
        }
        if let Some(hard) = self.hard_deadline {
            task.hard_deadline = hard;
        }
        if let Some(buffer) = self.buffer_percent {
            task.buffer_percent = buffer;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(days) = self.lead_days {
            task.lead_days = days;
        }
        *task != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn task_deserializes_with_defaults() {
        let json = r#"{
            "id": "t1",
            "title": "Chapter 4",
            "type": "reading",
            "due_at": "2026-03-10T09:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_type, TaskType::Reading);
        assert_eq!(task.complexity, 3);
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert!(task.estimated_hours.is_none());
        assert!(!task.is_hard_deadline());
    }

    #[test]
    fn exams_default_to_hard_deadline() {
        let exam = Task::new("e", "Midterm", TaskType::Exam, due());
        assert!(exam.is_hard_deadline());
        let relaxed = exam.with_hard_deadline(false);
        assert!(!relaxed.is_hard_deadline());
    }

    #[test]
    fn type_parse_round_trips_names() {
        for t in TaskType::ALL {
            assert_eq!(TaskType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TaskType::parse("EXAM"), Some(TaskType::Exam));
        assert_eq!(TaskType::parse("homework"), None);
    }

    #[test]
    fn day_period_boundaries() {
        assert_eq!(DayPeriod::from_hour(4), DayPeriod::Night);
        assert_eq!(DayPeriod::from_hour(5), DayPeriod::Morning);
        assert_eq!(DayPeriod::from_hour(12), DayPeriod::Afternoon);
        assert_eq!(DayPeriod::from_hour(17), DayPeriod::Evening);
        assert_eq!(DayPeriod::from_hour(21), DayPeriod::Night);
    }

    #[test]
    fn patch_reports_changes() {
        let mut task = Task::new("t", "Essay", TaskType::Paper, due()).with_hours(4.0);
        let noop = TaskPatch {
            estimated_hours: Some(4.0),
            ..Default::default()
        };
        assert!(!noop.apply(&mut task));

        let later = TaskPatch {
            due_at: Some(due() + chrono::Duration::days(2)),
            ..Default::default()
        };
        assert!(later.apply(&mut task));
        assert_eq!(task.due_at, due() + chrono::Duration::days(2));
    }

    #[test]
    fn patch_clears_overrides() {
        let mut task = Task::new("t", "Midterm", TaskType::Exam, due())
            .with_course("BIO-101")
            .with_lead_days(20)
            .with_hard_deadline(false);

        let patch: TaskPatch =
            serde_json::from_str(r#"{"course": null, "lead_days": null, "hard_deadline": null}"#)
                .unwrap();
        assert_eq!(patch.course, Some(None));
        assert!(patch.apply(&mut task));
        assert!(task.course.is_none());
        assert!(task.lead_days.is_none());
        assert!(task.is_hard_deadline());

        let untouched: TaskPatch = serde_json::from_str(r#"{"title": "Final"}"#).unwrap();
        assert!(untouched.course.is_none());
        assert!(untouched.apply(&mut task));
        assert_eq!(task.title, "Final");
        assert!(task.lead_days.is_none());
    }
}
