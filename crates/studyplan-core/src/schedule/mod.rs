//! Calendar types: immovable fixed events and scheduler-authored study blocks.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Namespace for deterministic block identifiers.
const BLOCK_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3a52_9e0d_4b7a_a2f4_51d8_03c9_be11);

/// Kind of fixed calendar commitment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FixedEventKind {
    Lecture,
    Exam,
    Clinical,
    Lab,
    Meeting,
    #[default]
    Other,
}

/// An immovable commitment (class, exam sitting, clinical shift).
///
/// Only ever read by the scheduler, as a busy interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub kind: FixedEventKind,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Blocks every study hour of each day it touches
    #[serde(default)]
    pub all_day: bool,
}

impl FixedEvent {
    /// Create a timed event. Fails unless `start_at < end_at`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        kind: FixedEventKind,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let event = Self {
            id: id.into(),
            title: title.into(),
            course: None,
            kind,
            start_at,
            end_at,
            all_day: false,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    pub fn all_day(mut self) -> Self {
        self.all_day = true;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_at >= self.end_at {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start_at,
                end: self.end_at,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_at < end && self.end_at > start
    }

    /// Calendar dates the event touches; the end instant is exclusive.
    pub fn touches_date(&self, date: NaiveDate) -> bool {
        let last = (self.end_at - Duration::nanoseconds(1)).date_naive();
        self.start_at.date_naive() <= date && date <= last
    }
}

/// Why a block exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlockOrigin {
    /// Primary work toward the task's required hours
    #[default]
    Work,
    /// Short review session before an exam
    Review,
}

/// A work interval bound to exactly one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyBlock {
    pub id: String,
    pub task_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    /// Manually created or edited; never removed by rescheduling
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub origin: BlockOrigin,
}

impl StudyBlock {
    /// Create a scheduler-authored block.
    ///
    /// The id is a UUID v5 over task, origin and start, so identical inputs
    /// yield identical ids.
    pub fn generated(
        task_id: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        origin: BlockOrigin,
    ) -> Self {
        let name = format!("{task_id}/{origin:?}/{}", start_at.timestamp());
        Self {
            id: Uuid::new_v5(&BLOCK_NAMESPACE, name.as_bytes()).to_string(),
            task_id: task_id.to_string(),
            start_at,
            end_at,
            completed: false,
            manual: false,
            origin,
        }
    }

    /// Create a manually pinned block.
    pub fn pinned(
        id: impl Into<String>,
        task_id: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            start_at,
            end_at,
            completed: false,
            manual: true,
            origin: BlockOrigin::Work,
        }
    }

    /// Get total duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    pub fn hours(&self) -> f64 {
        self.duration_minutes() as f64 / 60.0
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_at < end && self.end_at > start
    }

    pub fn is_review(&self) -> bool {
        self.origin == BlockOrigin::Review
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn fixed_event_rejects_inverted_range() {
        let err = FixedEvent::new("e", "Lecture", FixedEventKind::Lecture, at(2, 10), at(2, 9));
        assert!(matches!(err, Err(ValidationError::InvalidTimeRange { .. })));
    }

    #[test]
    fn touches_date_treats_end_as_exclusive() {
        let shift = FixedEvent::new("c", "Clinical", FixedEventKind::Clinical, at(2, 0), at(3, 0))
            .unwrap()
            .all_day();
        assert!(shift.touches_date(at(2, 0).date_naive()));
        assert!(!shift.touches_date(at(3, 0).date_naive()));
    }

    #[test]
    fn generated_ids_are_stable() {
        let a = StudyBlock::generated("t1", at(2, 9), at(2, 11), BlockOrigin::Work);
        let b = StudyBlock::generated("t1", at(2, 9), at(2, 11), BlockOrigin::Work);
        let review = StudyBlock::generated("t1", at(2, 9), at(2, 11), BlockOrigin::Review);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, review.id);
        assert_eq!(a.duration_minutes(), 120);
        assert!(!a.manual);
    }

    #[test]
    fn block_serialization_defaults() {
        let json = r#"{
            "id": "m1",
            "task_id": "t1",
            "start_at": "2026-03-02T09:00:00Z",
            "end_at": "2026-03-02T10:00:00Z"
        }"#;
        let block: StudyBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.origin, BlockOrigin::Work);
        assert!(!block.manual);
        assert!(!block.completed);
    }
}
