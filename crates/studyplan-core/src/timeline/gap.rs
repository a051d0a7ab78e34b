//! Free-gap detection for a single day.
//!
//! Collects the day's busy intervals (fixed events and placed study blocks),
//! merges them, and subtracts them from the study-hours window.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::{FixedEvent, FixedEventKind, StudyBlock};
use crate::storage::SchedulerConfig;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Intersection, if non-empty.
    pub fn clip(&self, bounds: &Interval) -> Option<Interval> {
        Interval::new(self.start.max(bounds.start), self.end.min(bounds.end))
    }
}

/// Sort by start and merge intervals that overlap or touch.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Parts of `window` not covered by `busy`, which must be merged and sorted.
pub fn subtract(window: &Interval, busy: &[Interval]) -> Vec<Interval> {
    let mut free = Vec::new();
    let mut last_end = window.start;

    for interval in busy {
        // Skip intervals that end before our current position
        if interval.end <= last_end {
            continue;
        }
        if interval.start >= window.end {
            break;
        }
        if interval.start > last_end {
            free.extend(Interval::new(last_end, interval.start.min(window.end)));
        }
        last_end = interval.end.min(window.end);
    }

    if last_end < window.end {
        free.extend(Interval::new(last_end, window.end));
    }
    free
}

/// A free gap in which study blocks can be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGap {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl TimeGap {
    /// Get duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }
}

impl From<Interval> for TimeGap {
    fn from(i: Interval) -> Self {
        Self {
            start_at: i.start,
            end_at: i.end,
        }
    }
}

/// Derives per-day free gaps from fixed events and placed blocks.
pub struct AvailabilityResolver<'a> {
    events: &'a [FixedEvent],
    /// Parallel to `events`: lecture cancelled by a same-course exam that day
    suppressed: Vec<bool>,
    study_start: NaiveTime,
    study_end: NaiveTime,
    break_minutes: i64,
    min_session_minutes: i64,
}

impl<'a> AvailabilityResolver<'a> {
    pub fn new(config: &SchedulerConfig, events: &'a [FixedEvent]) -> Result<Self, ConfigError> {
        let (study_start, study_end) = config.study_window()?;
        let suppressed = events
            .iter()
            .map(|event| is_suppressed_lecture(event, events))
            .collect();
        Ok(Self {
            events,
            suppressed,
            study_start,
            study_end,
            break_minutes: config.break_minutes.max(0),
            min_session_minutes: config.min_session_minutes,
        })
    }

    /// Study-hours window for `date`.
    pub fn day_window(&self, date: NaiveDate) -> Interval {
        Interval {
            start: date.and_time(self.study_start).and_utc(),
            end: date.and_time(self.study_end).and_utc(),
        }
    }

    /// Whether an all-day commitment consumes `date`.
    pub fn is_blocked_day(&self, date: NaiveDate) -> bool {
        self.events
            .iter()
            .any(|e| e.all_day && e.touches_date(date))
    }

    /// Whether `event` was cancelled by a same-course exam.
    pub fn is_suppressed(&self, event_id: &str) -> bool {
        self.events
            .iter()
            .zip(&self.suppressed)
            .any(|(e, s)| *s && e.id == event_id)
    }

    /// Fixed events that still occupy time (suppressed lectures excluded).
    pub fn active_events(&self) -> impl Iterator<Item = &'a FixedEvent> + '_ {
        self.events
            .iter()
            .zip(&self.suppressed)
            .filter(|(_, s)| !**s)
            .map(|(e, _)| e)
    }

    /// Merged busy intervals inside `date`'s study window, as seen by work on
    /// `course`.
    ///
    /// A suppressed lecture frees its slot only for its own course; other
    /// work still treats it as busy.
    pub fn busy_intervals(
        &self,
        date: NaiveDate,
        course: Option<&str>,
        placed: &[StudyBlock],
    ) -> Vec<Interval> {
        let window = self.day_window(date);
        let pad = Duration::minutes(self.break_minutes);

        let events = self
            .events
            .iter()
            .zip(&self.suppressed)
            .filter(|(event, suppressed)| {
                !**suppressed || course.is_none() || event.course.as_deref() != course
            })
            .filter_map(|(event, _)| Interval::new(event.start_at, event.end_at));

        let blocks = placed
            .iter()
            .filter_map(|b| Interval::new(b.start_at - pad, b.end_at + pad));

        let clipped = events
            .chain(blocks)
            .filter_map(|i| i.clip(&window))
            .collect();
        merge_intervals(clipped)
    }

    /// Free gaps on `date` at least one minimum session long.
    pub fn free_gaps(
        &self,
        date: NaiveDate,
        course: Option<&str>,
        placed: &[StudyBlock],
    ) -> Vec<TimeGap> {
        let window = self.day_window(date);
        self.gaps_in(date, &window, course, placed)
    }

    /// Like [`free_gaps`](Self::free_gaps), restricted to `bounds`.
    pub fn free_gaps_within(
        &self,
        date: NaiveDate,
        bounds: &Interval,
        course: Option<&str>,
        placed: &[StudyBlock],
    ) -> Vec<TimeGap> {
        match self.day_window(date).clip(bounds) {
            Some(window) => self.gaps_in(date, &window, course, placed),
            None => Vec::new(),
        }
    }

    fn gaps_in(
        &self,
        date: NaiveDate,
        window: &Interval,
        course: Option<&str>,
        placed: &[StudyBlock],
    ) -> Vec<TimeGap> {
        if self.is_blocked_day(date) {
            return Vec::new();
        }
        let busy = self.busy_intervals(date, course, placed);
        subtract(window, &busy)
            .into_iter()
            .filter(|i| i.duration_minutes() >= self.min_session_minutes)
            .map(TimeGap::from)
            .collect()
    }
}

fn is_suppressed_lecture(event: &FixedEvent, events: &[FixedEvent]) -> bool {
    if event.kind != FixedEventKind::Lecture {
        return false;
    }
    let Some(course) = event.course.as_deref() else {
        return false;
    };
    let day = event.start_at.date_naive();
    events.iter().any(|other| {
        other.kind == FixedEventKind::Exam
            && other.course.as_deref() == Some(course)
            && other.start_at.date_naive() == day
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn date() -> NaiveDate {
        at(0, 0).date_naive()
    }

    fn iv(a: (u32, u32), b: (u32, u32)) -> Interval {
        Interval::new(at(a.0, a.1), at(b.0, b.1)).unwrap()
    }

    fn event(id: &str, kind: FixedEventKind, course: &str, a: (u32, u32), b: (u32, u32)) -> FixedEvent {
        FixedEvent::new(id, id, kind, at(a.0, a.1), at(b.0, b.1))
            .unwrap()
            .with_course(course)
    }

    #[test]
    fn merge_joins_overlapping_and_touching() {
        let merged = merge_intervals(vec![
            iv((13, 0), (14, 0)),
            iv((9, 0), (10, 0)),
            iv((9, 30), (11, 0)),
            iv((11, 0), (11, 30)),
        ]);
        assert_eq!(merged, vec![iv((9, 0), (11, 30)), iv((13, 0), (14, 0))]);
    }

    #[test]
    fn subtract_yields_ordered_gaps() {
        let window = iv((8, 0), (22, 0));
        let busy = vec![iv((7, 0), (9, 0)), iv((12, 0), (13, 0)), iv((21, 0), (23, 0))];
        let free = subtract(&window, &busy);
        assert_eq!(free, vec![iv((9, 0), (12, 0)), iv((13, 0), (21, 0))]);
    }

    #[test]
    fn subtract_with_nothing_busy_returns_window() {
        let window = iv((8, 0), (22, 0));
        assert_eq!(subtract(&window, &[]), vec![window]);
    }

    #[test]
    fn resolver_discards_short_gaps_and_pads_blocks() {
        let config = SchedulerConfig::default();
        let events = vec![
            event("a", FixedEventKind::Meeting, "x", (8, 0), (10, 0)),
            event("b", FixedEventKind::Meeting, "x", (10, 20), (12, 0)),
        ];
        let resolver = AvailabilityResolver::new(&config, &events).unwrap();
        let placed = vec![StudyBlock::pinned("m", "t", at(14, 0), at(15, 0))];

        let gaps = resolver.free_gaps(date(), None, &placed);
        // 10:00-10:20 is below the 30 minute minimum; the block is padded by 15
        assert_eq!(
            gaps,
            vec![
                TimeGap::from(iv((12, 0), (13, 45))),
                TimeGap::from(iv((15, 15), (22, 0))),
            ]
        );
    }

    #[test]
    fn all_day_commitment_blocks_the_day() {
        let config = SchedulerConfig::default();
        let events = vec![FixedEvent::new(
            "rot",
            "Clinical rotation",
            FixedEventKind::Clinical,
            at(0, 0),
            at(0, 0) + Duration::days(1),
        )
        .unwrap()
        .all_day()];
        let resolver = AvailabilityResolver::new(&config, &events).unwrap();
        assert!(resolver.free_gaps(date(), None, &[]).is_empty());
        assert!(!resolver.free_gaps(date().succ_opt().unwrap(), None, &[]).is_empty());
    }

    #[test]
    fn exam_suppresses_same_course_lecture_for_that_course_only() {
        let config = SchedulerConfig::default();
        let events = vec![
            event("lec", FixedEventKind::Lecture, "BIO101", (10, 0), (12, 0)),
            event("exam", FixedEventKind::Exam, "BIO101", (14, 0), (16, 0)),
            event("lec2", FixedEventKind::Lecture, "CHEM", (18, 0), (19, 0)),
        ];
        let resolver = AvailabilityResolver::new(&config, &events).unwrap();
        assert!(resolver.is_suppressed("lec"));
        assert!(!resolver.is_suppressed("lec2"));
        assert_eq!(resolver.active_events().count(), 2);

        let same_course = resolver.busy_intervals(date(), Some("BIO101"), &[]);
        assert_eq!(same_course, vec![iv((14, 0), (16, 0)), iv((18, 0), (19, 0))]);

        let unrelated = resolver.busy_intervals(date(), Some("HIST"), &[]);
        assert!(unrelated.contains(&iv((10, 0), (12, 0))));
    }

    #[test]
    fn free_gaps_within_respects_bounds() {
        let config = SchedulerConfig::default();
        let resolver = AvailabilityResolver::new(&config, &[]).unwrap();
        let bounds = iv((15, 0), (23, 0));
        let gaps = resolver.free_gaps_within(date(), &bounds, None, &[]);
        assert_eq!(gaps, vec![TimeGap::from(iv((15, 0), (22, 0)))]);
    }
}
