//! Block allocation.
//!
//! Turns a task's required hours into concrete study blocks inside its
//! scheduling window, respecting daily caps and the spread strategy.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use tracing::debug;

use super::slot::{select_slot, SlotScorer};
use crate::schedule::{BlockOrigin, StudyBlock};
use crate::storage::{SchedulerConfig, SpreadStrategy};
use crate::task::Task;
use crate::timeline::{AvailabilityResolver, Interval};

/// Required minutes are rounded up to this step.
const ROUNDING_MINUTES: i64 = 5;

/// Hours a task needs before manual credit.
///
/// base × complexity factor × type multiplier × (1 + buffer%), plus the exam
/// review surcharge.
pub fn required_hours(task: &Task, config: &SchedulerConfig) -> f64 {
    let base = task
        .estimated_hours
        .unwrap_or_else(|| config.default_hours_for(task.task_type));
    let complexity = 1.0 + 0.1 * (f64::from(task.complexity.clamp(1, 5)) - 3.0);
    let buffer = 1.0 + task.buffer_percent.max(0.0) / 100.0;
    let mut hours = base * complexity * config.effort_multiplier_for(task.task_type) * buffer;
    if task.task_type.is_exam() {
        hours += config.exam_review_hours;
    }
    hours
}

/// [`required_hours`] in whole minutes, rounded up to the nearest five.
pub fn required_minutes(task: &Task, config: &SchedulerConfig) -> i64 {
    let minutes = (required_hours(task, config) * 60.0).max(0.0);
    // `as` saturates, so clamp before scaling back up
    let steps = (minutes / ROUNDING_MINUTES as f64).ceil() as i64;
    steps.min(i64::MAX / ROUNDING_MINUTES) * ROUNDING_MINUTES
}

/// Earliest start and latest end for a task's work blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingWindow {
    pub start: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl SchedulingWindow {
    pub fn as_interval(&self) -> Option<Interval> {
        Interval::new(self.start, self.deadline)
    }

    /// Calendar dates the window touches, earliest first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut day = self.start.date_naive();
        let last = self.deadline.date_naive();
        while day <= last {
            dates.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        dates
    }
}

/// Window for `task` as of `now`.
///
/// Work starts `lead_days` before the due date (never before `now`) and
/// should finish by the soft deadline, `due - buffer days`. When the soft
/// deadline would leave nothing, the due date itself is used. An overdue
/// soft-deadline task gets a one-day catch-up window. `None` means there is
/// no time left at all.
pub fn scheduling_window(
    task: &Task,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Option<SchedulingWindow> {
    if task.due_at <= now {
        if task.is_hard_deadline() {
            return None;
        }
        return Some(SchedulingWindow {
            start: now,
            deadline: now.checked_add_signed(Duration::days(1))?,
        });
    }

    let lead = task
        .lead_days
        .unwrap_or_else(|| config.lead_days_for(task.task_type));
    let start = task
        .due_at
        .checked_sub_signed(Duration::days(i64::from(lead)))
        .map_or(now, |ideal| ideal.max(now));

    let buffer_days = if task.task_type.is_exam() {
        config.exam_buffer_days
    } else {
        config.routine_buffer_days
    };
    let deadline = match task
        .due_at
        .checked_sub_signed(Duration::days(i64::from(buffer_days)))
    {
        Some(soft) if soft > start => soft,
        _ => task.due_at,
    };

    (deadline > start).then_some(SchedulingWindow { start, deadline })
}

/// Blocks placed so far in a pass, manual ones included.
#[derive(Debug, Clone, Default)]
pub struct Placements {
    blocks: Vec<StudyBlock>,
}

impl Placements {
    pub fn new(pinned: Vec<StudyBlock>) -> Self {
        Self { blocks: pinned }
    }

    pub fn blocks(&self) -> &[StudyBlock] {
        &self.blocks
    }

    pub fn push(&mut self, block: StudyBlock) {
        self.blocks.push(block);
    }

    pub fn into_blocks(self) -> Vec<StudyBlock> {
        self.blocks
    }

    /// Minutes already booked on `date`, all tasks.
    pub fn minutes_on(&self, date: NaiveDate) -> i64 {
        self.blocks
            .iter()
            .filter(|b| b.start_at.date_naive() == date)
            .map(StudyBlock::duration_minutes)
            .sum()
    }

    /// Sessions of `task_id` starting on `date`.
    pub fn sessions_on(&self, task_id: &str, date: NaiveDate) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.task_id == task_id && b.start_at.date_naive() == date)
            .count()
    }

    /// Manual work minutes already credited to `task_id`.
    pub fn manual_minutes(&self, task_id: &str) -> i64 {
        self.blocks
            .iter()
            .filter(|b| b.manual && !b.is_review() && b.task_id == task_id)
            .map(StudyBlock::duration_minutes)
            .sum()
    }
}

/// Places sessions for one task at a time against shared placements.
pub struct BlockAllocator<'a> {
    config: &'a SchedulerConfig,
    resolver: &'a AvailabilityResolver<'a>,
    scorer: &'a SlotScorer<'a>,
}

impl<'a> BlockAllocator<'a> {
    pub fn new(
        config: &'a SchedulerConfig,
        resolver: &'a AvailabilityResolver<'a>,
        scorer: &'a SlotScorer<'a>,
    ) -> Self {
        Self {
            config,
            resolver,
            scorer,
        }
    }

    /// Place up to `minutes` of work for `task` inside `window`.
    ///
    /// Returns the minutes actually placed. New blocks are appended to
    /// `placements`.
    pub fn allocate<R: Rng + ?Sized>(
        &self,
        task: &Task,
        window: &SchedulingWindow,
        minutes: i64,
        placements: &mut Placements,
        rng: &mut R,
    ) -> i64 {
        let Some(bounds) = window.as_interval() else {
            return 0;
        };
        if minutes <= 0 {
            return 0;
        }
        let days = window.dates();
        let mut remaining = minutes;

        match self.config.spread {
            SpreadStrategy::Distributed => {
                remaining = self.spread_pass(task, &days, &bounds, remaining, placements, rng);
                for date in &days {
                    remaining = self.fill_day(task, *date, &bounds, remaining, placements, rng);
                    if remaining == 0 {
                        break;
                    }
                }
            }
            SpreadStrategy::Compressed => {
                for date in days.iter().rev() {
                    remaining = self.fill_day(task, *date, &bounds, remaining, placements, rng);
                    if remaining == 0 {
                        break;
                    }
                }
            }
        }

        minutes - remaining
    }

    /// One session per day, spaced so the sessions still needed are spread
    /// over the days left.
    fn spread_pass<R: Rng + ?Sized>(
        &self,
        task: &Task,
        days: &[NaiveDate],
        bounds: &Interval,
        mut remaining: i64,
        placements: &mut Placements,
        rng: &mut R,
    ) -> i64 {
        let session = self.session_minutes();
        let mut i = 0;
        while i < days.len() && remaining > 0 {
            let Some(placed) = self.place_session(task, days[i], bounds, remaining, placements, rng)
            else {
                i += 1;
                continue;
            };
            remaining -= placed;

            let days_left = days.len() - i - 1;
            let sessions_left = (remaining + session - 1) / session;
            let stride = if sessions_left > 0 {
                (days_left / sessions_left as usize).max(1)
            } else {
                1
            };
            i += stride;
        }
        remaining
    }

    /// Sessions on `date` until the day or the per-task session limit is
    /// exhausted.
    fn fill_day<R: Rng + ?Sized>(
        &self,
        task: &Task,
        date: NaiveDate,
        bounds: &Interval,
        mut remaining: i64,
        placements: &mut Placements,
        rng: &mut R,
    ) -> i64 {
        let limit = self.config.max_sessions_per_day.max(1) as usize;
        while remaining > 0 && placements.sessions_on(&task.id, date) < limit {
            match self.place_session(task, date, bounds, remaining, placements, rng) {
                Some(placed) => remaining -= placed,
                None => break,
            }
        }
        remaining
    }

    /// Place one session on `date`, returning its length in minutes.
    fn place_session<R: Rng + ?Sized>(
        &self,
        task: &Task,
        date: NaiveDate,
        bounds: &Interval,
        remaining: i64,
        placements: &mut Placements,
        rng: &mut R,
    ) -> Option<i64> {
        let cap_left = self.config.day_cap_minutes(date) - placements.minutes_on(date);
        if cap_left < remaining.min(self.config.min_session_minutes) {
            return None;
        }
        // A remainder that fits in one session is not split
        let session = if remaining <= self.config.max_session_minutes {
            remaining
        } else {
            self.session_minutes()
        };
        let desired = session.min(cap_left);

        let block = place_block(
            self.resolver,
            self.scorer,
            self.config.scoring.top_n,
            task,
            date,
            bounds,
            desired,
            BlockOrigin::Work,
            placements,
            rng,
        )?;
        let minutes = block.duration_minutes();
        debug!(task = %task.id, start = %block.start_at, minutes, "placed work block");
        placements.push(block);
        Some(minutes)
    }

    fn session_minutes(&self) -> i64 {
        self.config
            .preferred_session_minutes
            .min(self.config.max_session_minutes)
            .max(self.config.min_session_minutes)
            .max(1)
    }
}

/// Score the free gaps of `date` and pick a block of up to `desired` minutes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn place_block<R: Rng + ?Sized>(
    resolver: &AvailabilityResolver<'_>,
    scorer: &SlotScorer<'_>,
    top_n: usize,
    task: &Task,
    date: NaiveDate,
    bounds: &Interval,
    desired: i64,
    origin: BlockOrigin,
    placements: &Placements,
    rng: &mut R,
) -> Option<StudyBlock> {
    let gaps = resolver.free_gaps_within(date, bounds, task.course.as_deref(), placements.blocks());
    if gaps.is_empty() {
        return None;
    }
    let ranked = scorer.candidates(&gaps, task, desired, placements.blocks());
    let slot = select_slot(&ranked, top_n, rng)?;
    Some(StudyBlock::generated(&task.id, slot.start_at, slot.end_at, origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::EnergyProfile;
    use crate::task::TaskType;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    fn now() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            seed: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn required_hours_applies_factors() {
        let cfg = config();
        let task = Task::new("a", "Paper", TaskType::Paper, now() + Duration::days(10))
            .with_hours(10.0)
            .with_complexity(5)
            .with_buffer_percent(10.0);
        let expected = 10.0 * 1.2 * cfg.effort_multiplier_for(TaskType::Paper) * 1.1;
        assert!((required_hours(&task, &cfg) - expected).abs() < 1e-9);
    }

    #[test]
    fn exam_adds_review_surcharge() {
        let cfg = config();
        let exam = Task::new("e", "Final", TaskType::Exam, now() + Duration::days(10)).with_hours(4.0);
        let expected = 4.0 * cfg.effort_multiplier_for(TaskType::Exam) + cfg.exam_review_hours;
        assert!((required_hours(&exam, &cfg) - expected).abs() < 1e-9);
        assert_eq!(required_minutes(&exam, &cfg) % 5, 0);
    }

    #[test]
    fn missing_estimate_uses_type_default() {
        let cfg = config();
        let quiz = Task::new("q", "Quiz", TaskType::Quiz, now() + Duration::days(3));
        let expected = cfg.default_hours_for(TaskType::Quiz) * cfg.effort_multiplier_for(TaskType::Quiz);
        assert!((required_hours(&quiz, &cfg) - expected).abs() < 1e-9);
    }

    #[test]
    fn window_honours_lead_and_buffer() {
        let cfg = config();
        let due = now() + Duration::days(20);
        let exam = Task::new("e", "Final", TaskType::Exam, due).with_lead_days(10);
        let window = scheduling_window(&exam, &cfg, now()).unwrap();
        assert_eq!(window.start, due - Duration::days(10));
        assert_eq!(
            window.deadline,
            due - Duration::days(i64::from(cfg.exam_buffer_days))
        );
    }

    #[test]
    fn window_falls_back_to_due_when_buffer_consumes_it() {
        let cfg = config();
        let due = now() + Duration::hours(30);
        let exam = Task::new("e", "Final", TaskType::Exam, due);
        let window = scheduling_window(&exam, &cfg, now()).unwrap();
        assert_eq!(window.start, now());
        assert_eq!(window.deadline, due);
    }

    #[test]
    fn overdue_hard_task_has_no_window() {
        let cfg = config();
        let late = Task::new("q", "Quiz", TaskType::Quiz, now() - Duration::hours(2));
        assert!(scheduling_window(&late, &cfg, now()).is_none());

        let soft = Task::new("r", "Reading", TaskType::Reading, now() - Duration::hours(2));
        let window = scheduling_window(&soft, &cfg, now()).unwrap();
        assert_eq!(window.deadline, now() + Duration::days(1));
    }

    #[test]
    fn huge_estimate_saturates_instead_of_overflowing() {
        let cfg = config();
        let task = Task::new("r", "Reading", TaskType::Reading, now() + Duration::days(3))
            .with_hours(1e18);
        let minutes = required_minutes(&task, &cfg);
        assert!(minutes > 0);
        assert_eq!(minutes % ROUNDING_MINUTES, 0);
    }

    #[test]
    fn lead_time_past_the_calendar_starts_now() {
        let cfg = config();
        let due = now() + Duration::days(3);
        let task = Task::new("r", "Reading", TaskType::Reading, due).with_lead_days(u32::MAX);
        let window = scheduling_window(&task, &cfg, now()).unwrap();
        assert_eq!(window.start, now());
        assert_eq!(window.deadline, due);
    }

    #[test]
    fn window_dates_cover_both_ends() {
        let window = SchedulingWindow {
            start: now(),
            deadline: now() + Duration::days(2),
        };
        assert_eq!(window.dates().len(), 3);
    }

    #[test]
    fn distributed_allocation_spreads_across_days() {
        let cfg = config();
        let energy = EnergyProfile::default();
        let resolver = AvailabilityResolver::new(&cfg, &[]).unwrap();
        let scorer = SlotScorer::new(&cfg, &energy);
        let allocator = BlockAllocator::new(&cfg, &resolver, &scorer);
        let mut rng = Mcg128Xsl64::seed_from_u64(3);

        let task = Task::new("a", "Paper", TaskType::Paper, now() + Duration::days(10));
        let window = scheduling_window(&task, &cfg, now()).unwrap();
        let mut placements = Placements::default();
        let placed = allocator.allocate(&task, &window, 270, &mut placements, &mut rng);

        assert_eq!(placed, 270);
        let mut days: Vec<_> = placements
            .blocks()
            .iter()
            .map(|b| b.start_at.date_naive())
            .collect();
        days.dedup();
        assert_eq!(days.len(), 3, "one session per day: {days:?}");
        assert!(placements.blocks().iter().all(|b| b.end_at <= window.deadline));
    }

    #[test]
    fn compressed_allocation_packs_near_deadline() {
        let cfg = SchedulerConfig {
            spread: SpreadStrategy::Compressed,
            ..config()
        };
        let energy = EnergyProfile::default();
        let resolver = AvailabilityResolver::new(&cfg, &[]).unwrap();
        let scorer = SlotScorer::new(&cfg, &energy);
        let allocator = BlockAllocator::new(&cfg, &resolver, &scorer);
        let mut rng = Mcg128Xsl64::seed_from_u64(3);

        let due = Utc.with_ymd_and_hms(2026, 3, 12, 23, 0, 0).unwrap();
        let task = Task::new("a", "Paper", TaskType::Paper, due);
        let window = scheduling_window(&task, &cfg, now()).unwrap();
        let mut placements = Placements::default();
        allocator.allocate(&task, &window, 180, &mut placements, &mut rng);

        assert!(placements
            .blocks()
            .iter()
            .all(|b| b.start_at.date_naive() == due.date_naive()));
    }

    #[test]
    fn daily_cap_limits_a_day() {
        let cfg = SchedulerConfig {
            daily_max_hours: 1.0,
            ..config()
        };
        let energy = EnergyProfile::default();
        let resolver = AvailabilityResolver::new(&cfg, &[]).unwrap();
        let scorer = SlotScorer::new(&cfg, &energy);
        let allocator = BlockAllocator::new(&cfg, &resolver, &scorer);
        let mut rng = Mcg128Xsl64::seed_from_u64(3);

        // Due Monday evening: only one weekday in the window
        let due = Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap();
        let task = Task::new("a", "Problem set", TaskType::Assignment, due);
        let window = scheduling_window(&task, &cfg, now()).unwrap();
        let mut placements = Placements::default();
        let placed = allocator.allocate(&task, &window, 240, &mut placements, &mut rng);

        assert_eq!(placed, 60);
        assert_eq!(placements.minutes_on(due.date_naive()), 60);
    }
}
