//! Study block scheduler.
//!
//! One pass turns tasks, fixed events and pinned blocks into a full block
//! set:
//! - Validates tasks, skipping malformed ones with a reason
//! - Ranks the rest by urgency and importance
//! - Allocates work blocks per task in rank order
//! - Adds review blocks ahead of exams
//!
//! Later tasks see every block placed for earlier ones, so the result never
//! double-books. Given a seed the pass is fully deterministic.

mod allocator;
mod review;
mod slot;

pub use allocator::{
    required_hours, required_minutes, scheduling_window, BlockAllocator, Placements,
    SchedulingWindow,
};
pub use review::ReviewGenerator;
pub use slot::{select_slot, ScoringWeights, SlotCandidate, SlotScorer};

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::energy::EnergyProfile;
use crate::error::Result;
use crate::schedule::{FixedEvent, StudyBlock};
use crate::storage::{SchedulerConfig, MAX_HORIZON_DAYS};
use crate::task::Task;
use crate::timeline::{prioritize, AvailabilityResolver};

/// How much of a task's required time made it into the schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    FullyScheduled,
    PartiallyScheduled,
    Unscheduled,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ScheduleStatus::FullyScheduled => "scheduled",
            ScheduleStatus::PartiallyScheduled => "partial",
            ScheduleStatus::Unscheduled => "unscheduled",
        })
    }
}

/// Per-task result of a pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub task_id: String,
    pub status: ScheduleStatus,
    pub required_hours: f64,
    /// Manual and generated work hours, reviews excluded
    pub scheduled_hours: f64,
    pub shortfall_hours: f64,
    #[serde(default)]
    pub missing_reviews: u32,
}

/// Why a task was left out of a pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Estimate is zero, negative or not a number
    NonPositiveEstimate,
    /// Required hours beyond anything a planning horizon can hold
    ExcessiveEstimate,
    /// Lead-time override longer than the planning horizon
    InvalidLeadDays,
    /// Complexity outside 1..=5
    InvalidComplexity,
    /// Buffer percentage negative or not a number
    InvalidBuffer,
    /// Another task earlier in the input has the same id
    DuplicateId,
    /// Hard deadline already passed
    PastHardDeadline,
    /// Overdue for longer than the grace window
    OverdueBeyondGrace,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NonPositiveEstimate => "estimated hours must be positive",
            SkipReason::ExcessiveEstimate => "required hours exceed the planning horizon",
            SkipReason::InvalidLeadDays => "lead days exceed the planning horizon",
            SkipReason::InvalidComplexity => "complexity must be between 1 and 5",
            SkipReason::InvalidBuffer => "buffer percent must be non-negative",
            SkipReason::DuplicateId => "duplicate task id",
            SkipReason::PastHardDeadline => "hard deadline has passed",
            SkipReason::OverdueBeyondGrace => "overdue beyond the grace window",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedTask {
    pub task_id: String,
    pub reason: SkipReason,
}

/// Result of one scheduling pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleOutcome {
    /// Manual and generated blocks, sorted by start
    pub blocks: Vec<StudyBlock>,
    /// Tasks with any shortfall
    pub unscheduled: Vec<String>,
    pub reports: Vec<TaskReport>,
    pub skipped: Vec<SkippedTask>,
}

impl ScheduleOutcome {
    pub fn report(&self, task_id: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.task_id == task_id)
    }

    pub fn blocks_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a StudyBlock> + 'a {
        self.blocks.iter().filter(move |b| b.task_id == task_id)
    }

    /// Work hours (reviews excluded) booked for `task_id`.
    pub fn work_hours(&self, task_id: &str) -> f64 {
        self.blocks_for(task_id)
            .filter(|b| !b.is_review())
            .map(StudyBlock::hours)
            .sum()
    }
}

/// More study than fits in every hour of the longest planning horizon.
const MAX_REQUIRED_HOURS: f64 = MAX_HORIZON_DAYS as f64 * 24.0;

/// Check a task before it enters the pass.
pub fn validate_task(
    task: &Task,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> std::result::Result<(), SkipReason> {
    if let Some(hours) = task.estimated_hours {
        if !(hours.is_finite() && hours > 0.0) {
            return Err(SkipReason::NonPositiveEstimate);
        }
    }
    if !(1..=5).contains(&task.complexity) {
        return Err(SkipReason::InvalidComplexity);
    }
    if !(task.buffer_percent.is_finite() && task.buffer_percent >= 0.0) {
        return Err(SkipReason::InvalidBuffer);
    }
    let required = required_hours(task, config);
    if required.is_nan() || required <= 0.0 {
        return Err(SkipReason::NonPositiveEstimate);
    }
    if required > MAX_REQUIRED_HOURS {
        return Err(SkipReason::ExcessiveEstimate);
    }
    if task.lead_days.is_some_and(|days| days > MAX_HORIZON_DAYS) {
        return Err(SkipReason::InvalidLeadDays);
    }
    if task.due_at <= now && task.is_hard_deadline() {
        return Err(SkipReason::PastHardDeadline);
    }
    if task.due_at < now - Duration::hours(config.overdue_grace_hours.max(0)) {
        return Err(SkipReason::OverdueBeyondGrace);
    }
    Ok(())
}

/// Compute a complete schedule.
///
/// Pure: the output depends only on the arguments (and `config.seed`).
/// Every block in `manual_blocks` is kept as-is and treated as busy time;
/// completed tasks are ignored.
///
/// # Errors
/// Returns an error only for an invalid configuration or energy profile.
pub fn compute_schedule(
    tasks: &[Task],
    events: &[FixedEvent],
    manual_blocks: &[StudyBlock],
    energy: &EnergyProfile,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Result<ScheduleOutcome> {
    config.validate()?;
    energy.validate()?;
    for event in events {
        if let Err(e) = event.validate() {
            warn!(event = %event.id, error = %e, "ignoring malformed fixed event");
        }
    }

    let resolver = AvailabilityResolver::new(config, events)?;
    let scorer = SlotScorer::new(config, energy);
    let allocator = BlockAllocator::new(config, &resolver, &scorer);
    let reviews = ReviewGenerator::new(config, &resolver, &scorer);
    let mut rng = match config.seed {
        Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
        None => Mcg128Xsl64::from_entropy(),
    };

    let mut outcome = ScheduleOutcome::default();
    let mut seen = BTreeSet::new();
    let mut schedulable = Vec::new();
    for task in tasks.iter().filter(|t| !t.is_completed()) {
        let verdict = if seen.insert(task.id.as_str()) {
            validate_task(task, config, now)
        } else {
            Err(SkipReason::DuplicateId)
        };
        match verdict {
            Ok(()) => schedulable.push(task.clone()),
            Err(reason) => {
                warn!(task = %task.id, %reason, "skipping task");
                outcome.skipped.push(SkippedTask {
                    task_id: task.id.clone(),
                    reason,
                });
            }
        }
    }

    let mut placements = Placements::new(manual_blocks.to_vec());
    for ranked in prioritize(&schedulable, &config.priority, now) {
        let task = ranked.task;
        let required = required_minutes(task, config);
        let credited = placements.manual_minutes(&task.id).min(required);

        let placed = match scheduling_window(task, config, now) {
            Some(window) => {
                allocator.allocate(task, &window, required - credited, &mut placements, &mut rng)
            }
            None => 0,
        };
        let missing_reviews = if task.task_type.is_exam() {
            reviews.place_reviews(task, now, &mut placements, &mut rng)
        } else {
            0
        };

        let scheduled = credited + placed;
        let shortfall = required - scheduled;
        let status = if shortfall <= 0 {
            ScheduleStatus::FullyScheduled
        } else if scheduled > 0 {
            ScheduleStatus::PartiallyScheduled
        } else {
            ScheduleStatus::Unscheduled
        };
        if shortfall > 0 {
            warn!(task = %task.id, shortfall_minutes = shortfall, "not enough time before deadline");
            outcome.unscheduled.push(task.id.clone());
        }
        debug!(task = %task.id, score = ranked.score, required, scheduled, "allocated task");

        outcome.reports.push(TaskReport {
            task_id: task.id.clone(),
            status,
            required_hours: minutes_to_hours(required),
            scheduled_hours: minutes_to_hours(scheduled),
            shortfall_hours: minutes_to_hours(shortfall.max(0)),
            missing_reviews,
        });
    }

    let mut blocks = placements.into_blocks();
    blocks.sort_by(|a, b| {
        a.start_at
            .cmp(&b.start_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
            .then_with(|| a.id.cmp(&b.id))
    });
    outcome.blocks = blocks;

    info!(
        blocks = outcome.blocks.len(),
        tasks = outcome.reports.len(),
        unscheduled = outcome.unscheduled.len(),
        skipped = outcome.skipped.len(),
        "schedule computed"
    );
    Ok(outcome)
}

fn minutes_to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}
