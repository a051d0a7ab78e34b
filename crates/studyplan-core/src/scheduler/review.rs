//! Review sessions ahead of exams.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use super::allocator::{place_block, Placements};
use super::slot::SlotScorer;
use crate::schedule::BlockOrigin;
use crate::storage::SchedulerConfig;
use crate::task::Task;
use crate::timeline::{AvailabilityResolver, Interval};

/// Places one review block on each of the days before an exam.
pub struct ReviewGenerator<'a> {
    config: &'a SchedulerConfig,
    resolver: &'a AvailabilityResolver<'a>,
    scorer: &'a SlotScorer<'a>,
}

impl<'a> ReviewGenerator<'a> {
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

    /// Place review blocks for `exam` on each of the `buffer_before_exam`
    /// days before its due date.
    ///
    /// Returns how many reviews could not be placed. Days already in the
    /// past count as missing.
    pub fn place_reviews<R: Rng + ?Sized>(
        &self,
        exam: &Task,
        now: DateTime<Utc>,
        placements: &mut Placements,
        rng: &mut R,
    ) -> u32 {
        let Some(bounds) = Interval::new(now, exam.due_at) else {
            return self.config.buffer_before_exam;
        };
        let length = self
            .config
            .review_session_minutes
            .min(self.config.max_session_minutes);
        let due_date = exam.due_at.date_naive();

        let mut missing = 0;
        for offset in 1..=self.config.buffer_before_exam {
            let date = due_date - Duration::days(i64::from(offset));
            if date < now.date_naive() {
                missing += 1;
                continue;
            }

            let cap_left = self.config.day_cap_minutes(date) - placements.minutes_on(date);
            if cap_left < length.min(self.config.min_session_minutes) {
                missing += 1;
                continue;
            }

            let block = place_block(
                self.resolver,
                self.scorer,
                self.config.scoring.top_n,
                exam,
                date,
                &bounds,
                length.min(cap_left),
                BlockOrigin::Review,
                placements,
                rng,
            );
            match block {
                Some(block) => {
                    debug!(task = %exam.id, start = %block.start_at, "placed review block");
                    placements.push(block);
                }
                None => missing += 1,
            }
        }

        if missing > 0 {
            warn!(task = %exam.id, missing, "could not place all exam reviews");
        }
        missing
    }
}
