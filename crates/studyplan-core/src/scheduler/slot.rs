//! Slot scoring.
//!
//! Candidate start times are generated at a fixed step inside each free gap
//! and scored on four factors:
//! - Energy match between the slot and the task's demand
//! - Affinity between the task type and the time of day
//! - Clustering penalty for blocks starting close by
//! - Diversity penalty for reusing the task's start hour on other days

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::energy::EnergyProfile;
use crate::error::ConfigError;
use crate::schedule::StudyBlock;
use crate::storage::SchedulerConfig;
use crate::task::{DayPeriod, Task};
use crate::timeline::TimeGap;

/// Slot scoring weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_energy")]
    pub energy: f64,
    #[serde(default = "default_affinity")]
    pub affinity: f64,
    #[serde(default = "default_clustering")]
    pub clustering: f64,
    #[serde(default = "default_diversity")]
    pub diversity: f64,
    /// Blocks starting this close to a candidate count as clustered
    #[serde(default = "default_cluster_window")]
    pub cluster_window_minutes: i64,
    /// Selection draws uniformly from this many best candidates
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_energy() -> f64 {
    0.4
}
fn default_affinity() -> f64 {
    0.3
}
fn default_clustering() -> f64 {
    0.2
}
fn default_diversity() -> f64 {
    0.1
}
fn default_cluster_window() -> i64 {
    60
}
fn default_top_n() -> usize {
    3
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            energy: default_energy(),
            affinity: default_affinity(),
            clustering: default_clustering(),
            diversity: default_diversity(),
            cluster_window_minutes: default_cluster_window(),
            top_n: default_top_n(),
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.energy, self.affinity, self.clustering, self.diversity];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid("scoring", "weights must be non-negative"));
        }
        if self.top_n == 0 {
            return Err(ConfigError::invalid("scoring.top_n", "must be at least 1"));
        }
        if self.cluster_window_minutes < 0 {
            return Err(ConfigError::invalid(
                "scoring.cluster_window_minutes",
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

/// A scored placement proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotCandidate {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub score: f64,
}

impl SlotCandidate {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }
}

/// Scores candidate slots for a task against the energy profile.
pub struct SlotScorer<'a> {
    config: &'a SchedulerConfig,
    energy: &'a EnergyProfile,
}

impl<'a> SlotScorer<'a> {
    pub fn new(config: &'a SchedulerConfig, energy: &'a EnergyProfile) -> Self {
        Self { config, energy }
    }

    /// Ranked candidates (best first) for a session of up to
    /// `desired_minutes`.
    ///
    /// A gap shorter than the desired length hosts a shorter session, but
    /// never one below the minimum session length unless the desired length
    /// is itself below it.
    pub fn candidates(
        &self,
        gaps: &[TimeGap],
        task: &Task,
        desired_minutes: i64,
        placed: &[StudyBlock],
    ) -> Vec<SlotCandidate> {
        if desired_minutes <= 0 {
            return Vec::new();
        }
        let floor = desired_minutes.min(self.config.min_session_minutes);
        let step = Duration::minutes(self.config.slot_granularity_minutes.max(1));

        let mut ranked = Vec::new();
        for gap in gaps {
            let length = desired_minutes.min(gap.duration_minutes());
            if length < floor {
                continue;
            }
            let length = Duration::minutes(length);
            let mut start = gap.start_at;
            while start + length <= gap.end_at {
                let end = start + length;
                ranked.push(SlotCandidate {
                    start_at: start,
                    end_at: end,
                    score: self.score(task, start, end, placed),
                });
                start += step;
            }
        }

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.start_at.cmp(&b.start_at))
        });
        ranked
    }

    /// Weighted desirability of `[start, end)` for `task`.
    pub fn score(
        &self,
        task: &Task,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        placed: &[StudyBlock],
    ) -> f64 {
        let w = &self.config.scoring;
        w.energy * self.energy_match(task, start, end) + w.affinity * self.affinity(task, start)
            - w.clustering * self.clustering_penalty(start, placed)
            - w.diversity * self.diversity_penalty(task, start, placed)
    }

    /// 1 - |slot energy - task demand|, in [0, 1].
    pub fn energy_match(&self, task: &Task, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let slot = self.energy.mean_energy(start, end);
        1.0 - (slot - task.task_type.energy_demand().target()).abs()
    }

    /// 1.0 for the type's favourite period down to 0.0 for its least.
    pub fn affinity(&self, task: &Task, start: DateTime<Utc>) -> f64 {
        let period = DayPeriod::of(start);
        let rank = task
            .task_type
            .period_preference()
            .iter()
            .position(|p| *p == period)
            .unwrap_or(3);
        1.0 - rank as f64 / 3.0
    }

    /// 0.5 per placed block starting within the cluster window, capped at 1.
    pub fn clustering_penalty(&self, start: DateTime<Utc>, placed: &[StudyBlock]) -> f64 {
        let window = self.config.scoring.cluster_window_minutes;
        let nearby = placed
            .iter()
            .filter(|b| (b.start_at - start).num_minutes().abs() < window)
            .count();
        (nearby as f64 * 0.5).min(1.0)
    }

    /// 0.25 per block of the same task on another day starting in the same
    /// hour, capped at 1.
    pub fn diversity_penalty(&self, task: &Task, start: DateTime<Utc>, placed: &[StudyBlock]) -> f64 {
        let date = start.date_naive();
        let repeats = placed
            .iter()
            .filter(|b| b.task_id == task.id)
            .filter(|b| b.start_at.date_naive() != date && b.start_at.hour() == start.hour())
            .count();
        (repeats as f64 * 0.25).min(1.0)
    }
}

/// Pick uniformly among the best `top_n` of `ranked`.
pub fn select_slot<R: Rng + ?Sized>(
    ranked: &[SlotCandidate],
    top_n: usize,
    rng: &mut R,
) -> Option<SlotCandidate> {
    if ranked.is_empty() {
        return None;
    }
    let n = top_n.clamp(1, ranked.len());
    Some(ranked[rng.gen_range(0..n)])
}
