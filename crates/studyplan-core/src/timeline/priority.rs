//! Task priority calculation module.
//!
//! Ranks incomplete tasks by a weighted combination of:
//! - Urgency: time until the due date, near-maximal inside one day and
//!   decaying exponentially beyond it
//! - Importance: per-type weight, complexity and the hard-deadline flag
//!
//! The ranking is a pure function of the task snapshot and the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::task::Task;

/// Priority calculation weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityWeights {
    /// Weight for urgency (default 0.7)
    #[serde(default = "default_urgency")]
    pub urgency: f64,
    /// Weight for importance (default 0.3)
    #[serde(default = "default_importance")]
    pub importance: f64,
    /// Days over which urgency decays by a factor of e past the first day
    #[serde(default = "default_decay_days")]
    pub decay_days: f64,
}

fn default_urgency() -> f64 {
    0.7
}
fn default_importance() -> f64 {
    0.3
}
fn default_decay_days() -> f64 {
    7.0
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            urgency: default_urgency(),
            importance: default_importance(),
            decay_days: default_decay_days(),
        }
    }
}

impl PriorityWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.urgency >= 0.0 && self.importance >= 0.0) {
            return Err(ConfigError::invalid("priority", "weights must be non-negative"));
        }
        if !(self.decay_days > 0.0) {
            return Err(ConfigError::invalid("priority.decay_days", "must be positive"));
        }
        Ok(())
    }
}

/// A task with its computed scores.
#[derive(Debug, Clone, Copy)]
pub struct RankedTask<'a> {
    pub task: &'a Task,
    pub urgency: f64,
    pub importance: f64,
    pub score: f64,
}

/// Priority calculator for tasks
pub struct PriorityCalculator {
    weights: PriorityWeights,
    now: DateTime<Utc>,
}

impl PriorityCalculator {
    pub fn new(weights: PriorityWeights, now: DateTime<Utc>) -> Self {
        Self { weights, now }
    }

    /// Urgency in [0, 1].
    ///
    /// - Overdue: 1.0
    /// - Due within 24h: 0.95
    /// - Later: 0.95 · exp(-(days - 1) / decay_days)
    pub fn urgency(&self, task: &Task) -> f64 {
        let hours = (task.due_at - self.now).num_minutes() as f64 / 60.0;
        if hours < 0.0 {
            1.0
        } else if hours <= 24.0 {
            0.95
        } else {
            let days = hours / 24.0;
            0.95 * (-(days - 1.0) / self.weights.decay_days).exp()
        }
    }

    /// Importance in [0, 1].
    pub fn importance(&self, task: &Task) -> f64 {
        let type_weight = task.task_type.importance_weight();
        let complexity = f64::from(task.complexity.clamp(1, 5) - 1) / 4.0;
        let hard = if task.is_hard_deadline() { 1.0 } else { 0.0 };
        0.6 * type_weight + 0.25 * complexity + 0.15 * hard
    }

    pub fn score(&self, task: &Task) -> f64 {
        self.weights.urgency * self.urgency(task) + self.weights.importance * self.importance(task)
    }

    /// Rank tasks, most urgent/important first.
    ///
    /// Ties break on earlier due date, then input order.
    pub fn rank<'a>(&self, tasks: &'a [Task]) -> Vec<RankedTask<'a>> {
        let mut ranked: Vec<RankedTask<'a>> = tasks
            .iter()
            .map(|task| {
                let urgency = self.urgency(task);
                let importance = self.importance(task);
                RankedTask {
                    task,
                    urgency,
                    importance,
                    score: self.weights.urgency * urgency + self.weights.importance * importance,
                }
            })
            .collect();

        // sort_by is stable, so equal keys keep input order
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.task.due_at.cmp(&b.task.due_at))
        });
        ranked
    }
}

/// Convenience function to rank with the given weights.
pub fn prioritize<'a>(
    tasks: &'a [Task],
    weights: &PriorityWeights,
    now: DateTime<Utc>,
) -> Vec<RankedTask<'a>> {
    PriorityCalculator::new(weights.clone(), now).rank(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn task(id: &str, task_type: TaskType, due_in_hours: i64) -> Task {
        Task::new(id, id, task_type, now() + Duration::hours(due_in_hours))
    }

    #[test]
    fn urgency_is_near_max_inside_a_day() {
        let calc = PriorityCalculator::new(PriorityWeights::default(), now());
        assert_eq!(calc.urgency(&task("o", TaskType::Reading, -2)), 1.0);
        assert_eq!(calc.urgency(&task("s", TaskType::Reading, 12)), 0.95);
    }

    #[test]
    fn urgency_decays_past_two_weeks() {
        let calc = PriorityCalculator::new(PriorityWeights::default(), now());
        let week = calc.urgency(&task("w", TaskType::Reading, 24 * 7));
        let month = calc.urgency(&task("m", TaskType::Reading, 24 * 30));
        assert!(week > month);
        assert!(calc.urgency(&task("f", TaskType::Reading, 24 * 15)) < 0.15);
    }

    #[test]
    fn importance_orders_types_and_complexity() {
        let calc = PriorityCalculator::new(PriorityWeights::default(), now());
        let exam = task("e", TaskType::Exam, 48);
        let reading = task("r", TaskType::Reading, 48);
        assert!(calc.importance(&exam) > calc.importance(&reading));

        let easy = task("a", TaskType::Assignment, 48).with_complexity(1);
        let hard = task("b", TaskType::Assignment, 48).with_complexity(5);
        assert!(calc.importance(&hard) > calc.importance(&easy));
        assert!(calc.importance(&exam) <= 1.0);
    }

    #[test]
    fn urgent_reading_beats_distant_exam() {
        let tasks = vec![task("exam", TaskType::Exam, 24 * 20), task("read", TaskType::Reading, 10)];
        let ranked = prioritize(&tasks, &PriorityWeights::default(), now());
        assert_eq!(ranked[0].task.id, "read");
    }

    #[test]
    fn ties_break_on_due_then_input_order() {
        let tasks = vec![
            task("b", TaskType::Reading, -5),
            task("a", TaskType::Reading, -10),
            task("c", TaskType::Reading, -10),
        ];
        let ranked = prioritize(&tasks, &PriorityWeights::default(), now());
        let order: Vec<_> = ranked.iter().map(|r| r.task.id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn weights_are_configurable() {
        let importance_only = PriorityWeights {
            urgency: 0.0,
            importance: 1.0,
            ..Default::default()
        };
        let tasks = vec![task("read", TaskType::Reading, 2), task("exam", TaskType::Exam, 24 * 20)];
        let ranked = prioritize(&tasks, &importance_only, now());
        assert_eq!(ranked[0].task.id, "exam");
    }
}
