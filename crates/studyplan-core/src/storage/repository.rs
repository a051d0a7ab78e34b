//! Boundary to the task/event store.
//!
//! The scheduler never owns persistence. It reads a [`ScheduleSnapshot`] and
//! hands back a full replacement block set, which the repository applies in
//! one step.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ValidationError};
use crate::schedule::{FixedEvent, StudyBlock};
use crate::scheduler::{ScheduleOutcome, TaskReport};
use crate::task::{Task, TaskPatch, TaskStatus};

/// Inputs for one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// Non-completed tasks
    pub tasks: Vec<Task>,
    pub events: Vec<FixedEvent>,
    /// Manually pinned blocks only
    pub manual_blocks: Vec<StudyBlock>,
}

/// A mutation of the task/event store that should trigger a new pass.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadChange {
    CompleteTask(String),
    AddTask(Task),
    UpdateTask(String, TaskPatch),
    RemoveTask(String),
    AddEvent(FixedEvent),
    RemoveEvent(String),
}

/// Store of tasks, fixed events and blocks.
pub trait ScheduleRepository {
    /// Read all non-completed tasks, all fixed events and all manual blocks.
    fn load_snapshot(&self) -> Result<ScheduleSnapshot>;

    /// Apply `change`, returning whether anything actually changed.
    ///
    /// Unknown ids and duplicate inserts are validation errors.
    fn apply_change(&mut self, change: &WorkloadChange) -> Result<bool>;

    /// Replace every block with `outcome.blocks` and record per-task status.
    ///
    /// Implementations must apply the update as a whole or not at all.
    fn replace_blocks(&mut self, outcome: &ScheduleOutcome) -> Result<()>;
}

/// Full contents of a workload file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub events: Vec<FixedEvent>,
    /// Manual and generated blocks
    #[serde(default)]
    pub blocks: Vec<StudyBlock>,
    /// Status of each task as of the last published pass
    #[serde(default)]
    pub reports: Vec<TaskReport>,
}

impl Workload {
    fn snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            tasks: self
                .tasks
                .iter()
                .filter(|t| !t.is_completed())
                .cloned()
                .collect(),
            events: self.events.clone(),
            manual_blocks: self.blocks.iter().filter(|b| b.manual).cloned().collect(),
        }
    }

    fn apply(&mut self, outcome: &ScheduleOutcome) {
        self.blocks = outcome.blocks.clone();
        self.reports = outcome.reports.clone();
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut Task, ValidationError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))
    }

    /// Apply a store mutation in place.
    pub fn apply_change(&mut self, change: &WorkloadChange) -> Result<bool, ValidationError> {
        match change {
            WorkloadChange::CompleteTask(id) => {
                let task = self.task_mut(id)?;
                if task.is_completed() {
                    return Ok(false);
                }
                task.status = TaskStatus::Completed;
                Ok(true)
            }
            WorkloadChange::AddTask(task) => {
                if self.task(&task.id).is_some() {
                    return Err(ValidationError::DuplicateId(task.id.clone()));
                }
                self.tasks.push(task.clone());
                Ok(true)
            }
            WorkloadChange::UpdateTask(id, patch) => Ok(patch.apply(self.task_mut(id)?)),
            WorkloadChange::RemoveTask(id) => {
                let before = self.tasks.len();
                self.tasks.retain(|t| t.id != *id);
                if self.tasks.len() == before {
                    return Err(ValidationError::UnknownTask(id.clone()));
                }
                // Manual blocks of a removed task go with it
                self.blocks.retain(|b| b.task_id != *id);
                Ok(true)
            }
            WorkloadChange::AddEvent(event) => {
                event.validate()?;
                if self.events.iter().any(|e| e.id == event.id) {
                    return Err(ValidationError::DuplicateId(event.id.clone()));
                }
                self.events.push(event.clone());
                Ok(true)
            }
            WorkloadChange::RemoveEvent(id) => {
                let before = self.events.len();
                self.events.retain(|e| e.id != *id);
                if self.events.len() == before {
                    return Err(ValidationError::UnknownEvent(id.clone()));
                }
                Ok(true)
            }
        }
    }
}

/// In-memory repository, used by tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    pub workload: Workload,
    /// Number of replacements applied so far
    pub publish_count: u64,
}

impl MemoryRepository {
    pub fn new(workload: Workload) -> Self {
        Self {
            workload,
            publish_count: 0,
        }
    }
}

impl ScheduleRepository for MemoryRepository {
    fn load_snapshot(&self) -> Result<ScheduleSnapshot> {
        Ok(self.workload.snapshot())
    }

    fn apply_change(&mut self, change: &WorkloadChange) -> Result<bool> {
        Ok(self.workload.apply_change(change)?)
    }

    fn replace_blocks(&mut self, outcome: &ScheduleOutcome) -> Result<()> {
        self.workload.apply(outcome);
        self.publish_count += 1;
        Ok(())
    }
}

/// JSON workload file on disk.
///
/// Writes go to a sibling temp file that is renamed over the original, so a
/// reader sees either the old or the new schedule.
#[derive(Debug, Clone)]
pub struct WorkloadFile {
    path: PathBuf,
    workload: Workload,
}

impl WorkloadFile {
    /// Open `path`; a missing file is an empty workload.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let workload = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Workload::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, workload })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn workload_mut(&mut self) -> &mut Workload {
        &mut self.workload
    }

    /// Write the current workload to disk.
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.workload)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl WorkloadFile {
    /// Swap in `next` and persist it, restoring the old workload on failure.
    fn commit(&mut self, next: Workload) -> Result<()> {
        let previous = std::mem::replace(&mut self.workload, next);
        if let Err(e) = self.save() {
            self.workload = previous;
            return Err(e);
        }
        Ok(())
    }
}

impl ScheduleRepository for WorkloadFile {
    fn load_snapshot(&self) -> Result<ScheduleSnapshot> {
        Ok(self.workload.snapshot())
    }

    fn apply_change(&mut self, change: &WorkloadChange) -> Result<bool> {
        let mut next = self.workload.clone();
        if !next.apply_change(change)? {
            return Ok(false);
        }
        self.commit(next)?;
        Ok(true)
    }

    fn replace_blocks(&mut self, outcome: &ScheduleOutcome) -> Result<()> {
        let mut next = self.workload.clone();
        next.apply(outcome);
        self.commit(next)
    }
}
