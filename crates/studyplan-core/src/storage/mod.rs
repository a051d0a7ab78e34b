mod config;
pub mod repository;

pub use config::{SchedulerConfig, SpreadStrategy, MAX_HORIZON_DAYS};
pub use repository::{
    MemoryRepository, ScheduleRepository, ScheduleSnapshot, Workload, WorkloadChange, WorkloadFile,
};

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/studyplan/`, or `$STUDYPLAN_HOME` when set.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("STUDYPLAN_HOME") {
        Some(custom) => PathBuf::from(custom),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("studyplan"),
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
