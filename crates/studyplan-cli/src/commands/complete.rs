use clap::Args;
use std::path::PathBuf;

use studyplan_core::{EnergyProfile, Rescheduler, WorkloadFile};

use super::{load_config, parse_now, print_update};

#[derive(Args)]
pub struct CompleteArgs {
    /// Id of the task to mark completed
    pub task_id: String,
    /// Workload JSON file
    #[arg(long)]
    pub workload: PathBuf,
    #[arg(long)]
    pub now: Option<String>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CompleteArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.workload.exists() {
        return Err(format!("workload file not found: {}", args.workload.display()).into());
    }
    let now = parse_now(args.now.as_deref())?;
    let config = load_config(args.seed)?;
    let energy = EnergyProfile::load_from(&EnergyProfile::path()?)?;
    let file = WorkloadFile::open(&args.workload)?;

    let mut rescheduler = Rescheduler::new(file, config, energy);
    rescheduler.on_task_completed(&args.task_id, now)?;
    match rescheduler.flush(now)? {
        Some(update) => print_update(&update, args.json),
        None => {
            println!("task {} was already completed", args.task_id);
            Ok(())
        }
    }
}
