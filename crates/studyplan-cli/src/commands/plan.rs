use clap::Args;
use std::path::PathBuf;

use studyplan_core::{EnergyProfile, MemoryRepository, Rescheduler, WorkloadFile};

use super::{load_config, parse_now, print_update};

#[derive(Args)]
pub struct PlanArgs {
    /// Workload JSON file (tasks, events, blocks)
    #[arg(long)]
    pub workload: PathBuf,
    /// Reference time (RFC 3339), defaults to now
    #[arg(long)]
    pub now: Option<String>,
    /// Seed for slot selection
    #[arg(long)]
    pub seed: Option<u64>,
    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
    /// Write the new blocks back to the workload file
    #[arg(long)]
    pub write: bool,
}

pub fn run(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.workload.exists() {
        return Err(format!("workload file not found: {}", args.workload.display()).into());
    }
    let now = parse_now(args.now.as_deref())?;
    let config = load_config(args.seed)?;
    let energy = EnergyProfile::load_from(&EnergyProfile::path()?)?;
    let file = WorkloadFile::open(&args.workload)?;
    tracing::debug!(
        tasks = file.workload().tasks.len(),
        events = file.workload().events.len(),
        write = args.write,
        "planning workload"
    );

    let update = if args.write {
        let mut rescheduler = Rescheduler::new(file, config, energy);
        rescheduler.recompute(now)?
    } else {
        let repo = MemoryRepository::new(file.workload().clone());
        let mut rescheduler = Rescheduler::new(repo, config, energy);
        rescheduler.recompute(now)?
    };
    let update = update.ok_or("scheduling pass produced no result")?;

    print_update(&update, args.json)
}
