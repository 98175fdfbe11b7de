pub mod artifact;
pub mod command;
pub mod job;
pub mod outcome;
pub mod pipeline;
pub mod retention;
pub mod scheduler;

#[cfg(test)]
pub mod testing;

pub use job::{execute_backup, sweep_destination, BackupResult};
pub use scheduler::{run_scheduler, SchedulerSummary};
