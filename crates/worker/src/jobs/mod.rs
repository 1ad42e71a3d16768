//! Background job scheduler and job implementations.

mod pool_metrics;
mod scheduler;
mod succession_repair;

pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{run_once, Job, JobFrequency, JobScheduler};
pub use succession_repair::{RepairReport, SuccessionRepairJob};
