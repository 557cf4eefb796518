//! # sb-runner
//!
//! Runs a plan of reconstruction-tool trials on a bounded worker pool.
//!
//! Provides device slot assignment, the subprocess trial executor, the
//! experiment scheduler, the shared console sink and the built-in test plans.

pub mod allocator;
pub mod config;
pub mod console;
pub mod executor;
pub mod plan;
pub mod scheduler;

pub use allocator::{assign, DeviceAllocation};
pub use config::{DeviceAssignment, RunnerConfig};
pub use console::{Console, SharedBuffer};
pub use executor::{Invocation, ProcessExecutor, TrialExecutor};
pub use plan::TestPlan;
pub use scheduler::{
    backstop_deadline, timeout_grace, RunResults, Scheduler, StateCounts, MAX_TIMEOUT_GRACE,
    MIN_TIMEOUT_GRACE,
};
