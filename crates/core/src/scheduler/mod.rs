//! Periodic NAV refresh across every portfolio, in bounded concurrent batches.

mod nav_scheduler;
mod scheduler_errors;
mod scheduler_model;

#[cfg(test)]
mod nav_scheduler_tests;

pub use nav_scheduler::NavScheduler;
pub use scheduler_errors::SchedulerError;
pub use scheduler_model::*;
