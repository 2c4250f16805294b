// Scheduler module for one-shot notification triggers

pub mod engine;

pub use engine::{FireCallback, Scheduler, SchedulerConfig, SchedulerEngine};
