//! Trigger core for Chime.
//!
//! This crate decides when a scheduled job fires next:
//! - Computes interval fire times, skipping instants a calendar excludes
//! - Recovers missed fires according to a misfire instruction
//! - Carries trigger metadata: listener names, job payload, identity
//!
//! Dispatch, persistence and concrete calendars belong to the scheduler that
//! owns the triggers.

mod calendar;
mod config;
mod error;
mod key;
mod listener;
mod misfire;
mod payload;
mod simple;
mod trigger;

pub use calendar::Calendar;
pub use config::{TriggerConfig, TriggerConfigBuilder};
pub use error::TriggerError;
pub use key::{DEFAULT_GROUP, JobKey, TriggerKey};
pub use listener::ListenerChain;
pub use misfire::{MisfireAction, MisfireInstruction};
pub use payload::JobPayload;
pub use simple::{RepeatCount, SimpleTrigger, SimpleTriggerBuilder};
pub use trigger::{
    CompletedExecutionInstruction, DEFAULT_PRIORITY, JobOutcome, Trigger, TriggerDetail,
    cmp_by_next_fire_time, compute_fire_times,
};
