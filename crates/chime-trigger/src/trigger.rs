//! The trigger contract shared by every schedule variant.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Calendar, JobKey, JobPayload, ListenerChain, MisfireInstruction, TriggerError, TriggerKey};

/// Priority given to triggers that do not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Fields every trigger carries regardless of how it schedules fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDetail {
    /// Identity of the trigger.
    pub key: TriggerKey,
    /// The job this trigger fires.
    pub job_key: JobKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the exclusion calendar, resolved by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    #[serde(default)]
    pub misfire_instruction: MisfireInstruction,
    /// Volatile triggers are not kept across scheduler restarts.
    #[serde(default)]
    pub volatile: bool,
    /// Higher priority wins when several triggers are due at the same instant.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub listeners: ListenerChain,
    #[serde(default)]
    pub payload: JobPayload,
}

impl TriggerDetail {
    pub fn new(key: TriggerKey, job_key: JobKey) -> Self {
        Self {
            key,
            job_key,
            description: None,
            calendar_name: None,
            misfire_instruction: MisfireInstruction::default(),
            volatile: false,
            priority: DEFAULT_PRIORITY,
            listeners: ListenerChain::new(),
            payload: JobPayload::new(),
        }
    }

    /// Attach a listener by name.
    pub fn add_listener(&mut self, name: impl Into<String>) -> Result<(), TriggerError> {
        self.listeners.add(name)
    }

    /// Detach a listener by name. Returns whether it was attached.
    pub fn remove_listener(&mut self, name: &str) -> bool {
        self.listeners.remove(name)
    }

    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.to_vec()
    }

    /// Replace every listener; `None` clears the chain.
    pub fn set_listener_names(&mut self, names: Option<Vec<String>>) -> Result<(), TriggerError> {
        self.listeners.replace(names)
    }

    /// Check the identity and job binding.
    pub fn validate(&self) -> Result<(), TriggerError> {
        let required = [
            ("trigger name", &self.key.name),
            ("trigger group", &self.key.group),
            ("job name", &self.job_key.name),
            ("job group", &self.job_key.group),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TriggerError::InvalidConfig(format!("{field} cannot be empty")));
            }
        }
        Ok(())
    }
}

/// What the scheduler should do with a trigger once its job has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedExecutionInstruction {
    /// Nothing to do.
    Noop,
    /// Run the job again right away.
    ReExecuteJob,
    /// Mark this trigger complete.
    SetTriggerComplete,
    /// The trigger will never fire again; remove it.
    DeleteTrigger,
    /// Mark every trigger of the job complete.
    SetAllJobTriggersComplete,
}

/// Flags a job sets on its way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub refire_immediately: bool,
    pub unschedule_firing_trigger: bool,
    pub unschedule_all_triggers: bool,
}

/// A schedule for firing one job.
///
/// Mutating operations take `&mut self`; a scheduler that shares triggers
/// between threads wraps them in its own lock.
pub trait Trigger: fmt::Debug + Send + Sync {
    fn detail(&self) -> &TriggerDetail;

    fn detail_mut(&mut self) -> &mut TriggerDetail;

    fn key(&self) -> &TriggerKey {
        &self.detail().key
    }

    /// Check that the trigger can be scheduled.
    fn validate(&self) -> Result<(), TriggerError>;

    /// Seed the next fire time. Called once when the trigger is scheduled.
    fn compute_first_fire_time(
        &mut self,
        calendar: Option<&dyn Calendar>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError>;

    /// Record that the trigger fired and advance to the following fire time.
    fn triggered(&mut self, calendar: Option<&dyn Calendar>) -> Result<(), TriggerError>;

    /// Adjust the next fire time after the scheduler found it missed.
    fn update_after_misfire(
        &mut self,
        calendar: Option<&dyn Calendar>,
        now: DateTime<Utc>,
    ) -> Result<(), TriggerError>;

    /// Recompute the next fire time against a replaced calendar.
    fn update_with_new_calendar(
        &mut self,
        calendar: Option<&dyn Calendar>,
        now: DateTime<Utc>,
        misfire_threshold: Duration,
    ) -> Result<(), TriggerError>;

    fn next_fire_time(&self) -> Option<DateTime<Utc>>;

    fn previous_fire_time(&self) -> Option<DateTime<Utc>>;

    /// Earliest fire time strictly after `after`, or `None` once exhausted.
    fn fire_time_after(
        &self,
        after: DateTime<Utc>,
        calendar: Option<&dyn Calendar>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError>;

    /// Last fire time the schedule can produce, ignoring calendars.
    fn final_fire_time(&self) -> Option<DateTime<Utc>>;

    fn may_fire_again(&self) -> bool {
        self.next_fire_time().is_some()
    }

    /// Decide what happens to the trigger after its job ran.
    fn execution_complete(&self, outcome: &JobOutcome) -> CompletedExecutionInstruction {
        if outcome.refire_immediately {
            CompletedExecutionInstruction::ReExecuteJob
        } else if outcome.unschedule_firing_trigger {
            CompletedExecutionInstruction::SetTriggerComplete
        } else if outcome.unschedule_all_triggers {
            CompletedExecutionInstruction::SetAllJobTriggersComplete
        } else if !self.may_fire_again() {
            CompletedExecutionInstruction::DeleteTrigger
        } else {
            CompletedExecutionInstruction::Noop
        }
    }

    /// Independent copy behind a box.
    fn box_clone(&self) -> Box<dyn Trigger>;
}

impl Clone for Box<dyn Trigger> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Queue order for due triggers: earliest next fire time first, triggers that
/// will not fire again last, then higher priority, then key.
pub fn cmp_by_next_fire_time(a: &dyn Trigger, b: &dyn Trigger) -> Ordering {
    let by_time = match (a.next_fire_time(), b.next_fire_time()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time
        .then_with(|| b.detail().priority.cmp(&a.detail().priority))
        .then_with(|| a.key().cmp(b.key()))
}

/// The next `limit` fire times of a trigger, computed on a copy so the
/// trigger itself is untouched.
pub fn compute_fire_times(
    trigger: &dyn Trigger,
    calendar: Option<&dyn Calendar>,
    limit: usize,
) -> Result<Vec<DateTime<Utc>>, TriggerError> {
    let mut probe = trigger.box_clone();
    probe.compute_first_fire_time(calendar)?;

    let mut times = Vec::with_capacity(limit);
    while times.len() < limit {
        let Some(next) = probe.next_fire_time() else {
            break;
        };
        times.push(next);
        probe.triggered(calendar)?;
    }
    Ok(times)
}
