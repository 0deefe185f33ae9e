//! Interval trigger: fires at a start time, then every repeat interval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::{self, Calendar};
use crate::config::default_max_calendar_skips;
use crate::{
    JobKey, JobPayload, MisfireAction, MisfireInstruction, Trigger, TriggerConfig, TriggerDetail,
    TriggerError, TriggerKey,
};

/// Number of fires after the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatCount {
    Finite(u32),
    Indefinite,
}

impl RepeatCount {
    pub fn is_indefinite(self) -> bool {
        matches!(self, Self::Indefinite)
    }

    /// Reduce a finite count, stopping at zero.
    pub fn saturating_sub(self, fires: u32) -> Self {
        match self {
            Self::Finite(n) => Self::Finite(n.saturating_sub(fires)),
            Self::Indefinite => Self::Indefinite,
        }
    }
}

/// Point the fire grid is measured from after a misfire moved it.
///
/// `index` is how much of the repeat budget was spent before `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ScheduleAnchor {
    time: DateTime<Utc>,
    index: u32,
}

/// Trigger that fires at `start_time` and then every `repeat_interval`,
/// `repeat_count` more times, never after `end_time`.
///
/// # Examples
///
/// ```rust
/// use chime_trigger::{JobKey, RepeatCount, SimpleTrigger, Trigger, TriggerKey};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let trigger = SimpleTrigger::builder(
///     TriggerKey::in_default_group("tick"),
///     JobKey::in_default_group("job"),
///     start,
/// )
/// .repeat_count(RepeatCount::Finite(4))
/// .repeat_interval(Duration::milliseconds(10))
/// .build()
/// .unwrap();
///
/// let after = start + Duration::milliseconds(34);
/// assert_eq!(
///     trigger.fire_time_after(after, None).unwrap(),
///     Some(start + Duration::milliseconds(40))
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTrigger {
    #[serde(flatten)]
    detail: TriggerDetail,
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    repeat_count: RepeatCount,
    #[serde(rename = "repeat_interval_ms", with = "interval_ms")]
    repeat_interval: Duration,
    #[serde(default)]
    times_triggered: u32,
    #[serde(default)]
    next_fire_time: Option<DateTime<Utc>>,
    #[serde(default)]
    previous_fire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor: Option<ScheduleAnchor>,
    #[serde(default = "default_max_calendar_skips")]
    max_calendar_skips: u32,
}

impl SimpleTrigger {
    /// Start building a trigger that fires once at `start_time`.
    pub fn builder(
        key: TriggerKey,
        job_key: JobKey,
        start_time: DateTime<Utc>,
    ) -> SimpleTriggerBuilder {
        SimpleTriggerBuilder::new(key, job_key, start_time)
    }

    /// Load a stored trigger and validate it.
    pub fn from_json(json: &str) -> Result<Self, TriggerError> {
        let trigger: Self = serde_json::from_str(json)?;
        trigger.validate()?;
        Ok(trigger)
    }

    pub fn to_json(&self) -> Result<String, TriggerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply search limits to a trigger loaded from storage.
    pub fn apply_config(&mut self, config: &TriggerConfig) {
        self.max_calendar_skips = config.max_calendar_skips;
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn repeat_count(&self) -> RepeatCount {
        self.repeat_count
    }

    pub fn repeat_interval(&self) -> Duration {
        self.repeat_interval
    }

    pub fn times_triggered(&self) -> u32 {
        self.times_triggered
    }

    /// Number of whole repeat intervals between two instants.
    pub fn compute_num_times_fired_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        let interval = self.interval_ms();
        if interval <= 0 || to <= from {
            return 0;
        }
        let elapsed = (to - from).num_milliseconds();
        u32::try_from(elapsed / interval).unwrap_or(u32::MAX)
    }

    /// Latest grid instant at or before `end`, ignoring the repeat bound.
    pub fn fire_time_before(&self, end: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let anchor = self.anchor_time();
        if end < anchor {
            return None;
        }
        let interval = self.interval_ms();
        if interval <= 0 {
            return Some(anchor);
        }
        self.grid_time((end - anchor).num_milliseconds() / interval)
    }

    fn anchor_time(&self) -> DateTime<Utc> {
        self.anchor.map_or(self.start_time, |a| a.time)
    }

    fn anchor_index(&self) -> u32 {
        self.anchor.map_or(0, |a| a.index)
    }

    fn interval_ms(&self) -> i64 {
        self.repeat_interval.num_milliseconds()
    }

    /// The `k`-th instant of the grid, `None` past the representable range.
    fn grid_time(&self, k: i64) -> Option<DateTime<Utc>> {
        let offset = k.checked_mul(self.interval_ms())?;
        self.anchor_time()
            .checked_add_signed(Duration::try_milliseconds(offset)?)
    }

    /// Repeat budget spent at grid instant `time`.
    fn grid_index(&self, time: DateTime<Utc>) -> u32 {
        let interval = self.interval_ms();
        if interval <= 0 {
            return self.anchor_index();
        }
        let steps = (time - self.anchor_time()).num_milliseconds() / interval;
        let steps = u32::try_from(steps.max(0)).unwrap_or(u32::MAX);
        self.anchor_index().saturating_add(steps)
    }

    fn within_repeat_bound(&self, k: i64) -> bool {
        match self.repeat_count {
            RepeatCount::Indefinite => true,
            RepeatCount::Finite(n) => i64::from(self.anchor_index()) + k <= i64::from(n),
        }
    }

    /// Walk the grid from index `k` to the first instant that is inside the
    /// bounds and not excluded by the calendar.
    fn search_from(
        &self,
        mut k: i64,
        calendar: Option<&dyn Calendar>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError> {
        let mut skips = 0u32;
        loop {
            if !self.within_repeat_bound(k) || (k > 0 && self.interval_ms() <= 0) {
                return Ok(None);
            }
            let Some(candidate) = self.grid_time(k) else {
                return Ok(None);
            };
            if self.end_time.is_some_and(|end| candidate > end) {
                return Ok(None);
            }
            if !calendar::is_excluded(calendar, candidate) {
                return Ok(Some(candidate));
            }
            if skips >= self.max_calendar_skips {
                warn!(
                    trigger = %self.detail.key,
                    skips,
                    "calendar excluded every candidate fire time"
                );
                return Err(TriggerError::SchedulingImpossible { skips });
            }
            skips += 1;
            k += 1;
        }
    }

    /// Move the grid so it starts at `now`, with `spent` of the repeat budget
    /// already used. Completes the trigger if `now` is past the end time.
    fn reschedule_now(&mut self, now: DateTime<Utc>, spent: u32) {
        if self.end_time.is_some_and(|end| end < now) {
            self.next_fire_time = None;
            return;
        }
        self.rebase(now, spent);
        self.next_fire_time = Some(now);
    }

    /// Anchor the grid at `time` with `spent` of the repeat budget used.
    fn rebase(&mut self, time: DateTime<Utc>, spent: u32) {
        let index = match self.repeat_count {
            RepeatCount::Finite(n) => spent.min(n),
            RepeatCount::Indefinite => 0,
        };
        self.anchor = Some(ScheduleAnchor { time, index });
    }
}

impl Trigger for SimpleTrigger {
    fn detail(&self) -> &TriggerDetail {
        &self.detail
    }

    fn detail_mut(&mut self) -> &mut TriggerDetail {
        &mut self.detail
    }

    fn validate(&self) -> Result<(), TriggerError> {
        self.detail.validate()?;

        if self.end_time.is_some_and(|end| end < self.start_time) {
            return Err(TriggerError::InvalidConfig(
                "end time cannot be before start time".to_string(),
            ));
        }

        if self.repeat_interval < Duration::zero() {
            return Err(TriggerError::InvalidConfig(
                "repeat interval cannot be negative".to_string(),
            ));
        }

        if self.repeat_count != RepeatCount::Finite(0) && self.interval_ms() <= 0 {
            return Err(TriggerError::InvalidConfig(
                "repeat interval must be positive when the trigger repeats".to_string(),
            ));
        }

        if self.repeat_interval != Duration::milliseconds(self.interval_ms()) {
            return Err(TriggerError::InvalidConfig(
                "repeat interval must be a whole number of milliseconds".to_string(),
            ));
        }

        if self.max_calendar_skips == 0 {
            return Err(TriggerError::InvalidConfig(
                "max_calendar_skips must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, calendar), fields(trigger = %self.detail.key))]
    fn compute_first_fire_time(
        &mut self,
        calendar: Option<&dyn Calendar>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError> {
        self.next_fire_time = self.search_from(0, calendar)?;
        debug!(next_fire_time = ?self.next_fire_time, "computed first fire time");
        Ok(self.next_fire_time)
    }

    fn triggered(&mut self, calendar: Option<&dyn Calendar>) -> Result<(), TriggerError> {
        let following = match self.next_fire_time {
            Some(fired) => self.fire_time_after(fired, calendar)?,
            None => None,
        };

        self.times_triggered = self.times_triggered.saturating_add(1);
        self.previous_fire_time = self.next_fire_time;
        self.next_fire_time = following;

        debug!(
            trigger = %self.detail.key,
            times_triggered = self.times_triggered,
            next_fire_time = ?self.next_fire_time,
            "recorded fire"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, calendar), fields(trigger = %self.detail.key))]
    fn update_after_misfire(
        &mut self,
        calendar: Option<&dyn Calendar>,
        now: DateTime<Utc>,
    ) -> Result<(), TriggerError> {
        let Some(missed) = self.next_fire_time else {
            debug!("misfire on trigger with no pending fire, nothing to do");
            return Ok(());
        };
        // A misfire is only detected after the missed fire time.
        let now = now.max(missed);

        let action = self.detail.misfire_instruction.resolve(self.repeat_count);
        info!(
            configured = ?self.detail.misfire_instruction,
            resolved = ?action,
            missed = %missed,
            "handling misfire"
        );

        match action {
            MisfireAction::FireNow => {
                self.next_fire_time = match self.end_time {
                    Some(end) if end < now => None,
                    _ => Some(now),
                };
            }
            MisfireAction::RescheduleNowWithExistingRepeatCount => {
                self.reschedule_now(now, self.times_triggered);
            }
            MisfireAction::RescheduleNowWithRemainingRepeatCount => {
                let missed_fires = self.compute_num_times_fired_between(missed, now);
                self.repeat_count = self.repeat_count.saturating_sub(missed_fires);
                self.reschedule_now(now, self.times_triggered);
            }
            MisfireAction::RescheduleNextWithRemainingCount => {
                let next = self.fire_time_after(now, calendar)?;
                if let Some(next) = next {
                    // Shrink the count and move the budget with it, so the
                    // last fire stays where the grid put it.
                    let missed_fires = self.compute_num_times_fired_between(missed, next);
                    let index = self.grid_index(next).saturating_sub(missed_fires);
                    self.repeat_count = self.repeat_count.saturating_sub(missed_fires);
                    self.rebase(next, index);
                }
                self.next_fire_time = next;
            }
            MisfireAction::RescheduleNextWithExistingCount => {
                self.next_fire_time = self.fire_time_after(now, calendar)?;
            }
        }

        debug!(next_fire_time = ?self.next_fire_time, repeat_count = ?self.repeat_count, "misfire handled");
        Ok(())
    }

    fn update_with_new_calendar(
        &mut self,
        calendar: Option<&dyn Calendar>,
        now: DateTime<Utc>,
        misfire_threshold: Duration,
    ) -> Result<(), TriggerError> {
        // Anything at or before the cutoff would already count as misfired.
        let cutoff = now
            .checked_sub_signed(misfire_threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let after = self
            .previous_fire_time
            .map_or(cutoff, |previous| previous.max(cutoff));
        self.next_fire_time = if after < self.anchor_time() {
            self.search_from(0, calendar)?
        } else {
            self.fire_time_after(after, calendar)?
        };

        debug!(
            trigger = %self.detail.key,
            next_fire_time = ?self.next_fire_time,
            "recomputed fire time for new calendar"
        );
        Ok(())
    }

    fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_fire_time
    }

    fn previous_fire_time(&self) -> Option<DateTime<Utc>> {
        self.previous_fire_time
    }

    fn fire_time_after(
        &self,
        after: DateTime<Utc>,
        calendar: Option<&dyn Calendar>,
    ) -> Result<Option<DateTime<Utc>>, TriggerError> {
        let anchor = self.anchor_time();
        let k = if after < anchor {
            0
        } else {
            let interval = self.interval_ms();
            if interval <= 0 {
                return Ok(None);
            }
            (after - anchor).num_milliseconds() / interval + 1
        };
        self.search_from(k, calendar)
    }

    fn final_fire_time(&self) -> Option<DateTime<Utc>> {
        let last = match self.repeat_count {
            RepeatCount::Indefinite => None,
            RepeatCount::Finite(n) => {
                self.grid_time(i64::from(n.saturating_sub(self.anchor_index())))
            }
        };
        match (last, self.end_time) {
            (Some(last), Some(end)) if last > end => self.fire_time_before(end),
            (Some(last), _) => Some(last),
            (None, Some(end)) => self.fire_time_before(end),
            (None, None) => None,
        }
    }

    fn box_clone(&self) -> Box<dyn Trigger> {
        Box::new(self.clone())
    }
}

/// Builder for [`SimpleTrigger`].
pub struct SimpleTriggerBuilder {
    detail: TriggerDetail,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    repeat_count: RepeatCount,
    repeat_interval: Duration,
    listeners: Vec<String>,
    max_calendar_skips: u32,
}

impl SimpleTriggerBuilder {
    fn new(key: TriggerKey, job_key: JobKey, start_time: DateTime<Utc>) -> Self {
        Self {
            detail: TriggerDetail::new(key, job_key),
            start_time,
            end_time: None,
            repeat_count: RepeatCount::Finite(0),
            repeat_interval: Duration::zero(),
            listeners: Vec::new(),
            max_calendar_skips: default_max_calendar_skips(),
        }
    }

    #[must_use]
    pub fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    #[must_use]
    pub fn repeat_count(mut self, repeat_count: RepeatCount) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    #[must_use]
    pub fn repeat_interval(mut self, repeat_interval: Duration) -> Self {
        self.repeat_interval = repeat_interval;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.detail.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn calendar_name(mut self, calendar_name: impl Into<String>) -> Self {
        self.detail.calendar_name = Some(calendar_name.into());
        self
    }

    #[must_use]
    pub fn misfire_instruction(mut self, instruction: MisfireInstruction) -> Self {
        self.detail.misfire_instruction = instruction;
        self
    }

    #[must_use]
    pub fn volatile(mut self, volatile: bool) -> Self {
        self.detail.volatile = volatile;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.detail.priority = priority;
        self
    }

    /// Attach a listener. Duplicates are reported by [`Self::build`].
    #[must_use]
    pub fn listener(mut self, name: impl Into<String>) -> Self {
        self.listeners.push(name.into());
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: JobPayload) -> Self {
        self.detail.payload = payload;
        self
    }

    /// Take search limits from a shared configuration.
    #[must_use]
    pub fn config(mut self, config: &TriggerConfig) -> Self {
        self.max_calendar_skips = config.max_calendar_skips;
        self
    }

    /// Build and validate the trigger. No fire time is computed yet.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::DuplicateListener` for a repeated listener name
    /// and `TriggerError::InvalidConfig` for an invalid schedule.
    pub fn build(mut self) -> Result<SimpleTrigger, TriggerError> {
        self.detail.set_listener_names(Some(self.listeners))?;
        let trigger = SimpleTrigger {
            detail: self.detail,
            start_time: self.start_time,
            end_time: self.end_time,
            repeat_count: self.repeat_count,
            repeat_interval: self.repeat_interval,
            times_triggered: 0,
            next_fire_time: None,
            previous_fire_time: None,
            anchor: None,
            max_calendar_skips: self.max_calendar_skips,
        };
        trigger.validate()?;
        Ok(trigger)
    }
}

/// Serde adapter storing the repeat interval as whole milliseconds.
mod interval_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(interval.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = i64::deserialize(deserializer)?;
        Duration::try_milliseconds(ms)
            .ok_or_else(|| de::Error::custom(format!("repeat interval out of range: {ms}ms")))
    }
}
