//! Subcommand implementations. Each returns the text to print.

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{info, warn};

use chime_trigger::{Calendar, SimpleTrigger, Trigger, TriggerConfig};

/// Calendar excluding Saturdays and Sundays (UTC).
struct Weekends;

impl Calendar for Weekends {
    fn is_excluded(&self, instant: DateTime<Utc>) -> bool {
        matches!(instant.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

fn calendar(exclude_weekends: bool) -> Option<&'static dyn Calendar> {
    exclude_weekends.then_some(&Weekends as &dyn Calendar)
}

/// Whether `next` is still within the misfire threshold of `now`.
fn within_misfire_threshold(next: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    next.checked_add_signed(threshold).is_none_or(|deadline| deadline >= now)
}

/// Read the configuration file if given, then apply the skip override.
pub fn load_config(path: Option<&Path>, max_calendar_skips: Option<u32>) -> Result<TriggerConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
            TriggerConfig::from_json(&json).map_err(|e| miette::miette!("{}", e))?
        }
        None => TriggerConfig::default(),
    };

    if let Some(skips) = max_calendar_skips {
        config.max_calendar_skips = skips;
        config.validate().map_err(|e| miette::miette!("{}", e))?;
    }

    Ok(config)
}

/// Load a trigger definition, apply the configuration and compute its first
/// fire time.
fn load_trigger(
    path: &Path,
    config: &TriggerConfig,
    calendar: Option<&dyn Calendar>,
) -> Result<SimpleTrigger> {
    let json = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read trigger {}", path.display()))?;
    let mut trigger = SimpleTrigger::from_json(&json)
        .map_err(|e| miette::miette!("invalid trigger {}: {}", path.display(), e))?;
    trigger.apply_config(config);

    if trigger.next_fire_time().is_none() {
        trigger
            .compute_first_fire_time(calendar)
            .map_err(|e| miette::miette!("{}", e))?;
    }
    Ok(trigger)
}

/// List the next `count` fire times, recording each fire.
pub fn plan(
    path: &Path,
    config: &TriggerConfig,
    count: usize,
    exclude_weekends: bool,
) -> Result<String> {
    let calendar = calendar(exclude_weekends);
    let mut trigger = load_trigger(path, config, calendar)?;

    let mut lines = Vec::new();
    while lines.len() < count {
        let Some(next) = trigger.next_fire_time() else {
            break;
        };
        lines.push(next.to_rfc3339());
        trigger
            .triggered(calendar)
            .map_err(|e| miette::miette!("{}", e))?;
    }

    info!(trigger = %trigger.key(), fires = lines.len(), "planned fire times");
    if lines.is_empty() {
        return Ok("trigger will not fire".to_string());
    }
    Ok(lines.join("\n"))
}

/// Apply the trigger's misfire instruction as of `now` and render the result.
pub fn misfire(
    path: &Path,
    config: &TriggerConfig,
    now: DateTime<Utc>,
    exclude_weekends: bool,
) -> Result<String> {
    let calendar = calendar(exclude_weekends);
    let mut trigger = load_trigger(path, config, calendar)?;

    match trigger.next_fire_time() {
        Some(next) if within_misfire_threshold(next, now, config.misfire_threshold()) => {
            warn!(
                trigger = %trigger.key(),
                next = %next,
                "fire time is within the misfire threshold, applying anyway"
            );
        }
        _ => {}
    }

    trigger
        .update_after_misfire(calendar, now)
        .map_err(|e| miette::miette!("{}", e))?;
    trigger.to_json().map_err(|e| miette::miette!("{}", e))
}

/// Render the last fire time the trigger will ever produce.
pub fn final_fire_time(path: &Path, config: &TriggerConfig) -> Result<String> {
    let trigger = load_trigger(path, config, None)?;
    Ok(match trigger.final_fire_time() {
        Some(last) => last.to_rfc3339(),
        None => "never".to_string(),
    })
}
