//! Property-based tests for interval fire-time computation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use chime_trigger::{
    JobKey, JobPayload, MisfireInstruction, RepeatCount, SimpleTrigger, Trigger, TriggerKey,
    compute_fire_times,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2006, 6, 1, 10, 5, 15).unwrap()
}

fn build(
    start: DateTime<Utc>,
    count: RepeatCount,
    interval_ms: i64,
    end: Option<DateTime<Utc>>,
) -> SimpleTrigger {
    let mut builder = SimpleTrigger::builder(
        TriggerKey::new("prop", "tests"),
        JobKey::new("job", "tests"),
        start,
    )
    .repeat_count(count)
    .repeat_interval(Duration::milliseconds(interval_ms));
    if let Some(end) = end {
        builder = builder.end_time(end);
    }
    builder.build().unwrap()
}

// Strategy for start times within a few years of the base
fn start_time() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..100_000_000_000).prop_map(|ms| base() + Duration::milliseconds(ms))
}

fn repeat_count() -> impl Strategy<Value = RepeatCount> {
    prop_oneof![
        3 => (0u32..200).prop_map(RepeatCount::Finite),
        1 => Just(RepeatCount::Indefinite),
    ]
}

fn misfire_instruction() -> impl Strategy<Value = MisfireInstruction> {
    prop_oneof![
        Just(MisfireInstruction::SmartPolicy),
        Just(MisfireInstruction::FireNow),
        Just(MisfireInstruction::RescheduleNowWithExistingRepeatCount),
        Just(MisfireInstruction::RescheduleNowWithRemainingRepeatCount),
        Just(MisfireInstruction::RescheduleNextWithRemainingCount),
        Just(MisfireInstruction::RescheduleNextWithExistingCount),
    ]
}

proptest! {
    // The k-th fire of a finite schedule is start + k * interval
    #[test]
    fn kth_fire_is_on_the_grid(
        start in start_time(),
        count in 0u32..100,
        interval_ms in 1i64..3_600_000,
    ) {
        let trigger = build(start, RepeatCount::Finite(count), interval_ms, None);
        let times = compute_fire_times(&trigger, None, count as usize + 10).unwrap();

        prop_assert_eq!(times.len(), count as usize + 1);
        for (k, time) in times.iter().enumerate() {
            prop_assert_eq!(*time, start + Duration::milliseconds(k as i64 * interval_ms));
        }
    }

    // fire_time_after returns the smallest grid instant strictly after t
    #[test]
    fn fire_time_after_is_minimal(
        start in start_time(),
        count in repeat_count(),
        interval_ms in 1i64..100_000,
        offset_ms in -100_000i64..10_000_000,
    ) {
        let trigger = build(start, count, interval_ms, None);
        let after = start + Duration::milliseconds(offset_ms);

        match trigger.fire_time_after(after, None).unwrap() {
            Some(next) => {
                prop_assert!(next > after);
                let k = (next - start).num_milliseconds();
                prop_assert_eq!(k % interval_ms, 0);
                // The grid point before it is not after `after`
                prop_assert!(next == start || next - Duration::milliseconds(interval_ms) <= after);
            }
            None => {
                let last = trigger.final_fire_time().unwrap();
                prop_assert!(last <= after);
            }
        }
    }

    // Asking at the k-th fire yields the (k+1)-th, and nothing past the last
    #[test]
    fn fire_time_after_steps_one_fire(
        start in start_time(),
        count in 1u32..100,
        interval_ms in 1i64..100_000,
        k in 0u32..120,
    ) {
        let trigger = build(start, RepeatCount::Finite(count), interval_ms, None);
        let kth = start + Duration::milliseconds(i64::from(k) * interval_ms);
        let next = trigger.fire_time_after(kth, None).unwrap();

        if k < count {
            prop_assert_eq!(next, Some(kth + Duration::milliseconds(interval_ms)));
        } else {
            prop_assert_eq!(next, None);
        }
    }

    // End time caps every computed fire
    #[test]
    fn fires_never_pass_end_time(
        start in start_time(),
        interval_ms in 1i64..10_000,
        end_offset_ms in 0i64..200_000,
    ) {
        let end = start + Duration::milliseconds(end_offset_ms);
        let trigger = build(start, RepeatCount::Indefinite, interval_ms, Some(end));
        let times = compute_fire_times(&trigger, None, 500).unwrap();

        prop_assert!(!times.is_empty());
        prop_assert!(times.iter().all(|t| *t <= end));
        if times.len() < 500 {
            prop_assert_eq!(times.last().copied(), trigger.final_fire_time());
        }
    }

    // Misfire handling never moves the configured bounds
    #[test]
    fn misfire_preserves_bounds(
        count in repeat_count(),
        interval_ms in 1i64..10_000,
        end_offset_ms in proptest::option::of(0i64..500_000),
        instruction in misfire_instruction(),
        late_ms in 0i64..1_000_000,
    ) {
        let start = base();
        let end = end_offset_ms.map(|ms| start + Duration::milliseconds(ms));
        let mut trigger = build(start, count, interval_ms, end);
        trigger.detail_mut().misfire_instruction = instruction;
        trigger.compute_first_fire_time(None).unwrap();

        trigger.update_after_misfire(None, start + Duration::milliseconds(late_ms)).unwrap();

        prop_assert_eq!(trigger.start_time(), start);
        prop_assert_eq!(trigger.end_time(), end);
        if let Some(next) = trigger.next_fire_time() {
            prop_assert!(next >= start);
            prop_assert!(end.is_none_or(|end| next <= end));
        }
    }

    // Clones never share listener or payload storage
    #[test]
    fn clone_is_isolated(
        names in prop::collection::hash_set("[a-z]{1,8}", 1..6),
        entries in prop::collection::hash_map("[A-Z]{1,4}", "[a-z]{0,8}", 1..6),
    ) {
        let names: Vec<String> = names.into_iter().collect();
        let payload: JobPayload = entries.clone().into_iter().collect();

        let mut original = build(base(), RepeatCount::Finite(0), 0, None);
        original.detail_mut().set_listener_names(Some(names.clone())).unwrap();
        original.detail_mut().payload = payload;

        let mut clone = original.clone();
        prop_assert_eq!(&clone, &original);

        let first_name = names[0].clone();
        let first_key = entries.keys().next().unwrap().clone();
        clone.detail_mut().remove_listener(&first_name);
        clone.detail_mut().payload.remove(&first_key);

        prop_assert_eq!(original.detail().listener_names(), names);
        prop_assert_eq!(original.detail().payload.len(), entries.len());
        prop_assert!(!clone.detail().listeners.contains(&first_name));
        prop_assert!(!clone.detail().payload.contains_key(&first_key));
    }

    // Stored triggers load back with identical observable values
    #[test]
    fn json_round_trip(
        start in start_time(),
        count in repeat_count(),
        interval_ms in 1i64..100_000,
        description in proptest::option::of(".{0,40}"),
        volatile in proptest::bool::ANY,
        priority in -10i32..10,
        instruction in misfire_instruction(),
        fires in 0usize..5,
    ) {
        let mut trigger = build(start, count, interval_ms, None);
        let detail = trigger.detail_mut();
        detail.description = description;
        detail.volatile = volatile;
        detail.priority = priority;
        detail.misfire_instruction = instruction;
        detail.calendar_name = Some("holidays".to_string());
        detail.add_listener("L1").unwrap();
        detail.payload.put("A", "B");

        trigger.compute_first_fire_time(None).unwrap();
        for _ in 0..fires {
            trigger.triggered(None).unwrap();
        }

        let json = trigger.to_json().unwrap();
        let decoded = SimpleTrigger::from_json(&json).unwrap();
        prop_assert_eq!(decoded, trigger);
    }
}
