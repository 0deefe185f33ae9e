//! Misfire instructions and their resolution.

use serde::{Deserialize, Serialize};

use crate::{RepeatCount, TriggerError};

/// What a trigger does when the scheduler reports that its next fire time
/// passed without firing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfireInstruction {
    /// Pick one of the concrete instructions from the schedule's shape.
    #[default]
    SmartPolicy,
    /// Fire once now, then carry on with the regular schedule.
    FireNow,
    /// Restart the schedule now, keeping every fire that was still owed.
    RescheduleNowWithExistingRepeatCount,
    /// Restart the schedule now, dropping the fires that were missed.
    RescheduleNowWithRemainingRepeatCount,
    /// Wait for the next regular fire time, dropping the fires that were missed.
    RescheduleNextWithRemainingCount,
    /// Wait for the next regular fire time, keeping every fire that was still owed.
    RescheduleNextWithExistingCount,
}

/// A misfire instruction with the smart policy already decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MisfireAction {
    FireNow,
    RescheduleNowWithExistingRepeatCount,
    RescheduleNowWithRemainingRepeatCount,
    RescheduleNextWithRemainingCount,
    RescheduleNextWithExistingCount,
}

impl MisfireAction {
    /// Whether the action moves the fire grid to the misfire instant.
    pub fn fires_now(self) -> bool {
        matches!(
            self,
            Self::FireNow
                | Self::RescheduleNowWithExistingRepeatCount
                | Self::RescheduleNowWithRemainingRepeatCount
        )
    }
}

impl MisfireInstruction {
    /// Resolve the instruction against the schedule's repeat count at misfire
    /// time. Only [`MisfireInstruction::SmartPolicy`] depends on the count.
    pub fn resolve(self, repeat_count: RepeatCount) -> MisfireAction {
        match self {
            Self::SmartPolicy => match repeat_count {
                RepeatCount::Finite(0) => MisfireAction::FireNow,
                RepeatCount::Indefinite => MisfireAction::RescheduleNextWithRemainingCount,
                RepeatCount::Finite(_) => MisfireAction::RescheduleNowWithExistingRepeatCount,
            },
            Self::FireNow => MisfireAction::FireNow,
            Self::RescheduleNowWithExistingRepeatCount => {
                MisfireAction::RescheduleNowWithExistingRepeatCount
            }
            Self::RescheduleNowWithRemainingRepeatCount => {
                MisfireAction::RescheduleNowWithRemainingRepeatCount
            }
            Self::RescheduleNextWithRemainingCount => {
                MisfireAction::RescheduleNextWithRemainingCount
            }
            Self::RescheduleNextWithExistingCount => MisfireAction::RescheduleNextWithExistingCount,
        }
    }

    /// Legacy integer code used by older stored triggers.
    pub fn code(self) -> i32 {
        match self {
            Self::SmartPolicy => 0,
            Self::FireNow => 1,
            Self::RescheduleNowWithExistingRepeatCount => 2,
            Self::RescheduleNowWithRemainingRepeatCount => 3,
            Self::RescheduleNextWithRemainingCount => 4,
            Self::RescheduleNextWithExistingCount => 5,
        }
    }
}

impl TryFrom<i32> for MisfireInstruction {
    type Error = TriggerError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::SmartPolicy),
            1 => Ok(Self::FireNow),
            2 => Ok(Self::RescheduleNowWithExistingRepeatCount),
            3 => Ok(Self::RescheduleNowWithRemainingRepeatCount),
            4 => Ok(Self::RescheduleNextWithRemainingCount),
            5 => Ok(Self::RescheduleNextWithExistingCount),
            other => Err(TriggerError::InvalidConfig(format!(
                "unknown misfire instruction code: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RepeatCount::Finite(0) => MisfireAction::FireNow ; "single fire")]
    #[test_case(RepeatCount::Finite(5) => MisfireAction::RescheduleNowWithExistingRepeatCount ; "finite repeats")]
    #[test_case(RepeatCount::Indefinite => MisfireAction::RescheduleNextWithRemainingCount ; "indefinite")]
    fn smart_policy_resolution(count: RepeatCount) -> MisfireAction {
        MisfireInstruction::SmartPolicy.resolve(count)
    }

    #[test_case(MisfireInstruction::FireNow => MisfireAction::FireNow)]
    #[test_case(MisfireInstruction::RescheduleNowWithExistingRepeatCount => MisfireAction::RescheduleNowWithExistingRepeatCount)]
    #[test_case(MisfireInstruction::RescheduleNowWithRemainingRepeatCount => MisfireAction::RescheduleNowWithRemainingRepeatCount)]
    #[test_case(MisfireInstruction::RescheduleNextWithRemainingCount => MisfireAction::RescheduleNextWithRemainingCount)]
    #[test_case(MisfireInstruction::RescheduleNextWithExistingCount => MisfireAction::RescheduleNextWithExistingCount)]
    fn concrete_instructions_ignore_repeat_count(instruction: MisfireInstruction) -> MisfireAction {
        let action = instruction.resolve(RepeatCount::Finite(0));
        for count in [RepeatCount::Finite(3), RepeatCount::Indefinite] {
            assert_eq!(instruction.resolve(count), action);
        }
        assert_eq!(MisfireInstruction::try_from(instruction.code()).unwrap(), instruction);
        action
    }

    #[test]
    fn test_fires_now_only_for_now_actions() {
        assert!(MisfireAction::FireNow.fires_now());
        assert!(MisfireAction::RescheduleNowWithRemainingRepeatCount.fires_now());
        assert!(!MisfireAction::RescheduleNextWithExistingCount.fires_now());
        assert!(!MisfireAction::RescheduleNextWithRemainingCount.fires_now());
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(matches!(
            MisfireInstruction::try_from(9),
            Err(TriggerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_is_smart_policy() {
        let instruction: MisfireInstruction = Default::default();
        assert_eq!(instruction, MisfireInstruction::SmartPolicy);
        assert_eq!(
            serde_json::to_string(&MisfireInstruction::RescheduleNextWithRemainingCount).unwrap(),
            r#""reschedule_next_with_remaining_count""#
        );
    }
}
