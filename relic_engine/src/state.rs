use std::collections::BTreeSet;

/// Decides whether a conditional script's condition currently holds.
pub trait ConditionEvaluator {
    fn evaluate(&self, condition: u16) -> bool;
}

/// Condition words are not decoded yet; every one of them holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrue;

impl ConditionEvaluator for AlwaysTrue {
    fn evaluate(&self, _condition: u16) -> bool {
        true
    }
}

/// Fixed answers: every condition has the default value except the listed
/// ones, which have the opposite.
#[derive(Debug, Clone, Default)]
pub struct FlagConditions {
    default: bool,
    flipped: BTreeSet<u16>,
}

impl FlagConditions {
    pub fn all_true_except<I: IntoIterator<Item = u16>>(conditions: I) -> Self {
        Self {
            default: true,
            flipped: conditions.into_iter().collect(),
        }
    }

    pub fn only<I: IntoIterator<Item = u16>>(conditions: I) -> Self {
        Self {
            default: false,
            flipped: conditions.into_iter().collect(),
        }
    }
}

impl ConditionEvaluator for FlagConditions {
    fn evaluate(&self, condition: u16) -> bool {
        self.default != self.flipped.contains(&condition)
    }
}

impl<F> ConditionEvaluator for F
where
    F: Fn(u16) -> bool,
{
    fn evaluate(&self, condition: u16) -> bool {
        self(condition)
    }
}
