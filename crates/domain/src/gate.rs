use std::time::Duration;

use chrono::{DateTime, Utc};

/// Observed state of a gate lock object, derived from its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No timestamp: nobody holds the unit of work.
    Empty,
    /// Timestamp within the staleness threshold: a holder is working.
    Fresh {
        /// Time elapsed since the holder recorded its start.
        age: Duration,
    },
    /// Timestamp older than the staleness threshold: the holder is presumed dead.
    Stale {
        /// Time elapsed since the holder recorded its start.
        age: Duration,
    },
}

impl LockState {
    /// Classifies one lock timestamp against the staleness threshold.
    ///
    /// Timestamps in the future (clock skew between workers) count as age zero.
    #[must_use]
    pub fn classify(
        timestamp: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        staleness_threshold: Duration,
    ) -> Self {
        let Some(timestamp) = timestamp else {
            return Self::Empty;
        };

        let age = now
            .signed_duration_since(timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if age > staleness_threshold {
            Self::Stale { age }
        } else {
            Self::Fresh { age }
        }
    }

    /// Returns the gate decision this state leads to.
    #[must_use]
    pub fn decision(self) -> GateDecision {
        match self {
            Self::Empty => GateDecision::Run,
            Self::Fresh { .. } => GateDecision::Defer,
            Self::Stale { .. } => GateDecision::RetryViaRetrigger,
        }
    }
}

/// Three-way outcome of the gate's decide phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The caller owns the unit of work and runs it now.
    Run,
    /// Another holder is working; a coalesced re-run was requested.
    Defer,
    /// The previous holder was abandoned; the lock was reset and the trigger
    /// must be re-injected.
    RetryViaRetrigger,
}

impl GateDecision {
    /// Returns stable decision value for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Defer => "defer",
            Self::RetryViaRetrigger => "retry_via_retrigger",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use proptest::prelude::*;

    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn missing_timestamp_is_empty_and_runs() {
        let state = LockState::classify(None, Utc::now(), THRESHOLD);
        assert_eq!(state, LockState::Empty);
        assert_eq!(state.decision(), GateDecision::Run);
    }

    #[test]
    fn twenty_minute_old_lock_is_stale() {
        let now = Utc::now();
        let state = LockState::classify(Some(now - TimeDelta::minutes(20)), now, THRESHOLD);

        assert!(matches!(state, LockState::Stale { .. }));
        assert_eq!(state.decision(), GateDecision::RetryViaRetrigger);
    }

    #[test]
    fn lock_exactly_at_threshold_is_still_fresh() {
        let now = Utc::now();
        let state = LockState::classify(Some(now - TimeDelta::minutes(15)), now, THRESHOLD);
        assert_eq!(state.decision(), GateDecision::Defer);
    }

    #[test]
    fn future_timestamp_is_fresh_with_zero_age() {
        let now = Utc::now();
        let state = LockState::classify(Some(now + TimeDelta::seconds(30)), now, THRESHOLD);
        assert_eq!(state, LockState::Fresh { age: Duration::ZERO });
    }

    proptest! {
        #[test]
        fn ages_within_threshold_defer(age_seconds in 0_i64..=900) {
            let now = Utc::now();
            let state = LockState::classify(Some(now - TimeDelta::seconds(age_seconds)), now, THRESHOLD);
            prop_assert_eq!(state.decision(), GateDecision::Defer);
        }

        #[test]
        fn ages_beyond_threshold_retrigger(age_seconds in 901_i64..=86_400 * 30) {
            let now = Utc::now();
            let state = LockState::classify(Some(now - TimeDelta::seconds(age_seconds)), now, THRESHOLD);
            prop_assert_eq!(state.decision(), GateDecision::RetryViaRetrigger);
        }
    }
}
